// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! A thin request/reply façade over the external instruction decoder
//! (`resolver -p <isa>`), started once per run and shared by every
//! [`crate::matcher`] call.
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::error::{GtError, GtResult};

/// One decoded answer: `is_instruction`, its byte length, and the
/// mnemonic text (empty on soft failure, e.g. bytes that don't decode
/// to anything).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReply {
    pub is_instruction: bool,
    pub size_in_bytes: usize,
    pub mnemonic_text: String,
}

/// Synchronous, thread-confined decoder access. The matcher is
/// written against this trait so it can be exercised with a canned
/// in-memory implementation, never a live `resolver` subprocess.
pub trait DecoderClient {
    fn decode(&mut self, physical_offset: u64, bytes: &[u8]) -> GtResult<DecodeReply>;
}

/// Spawns `resolver -p <isa>` and talks to it over stdin/stdout: one
/// request line out, one reply line in. Killed by `Drop` on every exit
/// path, including unwinding.
pub struct SubprocessDecoder {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SubprocessDecoder {
    pub fn spawn(isa: &str) -> GtResult<Self> {
        let mut child = Command::new("resolver")
            .args(["-p", isa])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| GtError::DecoderFail(format!("failed to spawn resolver: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GtError::DecoderFail("resolver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GtError::DecoderFail("resolver stdout unavailable".into()))?;
        Ok(Self { child, stdin, stdout: BufReader::new(stdout) })
    }
}

impl DecoderClient for SubprocessDecoder {
    fn decode(&mut self, physical_offset: u64, bytes: &[u8]) -> GtResult<DecodeReply> {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        writeln!(self.stdin, "{physical_offset:x} {hex}")
            .map_err(|e| GtError::DecoderFail(format!("write to resolver failed: {e}")))?;
        self.stdin
            .flush()
            .map_err(|e| GtError::DecoderFail(format!("flush to resolver failed: {e}")))?;

        let mut line = String::new();
        self.stdout
            .read_line(&mut line)
            .map_err(|e| GtError::DecoderFail(format!("read from resolver failed: {e}")))?;
        parse_reply(&line)
    }
}

impl Drop for SubprocessDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `<ok|fail> <size-hex> <mnemonic...>` — `ok` lines with `size=0` are
/// treated the same as `fail` (no instruction recognized).
fn parse_reply(line: &str) -> GtResult<DecodeReply> {
    let mut fields = line.trim_end().splitn(3, ' ');
    let status = fields.next().unwrap_or("");
    let size_field = fields.next().unwrap_or("0");
    let mnemonic_text = fields.next().unwrap_or("").to_string();
    let size_in_bytes = usize::from_str_radix(size_field, 16).unwrap_or(0);
    Ok(DecodeReply {
        is_instruction: status == "ok" && size_in_bytes > 0,
        size_in_bytes,
        mnemonic_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_reply() {
        let r = parse_reply("ok 5 mov %eax,0x0\n").unwrap();
        assert!(r.is_instruction);
        assert_eq!(r.size_in_bytes, 5);
        assert_eq!(r.mnemonic_text, "mov %eax,0x0");
    }

    #[test]
    fn parses_fail_reply() {
        let r = parse_reply("fail 0\n").unwrap();
        assert!(!r.is_instruction);
    }

    #[test]
    fn zero_size_ok_is_not_an_instruction() {
        let r = parse_reply("ok 0\n").unwrap();
        assert!(!r.is_instruction);
    }
}
