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
//
//! Parses the canonical GNU `.lst` format the listing fixer produces
//! after formalizing a translation unit's `.fm.s`.  A listing line has
//! the shape
//!
//! ```text
//!   10:\tb8 00 00 00 00\tmov    %eax,0x0
//! ```
//!
//! with continuation lines (a wrapped instruction's trailing bytes)
//! omitting the leading `offset:` field.  A bare `name:` line with no
//! leading `.` starts a new function (the fixer always anchors a
//! function's entry on a label matching its symbol name); a `.L...:`
//! line is a local label within the current function.  Alignment
//! padding is emitted under the pseudo-mnemonic `.alignpad`, mirroring
//! the MSVC `npad` convention so both dialects merge runs the same
//! way.
use std::fs;
use std::path::Path;

use crate::error::{GtError, GtResult};
use super::{ListingFunction, ListingInstruction, ListingLabel, ListingModel};

fn is_local_label(name: &str) -> bool {
    name.starts_with('.')
}

/// Parse a GNU `.lst` listing into one [`ListingModel`].
pub fn parse(path: &Path) -> GtResult<ListingModel> {
    let text = fs::read_to_string(path)
        .map_err(|e| GtError::ParseFatal(format!("{}: {e}", path.display())))?;

    let mut funcs: ListingModel = ListingModel::new();
    let mut fname = String::new();
    let mut lname = String::new();
    let mut label_index = 0usize;
    let mut last_is_align = false;
    let mut last_not_finished = false;
    let mut insn_offset = 0usize;
    let mut insn_bytes = 0usize;

    for raw_line in text.lines() {
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        // A bare label line: "name:" (no leading whitespace, no tab
        // before the colon, nothing after it).
        if !line.starts_with(char::is_whitespace) && line.ends_with(':') && !line.contains(char::is_whitespace) {
            let name = &line[..line.len() - 1];
            if is_local_label(name) {
                lname = line.to_string();
                label_index = 0;
                last_is_align = false;
                last_not_finished = false;
            } else {
                if !fname.is_empty() {
                    if let Some(f) = funcs.get_mut(&fname) {
                        f.trim_trailing_alignment();
                    }
                }
                fname = name.to_string();
                funcs.insert(fname.clone(), ListingFunction::new());
                lname = line.to_string();
                label_index = 0;
                last_is_align = false;
                last_not_finished = false;
            }
            continue;
        }

        if fname.is_empty() {
            // Not inside any function yet (e.g. directives, file
            // header comments); nothing to record.
            continue;
        }

        let frames: Vec<&str> = line.split('\t').collect();
        // frames[0] is either "  10:" (offset) or "" (continuation).
        let offset_field = frames[0].trim();
        if let Some(digits) = offset_field.strip_suffix(':') {
            if !last_not_finished {
                let off = u64::from_str_radix(digits.trim(), 16).map_err(|_| {
                    GtError::ParseFatal(format!(
                        "{}: malformed offset field in {fname}: {line}",
                        path.display()
                    ))
                })?;
                insn_offset = off as usize;
                insn_bytes = 0;
            }
        } else if !offset_field.is_empty() {
            return Err(GtError::ParseFatal(format!(
                "{}: malformed offset field in {fname}: {line}",
                path.display()
            )));
        }

        let bytes_field = frames.get(1).copied().unwrap_or("");
        for b in bytes_field.split_whitespace() {
            if b.len() == 2 && u8::from_str_radix(b, 16).is_ok() {
                insn_bytes += 1;
            } else {
                return Err(GtError::ParseFatal(format!(
                    "{}: malformed bytes field in {fname}: {line}",
                    path.display()
                )));
            }
        }
        if let Some(f) = funcs.get_mut(&fname) {
            f.total_byte_length = f.total_byte_length.max(insn_offset + insn_bytes);
        }

        let mnemonic = frames.get(2).map(|s| s.trim()).unwrap_or("");
        if mnemonic.is_empty() {
            // Bytes continue on the next line.
            last_not_finished = true;
            continue;
        }
        last_not_finished = false;

        let f = funcs.get_mut(&fname).unwrap();
        if label_index == 0 {
            f.labels.push(ListingLabel {
                byte_offset_in_function: insn_offset,
                name: lname.clone(),
            });
        }
        let is_align = mnemonic == ".alignpad";
        if is_align && last_is_align {
            if let Some(last) = f.instructions.last_mut() {
                last.byte_length += insn_bytes;
            }
            last_is_align = true;
            continue;
        }
        last_is_align = is_align;
        if insn_bytes > 0 {
            f.instructions.push(ListingInstruction {
                byte_offset_in_function: insn_offset,
                byte_length: insn_bytes,
                is_alignment_pad: is_align,
                label_name: lname.clone(),
                index_within_label: label_index,
            });
            label_index += 1;
        }
    }
    if !fname.is_empty() {
        if let Some(f) = funcs.get_mut(&fname) {
            f.trim_trailing_alignment();
        }
    }

    Ok(funcs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempFile;

    #[test]
    fn parses_simple_function() {
        let lst = "foo:\n  0:\tb8 00 00 00 00\tmov    %eax,0x0\n  5:\tc3\tret\n";
        let tmp = TempFile::new("lst", lst);
        let model = parse(&tmp.path).unwrap();
        let f = model.get("foo").unwrap();
        assert_eq!(f.instructions.len(), 2);
        assert_eq!(f.instructions[0].byte_length, 5);
        assert_eq!(f.instructions[1].byte_length, 1);
        assert_eq!(f.total_byte_length, 6);
        assert_eq!(f.labels[0].name, "foo:");
    }

    #[test]
    fn local_labels_do_not_start_new_functions() {
        let lst = "foo:\n  0:\teb 02\tjmp    2 <foo+0x2>\n.L1:\n  2:\tc3\tret\n";
        let tmp = TempFile::new("lst", lst);
        let model = parse(&tmp.path).unwrap();
        assert_eq!(model.len(), 1);
        let f = model.get("foo").unwrap();
        assert_eq!(f.instructions.len(), 2);
        assert_eq!(f.labels.len(), 2);
        assert_eq!(f.labels[1].name, ".L1:");
    }

    #[test]
    fn merges_alignpad_runs_and_trims_trailing() {
        let lst = "bar:\n  0:\tc3\tret\n  1:\t90 90\t.alignpad\n  3:\t90\t.alignpad\n";
        let tmp = TempFile::new("lst", lst);
        let model = parse(&tmp.path).unwrap();
        let f = model.get("bar").unwrap();
        assert_eq!(f.instructions.len(), 1);
        assert_eq!(f.instructions[0].byte_length, 1);
    }

    #[test]
    fn wrapped_instruction_bytes_continue_on_next_line() {
        let lst = "foo:\n  0:\t48 b8 00 00 00 00\n\t00 00 00 01\tmovabs %rax,0x100000000\n";
        let tmp = TempFile::new("lst", lst);
        let model = parse(&tmp.path).unwrap();
        let f = model.get("foo").unwrap();
        assert_eq!(f.instructions.len(), 1);
        assert_eq!(f.instructions[0].byte_length, 10);
    }
}
