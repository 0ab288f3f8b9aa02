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
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{GtError, GtResult};
use super::{ListingFunction, ListingInstruction, ListingLabel, ListingModel};

/// MSVC inline-assembly data directives; a line whose mnemonic is one
/// of these is a data declaration, not an instruction.
/// Ref: https://docs.microsoft.com/en-us/cpp/assembler/inline/data-directives-and-operators-in-inline-assembly
fn is_data_directive(mnemonic: &str) -> bool {
    matches!(
        mnemonic,
        "DB" | "DW" | "DD" | "DQ" | "DT" | "DF" | "STRUC" | "RECORD" | "WIDTH" | "MASK"
    )
}

/// x86 prefixes which, when found as the sole textual content of a
/// decoded line, mean the instruction continues onto the next line.
fn is_prefix_mnemonic(mnemonic: &str) -> bool {
    matches!(
        mnemonic,
        "LOCK" | "REP" | "REPE" | "REPZ" | "REPNE" | "REPNZ" | "CS" | "DS" | "ES" | "FS" | "GS" | "SS"
    )
}

/// Parse an MSVC `.cod` listing into one [`ListingModel`].
pub fn parse(path: &Path) -> GtResult<ListingModel> {
    let text = fs::read_to_string(path)
        .map_err(|e| GtError::ParseFatal(format!("{}: {e}", path.display())))?;

    // Pass 1: find `name PROC` / `name ENDP` pairs; only such names
    // are genuine functions.
    let mut proc_seen: HashMap<&str, bool> = HashMap::new();
    let mut func_names: HashMap<&str, bool> = HashMap::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        if fields[0].starts_with(';') || fields[1].starts_with(';') {
            continue;
        }
        if fields[1] == "PROC" {
            proc_seen.insert(fields[0], true);
        } else if fields[1] == "ENDP" && proc_seen.contains_key(fields[0]) {
            func_names.insert(fields[0], true);
        }
    }

    // Pass 2: walk the text section, recording instructions & labels.
    let mut funcs: ListingModel = HashMap::new();
    let mut in_text = false;
    let mut in_function = false;
    let mut fname = String::new();
    let mut lname = String::new();
    let mut label_index = 0usize;
    let mut last_is_align = false;
    let mut last_not_finished = false;
    let mut insn_offset = 0usize;
    let mut insn_bytes = 0usize;

    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }

        if fields[0] == "_TEXT" && fields.len() >= 2 && fields[1] == "SEGMENT" {
            in_text = true;
            continue;
        }
        if in_text && fields.len() >= 2 && fields[0] == "_TEXT" && fields[1] == "ENDS" {
            in_text = false;
            continue;
        }
        if in_text && fields.len() >= 2 && fields[1] == "PROC" && func_names.contains_key(fields[0]) {
            fname = fields[0].to_string();
            funcs.insert(fname.clone(), ListingFunction::new());
            in_function = true;
            lname = fname.clone();
            label_index = 0;
            last_is_align = false;
            last_not_finished = false;
            continue;
        }
        if in_text && fields.len() >= 2 && fields[1] == "ENDP" && fields[0] == fname {
            if let Some(f) = funcs.get_mut(&fname) {
                f.trim_trailing_alignment();
            }
            in_function = false;
            last_is_align = false;
            last_not_finished = false;
            continue;
        }
        if !in_function || !in_text {
            continue;
        }

        match u64::from_str_radix(fields[0], 16) {
            Err(_) => {
                if fields[0].starts_with('$') && fields[0].ends_with(':') {
                    lname = fields[0].to_string();
                    label_index = 0;
                    last_is_align = false;
                    last_not_finished = false;
                } else if let Some(f) = funcs.get_mut(&fname) {
                    if f.source_file_name.is_empty() && line.starts_with("; File ") {
                        let source = &line[7..];
                        let base = source.rfind('\\').map(|i| i + 1).unwrap_or(0);
                        f.source_file_name = source[base..].to_string();
                    }
                }
                continue;
            }
            Ok(first) => {
                // An instruction line: "offset \t mc bytes \t(s) mnemonic (\t comments)"
                let frames: Vec<&str> = line.split('\t').collect();
                let bytes_frame = 1usize;
                if !line.starts_with('\t') && !last_not_finished {
                    insn_offset = first as usize;
                    insn_bytes = 0;
                }
                let bytes_field = frames.get(bytes_frame).copied().unwrap_or("");
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
                    f.total_byte_length = insn_offset + insn_bytes;
                }
                last_not_finished = true;
                let mut break_sign = String::new();
                let mut last_piece = String::new();
                'frames: for frame in frames.iter().skip(bytes_frame + 1) {
                    for s in frame.split_whitespace() {
                        if s.starts_with(';') {
                            if break_sign.is_empty() {
                                break_sign = s.to_string();
                            }
                            break 'frames;
                        }
                        last_piece = s.to_string();
                        if !s.is_empty() && break_sign.is_empty() {
                            break_sign = s.to_string();
                            last_not_finished = false;
                        }
                    }
                }
                if is_data_directive(&break_sign) {
                    continue;
                }
                if is_prefix_mnemonic(&last_piece) {
                    last_not_finished = true;
                }
                if last_not_finished {
                    continue;
                }
                let f = funcs.get_mut(&fname).unwrap();
                if label_index == 0 {
                    f.labels.push(ListingLabel {
                        byte_offset_in_function: insn_offset,
                        name: lname.clone(),
                    });
                }
                let mut is_align = false;
                if break_sign == "npad" {
                    if last_is_align {
                        if let Some(last) = f.instructions.last_mut() {
                            last.byte_length += insn_bytes;
                        }
                        continue;
                    }
                    is_align = true;
                    last_is_align = true;
                } else {
                    last_is_align = false;
                }
                if !break_sign.is_empty() && insn_bytes > 0 {
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
        }
    }

    Ok(funcs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> crate::test_support::TempFile {
        crate::test_support::TempFile::new("cod", contents)
    }

    #[test]
    fn parses_simple_function() {
        let cod = "\
_TEXT SEGMENT
; File c:\\src\\foo.c
foo\tPROC
  00000\t b8 00 00 00 00\t mov eax, 0
  00005\t c3\t ret  0
foo\tENDP
_TEXT ENDS
";
        let tmp = write_fixture(cod);
        let model = parse(&tmp.path).unwrap();
        let f = model.get("foo").expect("function present");
        assert_eq!(f.instructions.len(), 2);
        assert_eq!(f.instructions[0].byte_offset_in_function, 0);
        assert_eq!(f.instructions[0].byte_length, 5);
        assert_eq!(f.instructions[1].byte_offset_in_function, 5);
        assert_eq!(f.instructions[1].byte_length, 1);
        assert_eq!(f.total_byte_length, 6);
        assert_eq!(f.source_file_name, "foo.c");
    }

    #[test]
    fn merges_consecutive_npads_and_trims_trailing() {
        let cod = "\
_TEXT SEGMENT
bar\tPROC
  00000\t 90 90 90 90\t npad  4
  00004\t 90 90 90\t npad  3
bar\tENDP
_TEXT ENDS
";
        let tmp = write_fixture(cod);
        let model = parse(&tmp.path).unwrap();
        let f = model.get("bar").unwrap();
        // Both npad runs merge into a single alignment instruction,
        // then get trimmed away entirely because they are trailing.
        assert!(f.instructions.is_empty());
        assert!(f.labels.is_empty());
    }

    #[test]
    fn rejects_malformed_bytes_field() {
        let cod = "\
_TEXT SEGMENT
baz\tPROC
  00000\t zz 00\t mov eax, 0
baz\tENDP
_TEXT ENDS
";
        let tmp = write_fixture(cod);
        assert!(parse(&tmp.path).is_err());
    }
}
