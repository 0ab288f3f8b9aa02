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
use std::path::Path;
use std::process::Command;

use crate::error::{GtError, GtResult};
use super::SymbolFunction;

/// Invoke `dumpbin.exe /RAWDATA:NONE /ALL /SYMBOLS <obj>` for the
/// given dumpbin variant (`x86`/`x64`), under `/opt/msvc/bin/<isa>`.
pub fn generate(isa: &str, obj: &Path) -> GtResult<String> {
    let dumpbin = Path::new("/opt/msvc/bin").join(isa).join("dumpbin.exe");
    let output = Command::new(dumpbin)
        .args(["/RAWDATA:NONE", "/ALL", "/SYMBOLS"])
        .arg(obj)
        .output()
        .map_err(|e| GtError::StructuralFail(format!("dumpbin failed to launch: {e}")))?;
    if !output.status.success() {
        return Err(GtError::StructuralFail(format!(
            "dumpbin exited with failure for {}",
            obj.display()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

struct SectionRange {
    name: String,
    start: u64,
    size: u64,
}

fn hex(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

/// Refine a binary-level symbol list (from [`super::msvc_map`]) with
/// per-function sizes and section assignments, as reported by
/// dumpbin's function table and section headers.
pub fn refine_binary(text: &str, load_base: i64, fmap: &mut [SymbolFunction]) {
    let mut sections: Vec<SectionRange> = Vec::new();
    let mut in_func_tbl = false;
    let mut fmap_pointer = 0usize;
    let (mut name_recorded, mut size_recorded, mut vaddr_recorded) = (true, true, true);

    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if line.starts_with("SECTION HEADER #") {
            name_recorded = false;
            size_recorded = false;
            vaddr_recorded = false;
            sections.push(SectionRange { name: String::new(), start: 0, size: 0 });
            continue;
        }
        if line.starts_with("Function Table (") {
            in_func_tbl = true;
            continue;
        }
        if !in_func_tbl && fields.len() == 2 && !name_recorded && fields[1] == "name" {
            sections.last_mut().unwrap().name = fields[0].to_string();
            name_recorded = true;
        }
        if !in_func_tbl && fields.len() == 3 && !size_recorded && fields[1] == "virtual" && fields[2] == "size" {
            if let Some(sz) = hex(fields[0]) {
                sections.last_mut().unwrap().size = sz;
            }
            size_recorded = true;
        }
        if !in_func_tbl && fields.len() == 6 && !vaddr_recorded && fields[1] == "virtual" && fields[2] == "address" {
            if let Some(va) = hex(fields[0]) {
                sections.last_mut().unwrap().start = (load_base + va as i64) as u64;
            }
            vaddr_recorded = true;
        }
        if !in_func_tbl || fields.len() < 4 {
            continue;
        }
        let nums: Option<Vec<u64>> = fields[..4].iter().map(|f| hex(f)).collect();
        let Some(nums) = nums else { continue };
        let start = (load_base + nums[1] as i64) as u64;
        let end = (load_base + nums[2] as i64) as u64;

        while fmap_pointer < fmap.len() && fmap[fmap_pointer].offset <= start {
            let entry = &fmap[fmap_pointer];
            let mut sec_name = String::new();
            for sec in &sections {
                if entry.offset >= sec.start && entry.offset + entry.size <= sec.start + sec.size {
                    sec_name = sec.name.clone();
                    break;
                }
            }
            if !sec_name.is_empty() {
                fmap[fmap_pointer].section_name = sec_name;
            }
            if fmap[fmap_pointer].offset == start {
                fmap[fmap_pointer].size = end - start;
                fmap_pointer += 1;
                break;
            }
            fmap_pointer += 1;
        }
    }
}

/// Resolve a per-object dumpbin dump into function records.  Dumpbin
/// groups information by section under `.text$mn`; when the compiler
/// stripped section names (`/Od` objects), fall back to the COFF
/// symbol table.
pub fn resolve_object(text: &str) -> Vec<SymbolFunction> {
    let mut fmap: Vec<SymbolFunction> = Vec::new();
    let mut in_text = false;
    let mut sec_id: i64 = -1;
    let mut sec_id_to_index: HashMap<i64, usize> = HashMap::new();
    let mut index_to_sec_id: Vec<i64> = Vec::new();

    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let Some(rest) = line.strip_prefix("SECTION HEADER #") {
            if let Ok(v) = i64::from_str_radix(rest.trim(), 16) {
                sec_id = v;
            }
        }
        if line == ".text$mn name" {
            fmap.push(SymbolFunction {
                name: String::new(),
                offset: 0,
                size: 0,
                section_name: ".text$mn".to_string(),
                source_hint: String::new(),
                has_source: false,
            });
            sec_id_to_index.insert(sec_id, index_to_sec_id.len());
            index_to_sec_id.push(sec_id);
            in_text = true;
            continue;
        }
        if !in_text {
            continue;
        }
        if line.starts_with("RELOCATIONS #") || line.starts_with("SECTION HEADER #") {
            in_text = false;
            continue;
        }
        if fields.len() >= 3 && fields[0] == "COMDAT;" && fields[1] == "sym=" {
            fmap.last_mut().unwrap().name = fields[2].to_string();
            continue;
        }
        if fields.len() >= 6 && fields[1..6].join(" ") == "file pointer to raw data" {
            if let Some(off) = hex(fields[0]) {
                fmap.last_mut().unwrap().offset = off;
            }
            continue;
        }
        if fields.len() >= 5 && fields[1..5].join(" ") == "size of raw data" {
            if let Some(sz) = hex(fields[0]) {
                fmap.last_mut().unwrap().size = sz;
            }
            continue;
        }
    }

    let empty_sec_ids: Vec<i64> = fmap
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name.is_empty())
        .map(|(i, _)| index_to_sec_id[i])
        .collect();

    if !empty_sec_ids.is_empty() {
        let mut in_symbol_table = false;
        let mut text_mn_addr: HashMap<i64, u64> = HashMap::new();
        for line in text.lines() {
            if line == "COFF SYMBOL TABLE" {
                in_symbol_table = true;
                continue;
            }
            if !in_symbol_table {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 7 && fields[6] == ".text$mn" && fields[2].starts_with("SECT") {
                if let Ok(id) = i64::from_str_radix(fields[2].trim_start_matches("SECT"), 16) {
                    if empty_sec_ids.contains(&id) {
                        if let Some(addr) = hex(fields[1]) {
                            text_mn_addr.insert(id, addr);
                        }
                    }
                }
                continue;
            }
            if fields.len() >= 8 && fields[4] == "()" && fields[2].starts_with("SECT") {
                if let Ok(id) = i64::from_str_radix(fields[2].trim_start_matches("SECT"), 16) {
                    if let Some(&base_addr) = text_mn_addr.get(&id) {
                        if let (Some(&fmap_idx), Some(addr)) =
                            (sec_id_to_index.get(&id), hex(fields[1]))
                        {
                            let base_offset = fmap[fmap_idx].offset;
                            fmap.push(SymbolFunction {
                                name: fields[7].to_string(),
                                offset: base_offset + addr - base_addr,
                                size: 0,
                                section_name: ".text$mn".to_string(),
                                source_hint: String::new(),
                                has_source: false,
                            });
                        }
                    }
                }
            }
        }
    }

    fmap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refines_binary_sizes_from_function_table() {
        let text = "\
SECTION HEADER #1
   .text name

    1000 virtual size
    2000 00401000 virtual address (1000 to 2fff)

Function Table (1 entries)

    0000 00401000 00401010 00000000

";
        let mut syms = vec![SymbolFunction {
            name: "main".into(),
            offset: 0x401000,
            size: 0,
            section_name: String::new(),
            source_hint: String::new(),
            has_source: true,
        }];
        refine_binary(text, 0, &mut syms);
        assert_eq!(syms[0].size, 0x10);
        assert_eq!(syms[0].section_name, ".text");
    }

    #[test]
    fn resolves_object_functions_from_text_mn_section() {
        let text = "\
SECTION HEADER #1
.text$mn name
COMDAT; sym= main
     20 file pointer to raw data
     10 size of raw data
";
        let syms = resolve_object(text);
        assert_eq!(syms.len(), 1);
        assert_eq!(syms[0].name, "main");
        assert_eq!(syms[0].offset, 0x20);
        assert_eq!(syms[0].size, 0x10);
    }
}
