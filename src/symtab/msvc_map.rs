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
use std::fs;
use std::path::Path;

use crate::error::{GtError, GtResult};
use super::SymbolFunction;

/// Read an MSVC linker `.map` file and resolve its public-symbol table
/// into function records.  Offsets are `Rva+Base`; sizes are only a
/// coarse estimate here (the delta to the next symbol) — dumpbin's
/// function table (`dumpbin::resolve_binary`) refines them.
///
/// Returns the resolved symbols (sorted ascending by offset) and the
/// preferred load base, which the dumpbin pass also needs.
pub fn parse(path: &Path) -> GtResult<(Vec<SymbolFunction>, i64)> {
    let text = fs::read_to_string(path)
        .map_err(|e| GtError::ParseFatal(format!("{}: {e}", path.display())))?;
    Ok(resolve(&text))
}

pub fn resolve(text: &str) -> (Vec<SymbolFunction>, i64) {
    let mut load_base: i64 = -1;
    let mut in_symbol_table = false;
    let mut out: Vec<SymbolFunction> = Vec::new();

    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if load_base == -1 && fields.len() >= 5 && fields[0] == "Preferred" && fields[1] == "load" {
            if let Ok(v) = i64::from_str_radix(fields[4].trim_start_matches("0x"), 16) {
                load_base = v;
            }
            continue;
        }
        if fields.len() >= 6 && fields[0] == "Address" && fields[1] == "Publics" {
            in_symbol_table = true;
            continue;
        }
        if !in_symbol_table || fields.len() < 4 {
            continue;
        }
        if fields[0].split(':').count() != 2 {
            continue;
        }
        let is_function = fields[3..].iter().any(|f| *f == "f");
        if !is_function {
            continue;
        }
        let Ok(mem_addr) = i64::from_str_radix(fields[2].trim_start_matches("0x"), 16) else {
            continue;
        };
        out.push(SymbolFunction {
            name: fields[1].to_string(),
            offset: mem_addr as u64,
            size: 0,
            section_name: String::new(),
            source_hint: fields[fields.len() - 1].to_string(),
            has_source: true,
        });
    }

    out.sort_by_key(|s| s.offset);
    // Coarse size estimate: delta to the next symbol. Dumpbin refines
    // this with the real function-table ranges.
    for i in 0..out.len().saturating_sub(1) {
        let next_offset = out[i + 1].offset;
        out[i].size = next_offset.saturating_sub(out[i].offset);
    }
    if load_base == -1 {
        load_base = 0;
    }
    (out, load_base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_public_functions_with_estimated_sizes() {
        let text = "\n Preferred load address is 00400000\n\n  Address         Publics by Value              Rva+Base       Lib:Object\n\n 0001:00001000       main                       00401000 f   prog.obj\n 0001:00002000       helper                     00402000 f   prog.obj\n";
        let (syms, base) = resolve(text);
        assert_eq!(base, 0x400000);
        assert_eq!(syms.len(), 2);
        assert_eq!(syms[0].name, "main");
        assert_eq!(syms[0].offset, 0x401000);
        assert_eq!(syms[0].size, 0x1000);
        assert_eq!(syms[1].name, "helper");
    }

    #[test]
    fn ignores_non_function_rows() {
        let text = "  Address         Publics by Value              Rva+Base       Lib:Object\n\n 0001:00001000       some_data                  00401000     prog.obj\n";
        let (syms, _) = resolve(text);
        assert!(syms.is_empty());
    }
}
