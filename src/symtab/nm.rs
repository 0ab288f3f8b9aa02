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
use std::path::Path;
use std::process::Command;

use crate::error::{GtError, GtResult};
use super::SymbolFunction;

/// Run `nm -f sys5 --numeric-sort --defined-only --line-numbers <obj>`
/// (or `gnm` when `gnu_prefix` is set) and resolve its output into
/// function symbols.
pub fn generate(obj: &Path, gnu_prefix: bool) -> GtResult<Vec<SymbolFunction>> {
    let cmd = if gnu_prefix { "gnm" } else { "nm" };
    let output = Command::new(cmd)
        .args(["-f", "sys5", "--numeric-sort", "--defined-only", "--line-numbers"])
        .arg(obj)
        .output()
        .map_err(|e| GtError::StructuralFail(format!("{cmd} failed to launch: {e}")))?;
    if !output.status.success() {
        return Err(GtError::StructuralFail(format!(
            "{cmd} exited with failure for {}",
            obj.display()
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(resolve(&text))
}

/// Parse `nm -f sys5` output (already read into memory) into
/// [`SymbolFunction`] records.  Only `FUNC`-typed rows become
/// symbols; everything else (objects, sections, undefined symbols) is
/// skipped.
pub fn resolve(text: &str) -> Vec<SymbolFunction> {
    let mut out = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split('|').map(|s| s.trim()).collect();
        if fields.len() != 7 {
            continue;
        }
        if !fields[3].eq_ignore_ascii_case("func") {
            continue;
        }
        let offset = u64::from_str_radix(fields[1], 16).unwrap_or(0);
        let size = u64::from_str_radix(fields[4], 16).unwrap_or(0);
        let name = fields[0].to_string();
        if let Some(tab) = fields[6].find('\t') {
            let section = fields[6][..tab].to_string();
            let rest = fields[6][tab..].trim_start_matches('\t');
            let (source, line_no) = split_source_line(rest);
            let _ = line_no;
            out.push(SymbolFunction {
                name,
                offset,
                size,
                section_name: section,
                source_hint: source,
                has_source: true,
            });
        } else {
            out.push(SymbolFunction {
                name,
                offset,
                size,
                section_name: fields[6].to_string(),
                source_hint: String::new(),
                has_source: false,
            });
        }
    }
    out
}

/// Split a `path/to/file.c:42`-shaped annotation on its last `:` into
/// `(file, line)`.  If there is no trailing numeric line, the whole
/// string is the file.
fn split_source_line(s: &str) -> (String, u32) {
    match s.rfind(':') {
        Some(idx) => match s[idx + 1..].parse::<u32>() {
            Ok(n) => (s[..idx].to_string(), n),
            Err(_) => (s.to_string(), 0),
        },
        None => (s.to_string(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_function_with_source() {
        let line = "main|00000000123|t|FUNC|00000010|0|.text\tsrc/main.c:10";
        let syms = resolve(line);
        assert_eq!(syms.len(), 1);
        assert_eq!(syms[0].name, "main");
        assert_eq!(syms[0].offset, 0x123);
        assert_eq!(syms[0].size, 0x10);
        assert_eq!(syms[0].section_name, ".text");
        assert!(syms[0].has_source);
        assert_eq!(syms[0].source_hint, "src/main.c");
    }

    #[test]
    fn skips_non_func_rows() {
        let line = "some_var|00000000|d|OBJT|00000004|0|.data";
        assert!(resolve(line).is_empty());
    }

    #[test]
    fn handles_missing_source_annotation() {
        let line = "helper|00000010|t|FUNC|00000004|0|.text";
        let syms = resolve(line);
        assert_eq!(syms.len(), 1);
        assert!(!syms[0].has_source);
    }
}
