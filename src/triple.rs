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
//! The four LLVM triples this crate knows how to drive, and which
//! object format / dumpbin variant each implies.
use crate::error::{GtError, GtResult};
use crate::object::ObjectKind;

pub const SUPPORTED_TRIPLES: &[&str] =
    &["x86_64-PC-Linux-GNU-ELF", "i386-PC-Linux-GNU-ELF", "x86_64-PC-Win32-MSVC-COFF", "i386-PC-Win32-MSVC-COFF"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlvmTriple {
    pub is_64_bit: bool,
    pub object_kind: ObjectKind,
}

pub fn parse(triple: &str) -> GtResult<LlvmTriple> {
    let is_64_bit = match triple.split('-').next() {
        Some("x86_64") => true,
        Some("i386") => false,
        _ => return Err(invalid(triple)),
    };
    let object_kind = if triple.ends_with("Linux-GNU-ELF") {
        ObjectKind::ElfX86
    } else if triple.ends_with("Win32-MSVC-COFF") {
        ObjectKind::CoffX86
    } else {
        return Err(invalid(triple));
    };
    if !SUPPORTED_TRIPLES.contains(&triple) {
        return Err(invalid(triple));
    }
    Ok(LlvmTriple { is_64_bit, object_kind })
}

fn invalid(triple: &str) -> GtError {
    GtError::ParseFatal(format!(
        "unsupported LLVM triple {triple}; supported: {}",
        SUPPORTED_TRIPLES.join(", ")
    ))
}

/// Default dumpbin variant (`x86`/`x64`) implied by a triple, absent
/// an explicit `-dm` override.
pub fn default_dumpbin_variant(triple: &LlvmTriple) -> &'static str {
    if triple.is_64_bit {
        "x64"
    } else {
        "x86"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_supported_triples() {
        for t in SUPPORTED_TRIPLES {
            assert!(parse(t).is_ok(), "{t} should parse");
        }
    }

    #[test]
    fn rejects_unknown_triple() {
        assert!(parse("arm64-apple-darwin").is_err());
    }

    #[test]
    fn dumpbin_variant_follows_bitness() {
        let t64 = parse("x86_64-PC-Win32-MSVC-COFF").unwrap();
        assert_eq!(default_dumpbin_variant(&t64), "x64");
        let t32 = parse("i386-PC-Win32-MSVC-COFF").unwrap();
        assert_eq!(default_dumpbin_variant(&t32), "x86");
    }
}
