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
//! Virtual/physical address translation and the per-format
//! instruction-classification seam the matcher is generic over.
//! Parsing the actual section/program-header tables out of an ELF or
//! COFF file is an external collaborator; this module only takes
//! already-parsed tables and exposes the pure-function half.
pub mod elf_reader;
pub mod pe_reader;

use crate::flags::{self, InstructionFlags};

/// One loadable segment: `file_size` bytes at `physical_base` are
/// mapped to `memory_size` bytes at `virtual_base` (the remainder,
/// when `memory_size > file_size`, is zero-filled — e.g. `.bss`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub virtual_base: u64,
    pub physical_base: u64,
    pub memory_size: u64,
    pub file_size: u64,
}

/// A named section, used only for dumpbin-style containment lookups
/// (see [`crate::symtab::dumpbin`]); the matcher itself never needs
/// section names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub start_virtual: u64,
    pub size: u64,
}

/// Virtual/physical conversion driven by a binary's program headers.
#[derive(Debug, Clone, Default)]
pub struct AddressSpace {
    headers: Vec<ProgramHeader>,
}

impl AddressSpace {
    pub fn new(headers: Vec<ProgramHeader>) -> Self {
        Self { headers }
    }

    pub fn virtual_to_physical(&self, v: u64) -> Option<u64> {
        for h in &self.headers {
            if v >= h.virtual_base && v < h.virtual_base + h.file_size {
                return Some(h.physical_base + (v - h.virtual_base));
            }
        }
        None
    }

    pub fn physical_to_virtual(&self, p: u64) -> Option<u64> {
        for h in &self.headers {
            if p >= h.physical_base && p < h.physical_base + h.file_size {
                return Some(h.virtual_base + (p - h.physical_base));
            }
        }
        None
    }

    pub fn virtual_is_valid(&self, v: u64) -> bool {
        self.headers
            .iter()
            .any(|h| v >= h.virtual_base && v < h.virtual_base + h.memory_size)
    }
}

/// The two supported object formats. Both decode the same x86 ISA, so
/// classification is identical; the distinction exists because the
/// builder's candidate ranking and the fixer's availability (ELF only)
/// differ per format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    ElfX86,
    CoffX86,
}

/// Per-format collaborator the matcher is generic over: address
/// translation plus mnemonic classification.
pub trait ObjectModule {
    fn kind(&self) -> ObjectKind;
    fn address_space(&self) -> &AddressSpace;
    fn sections(&self) -> &[Section];

    /// Turn a decoded mnemonic into capability bits. Identical across
    /// both variants at this ISA; a hook per-variant purely so a
    /// future non-x86 addition has somewhere to diverge.
    fn classify(&self, mnemonic_text: &str, size: usize) -> InstructionFlags {
        flags::classify(mnemonic_text, size)
    }

    /// `might_have_multiple_encodings` injected predicate (§4.4):
    /// identically false for MSVC, non-trivial for GNU/ELF. The
    /// default captures the MSVC answer; `ElfModule` overrides it.
    fn might_have_multiple_encodings(&self, _flags: &InstructionFlags, _listing_length: usize) -> bool {
        false
    }
}

/// ELF built by the GNU toolchain. Multiple encodings are possible
/// because GAS sometimes chooses a shorter form than what the listing
/// captured for a jump whose final displacement only becomes known
/// after relaxation; any jump (conditional or not) is a candidate.
pub struct ElfModule {
    address_space: AddressSpace,
    sections: Vec<Section>,
}

impl ElfModule {
    pub fn new(address_space: AddressSpace, sections: Vec<Section>) -> Self {
        Self { address_space, sections }
    }
}

impl ObjectModule for ElfModule {
    fn kind(&self) -> ObjectKind {
        ObjectKind::ElfX86
    }
    fn address_space(&self) -> &AddressSpace {
        &self.address_space
    }
    fn sections(&self) -> &[Section] {
        &self.sections
    }
    fn might_have_multiple_encodings(&self, flags: &InstructionFlags, listing_length: usize) -> bool {
        (flags.is_jump_unconditional || flags.is_jump_conditional) && flags.size_in_bytes != listing_length
    }
}

/// COFF PE built by MSVC. `cl`/`ml` always emit a listing that matches
/// the final encoding, so the multi-encoding predicate stays false.
pub struct CoffModule {
    address_space: AddressSpace,
    sections: Vec<Section>,
}

impl CoffModule {
    pub fn new(address_space: AddressSpace, sections: Vec<Section>) -> Self {
        Self { address_space, sections }
    }
}

impl ObjectModule for CoffModule {
    fn kind(&self) -> ObjectKind {
        ObjectKind::CoffX86
    }
    fn address_space(&self) -> &AddressSpace {
        &self.address_space
    }
    fn sections(&self) -> &[Section] {
        &self.sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> AddressSpace {
        AddressSpace::new(vec![ProgramHeader {
            virtual_base: 0x1000,
            physical_base: 0,
            memory_size: 0x2000,
            file_size: 0x1000,
        }])
    }

    #[test]
    fn round_trips_virtual_and_physical() {
        let s = space();
        let v = 0x1050;
        let p = s.virtual_to_physical(v).unwrap();
        assert_eq!(s.physical_to_virtual(p), Some(v));
    }

    #[test]
    fn bss_tail_is_valid_but_has_no_file_backing() {
        let s = space();
        assert!(s.virtual_is_valid(0x2500));
        assert_eq!(s.virtual_to_physical(0x2500), None);
    }

    #[test]
    fn outside_every_header_is_invalid() {
        let s = space();
        assert!(!s.virtual_is_valid(0x500));
    }

    #[test]
    fn elf_flags_multiple_encodings_on_length_mismatch() {
        let m = ElfModule::new(space(), Vec::new());
        let f = flags::classify("jne 0x2000", 2);
        assert!(m.might_have_multiple_encodings(&f, 6));
        assert!(!m.might_have_multiple_encodings(&f, 2));
    }

    #[test]
    fn coff_never_reports_multiple_encodings() {
        let m = CoffModule::new(space(), Vec::new());
        let f = flags::classify("jne 0x2000", 2);
        assert!(!m.might_have_multiple_encodings(&f, 6));
    }
}
