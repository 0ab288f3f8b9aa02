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
//! Reads just enough of an ELF64 header to build an [`AddressSpace`]:
//! the `PT_LOAD` program headers. Everything else about object-file
//! structure (symbols, sections, relocations) is out of scope here —
//! `nm` already supplies symbols, and the matcher never needs ELF
//! section names.
use crate::error::{GtError, GtResult};
use crate::object::{AddressSpace, ProgramHeader};

const PT_LOAD: u32 = 1;

fn read_u16(bytes: &[u8], off: usize) -> Option<u16> {
    bytes.get(off..off + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}
fn read_u32(bytes: &[u8], off: usize) -> Option<u32> {
    bytes.get(off..off + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
fn read_u64(bytes: &[u8], off: usize) -> Option<u64> {
    bytes.get(off..off + 8).map(|b| {
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        u64::from_le_bytes(a)
    })
}

/// Build an [`AddressSpace`] from an in-memory ELF64 image's `PT_LOAD`
/// segments.
pub fn address_space(image: &[u8]) -> GtResult<AddressSpace> {
    if image.len() < 64 || &image[0..4] != b"\x7fELF" {
        return Err(GtError::StructuralFail("not an ELF image".into()));
    }
    if image[4] != 2 {
        return Err(GtError::StructuralFail("only ELF64 images are supported".into()));
    }
    let phoff = read_u64(image, 0x20).ok_or_else(|| GtError::StructuralFail("truncated ELF header".into()))?;
    let phentsize = read_u16(image, 0x36).ok_or_else(|| GtError::StructuralFail("truncated ELF header".into()))?;
    let phnum = read_u16(image, 0x38).ok_or_else(|| GtError::StructuralFail("truncated ELF header".into()))?;

    let mut headers = Vec::new();
    for i in 0..phnum as usize {
        let base = phoff as usize + i * phentsize as usize;
        let p_type = read_u32(image, base).ok_or_else(|| GtError::StructuralFail("truncated program header".into()))?;
        if p_type != PT_LOAD {
            continue;
        }
        let p_offset = read_u64(image, base + 8).unwrap_or(0);
        let p_vaddr = read_u64(image, base + 16).unwrap_or(0);
        let p_filesz = read_u64(image, base + 32).unwrap_or(0);
        let p_memsz = read_u64(image, base + 40).unwrap_or(0);
        headers.push(ProgramHeader {
            virtual_base: p_vaddr,
            physical_base: p_offset,
            memory_size: p_memsz,
            file_size: p_filesz,
        });
    }
    Ok(AddressSpace::new(headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf64(phdrs: &[(u64, u64, u64, u64)]) -> Vec<u8> {
        let phoff = 64u64;
        let phentsize = 56u16;
        let mut img = vec![0u8; 64];
        img[0..4].copy_from_slice(b"\x7fELF");
        img[4] = 2;
        img[0x20..0x28].copy_from_slice(&phoff.to_le_bytes());
        img[0x36..0x38].copy_from_slice(&phentsize.to_le_bytes());
        img[0x38..0x3a].copy_from_slice(&(phdrs.len() as u16).to_le_bytes());
        for &(vaddr, offset, filesz, memsz) in phdrs {
            let mut phdr = vec![0u8; 56];
            phdr[0..4].copy_from_slice(&1u32.to_le_bytes());
            phdr[8..16].copy_from_slice(&offset.to_le_bytes());
            phdr[16..24].copy_from_slice(&vaddr.to_le_bytes());
            phdr[32..40].copy_from_slice(&filesz.to_le_bytes());
            phdr[40..48].copy_from_slice(&memsz.to_le_bytes());
            img.extend_from_slice(&phdr);
        }
        img
    }

    #[test]
    fn reads_one_load_segment() {
        let img = minimal_elf64(&[(0x1000, 0, 0x500, 0x600)]);
        let space = address_space(&img).unwrap();
        assert!(space.virtual_is_valid(0x1050));
        assert_eq!(space.virtual_to_physical(0x1000), Some(0));
    }

    #[test]
    fn rejects_non_elf_image() {
        assert!(address_space(&[0u8; 64]).is_err());
    }
}
