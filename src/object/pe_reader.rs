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
//! Reads just enough of a PE/COFF image to build an [`AddressSpace`]
//! and its [`Section`] table: the COFF file header's section count
//! plus the section headers that follow the optional header. Symbols
//! come from the `.map`/dumpbin back ends, not from here.
use crate::error::{GtError, GtResult};
use crate::object::{AddressSpace, ProgramHeader, Section};

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

pub struct PeLayout {
    pub address_space: AddressSpace,
    pub sections: Vec<Section>,
}

pub fn parse(image: &[u8]) -> GtResult<PeLayout> {
    if image.len() < 0x40 {
        return Err(GtError::StructuralFail("not a PE image".into()));
    }
    let pe_offset = read_u32(image, 0x3c).ok_or_else(|| GtError::StructuralFail("truncated DOS header".into()))? as usize;
    if image.get(pe_offset..pe_offset + 4) != Some(b"PE\0\0".as_slice()) {
        return Err(GtError::StructuralFail("missing PE signature".into()));
    }
    let coff = pe_offset + 4;
    let number_of_sections = read_u16(image, coff + 2).ok_or_else(|| GtError::StructuralFail("truncated COFF header".into()))?;
    let size_of_optional_header = read_u16(image, coff + 16).ok_or_else(|| GtError::StructuralFail("truncated COFF header".into()))?;

    let optional = coff + 20;
    let magic = read_u16(image, optional).unwrap_or(0);
    let image_base = if magic == 0x20b {
        read_u64(image, optional + 24).unwrap_or(0)
    } else {
        read_u32(image, optional + 28).unwrap_or(0) as u64
    };

    let section_table = optional + size_of_optional_header as usize;
    let mut headers = Vec::new();
    let mut sections = Vec::new();
    for i in 0..number_of_sections as usize {
        let base = section_table + i * 40;
        let name_bytes = image
            .get(base..base + 8)
            .ok_or_else(|| GtError::StructuralFail("truncated section header".into()))?;
        let name = String::from_utf8_lossy(name_bytes).trim_end_matches('\0').to_string();
        let virtual_size = read_u32(image, base + 8).unwrap_or(0) as u64;
        let virtual_address = read_u32(image, base + 12).unwrap_or(0) as u64;
        let size_of_raw_data = read_u32(image, base + 16).unwrap_or(0) as u64;
        let pointer_to_raw_data = read_u32(image, base + 20).unwrap_or(0) as u64;

        let memory_size = virtual_size.max(size_of_raw_data);
        headers.push(ProgramHeader {
            virtual_base: image_base + virtual_address,
            physical_base: pointer_to_raw_data,
            memory_size,
            file_size: size_of_raw_data,
        });
        sections.push(Section { name, start_virtual: image_base + virtual_address, size: memory_size });
    }

    Ok(PeLayout { address_space: AddressSpace::new(headers), sections })
}
