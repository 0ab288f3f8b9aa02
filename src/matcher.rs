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
//! The core state machine: proves a listing function's instructions
//! against a binary's bytes at a candidate starting address, byte by
//! byte, tolerating alignment padding and (on ELF) re-encodable
//! branches.
use std::collections::{HashMap, HashSet};

use crate::decoder::DecoderClient;
use crate::flags;
use crate::listing::ListingFunction;
use crate::object::ObjectModule;

/// Longest an x86 instruction can be; bounds how much of the image we
/// hand the decoder on each call.
pub(crate) const MAX_INSTRUCTION_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDirective {
    Succeed,
    Fail,
    RequireModify { label_name: String, index_within_label: usize, replacement_bytes: Vec<u8> },
}

/// An instruction successor whose target wasn't already known from
/// the listing — a candidate root for [`crate::builder`]'s aggressive
/// search. `predecessor_virtual_offset` is diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionRoot {
    pub virtual_offset: u64,
    pub predecessor_virtual_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionSupplement {
    pub optional: bool,
}

pub type ProvedMap = HashMap<u64, InstructionSupplement>;

/// Matches one listing function against the binary starting at
/// `candidate_start_virtual`. Returns the directive plus whatever was
/// proved and discovered regardless of outcome, so callers can log
/// partial progress even on failure.
pub fn match_function(
    listing: &ListingFunction,
    candidate_start_virtual: u64,
    object: &dyn ObjectModule,
    decoder: &mut dyn DecoderClient,
    image_bytes: &[u8],
) -> (MatchDirective, ProvedMap, Vec<InstructionRoot>) {
    let mut proved = ProvedMap::new();
    let mut roots = Vec::new();

    let Some(phy_start) = object.address_space().virtual_to_physical(candidate_start_virtual) else {
        return (MatchDirective::Fail, proved, roots);
    };

    let mut known_offsets: HashSet<u64> = HashSet::new();
    for instr in &listing.instructions {
        if let Some(v) = object
            .address_space()
            .physical_to_virtual(phy_start + instr.byte_offset_in_function as u64)
        {
            known_offsets.insert(v);
        }
    }

    for instr in &listing.instructions {
        let phy_base = phy_start + instr.byte_offset_in_function as u64;
        let mut cursor_phy = phy_base;
        let mut size_sum = 0usize;
        let mut last_v = 0u64;
        let mut last_flags: Option<flags::InstructionFlags> = None;

        loop {
            let start = cursor_phy as usize;
            let end = (start + MAX_INSTRUCTION_LEN).min(image_bytes.len());
            if start >= image_bytes.len() {
                return (MatchDirective::Fail, proved, roots);
            }
            let window = &image_bytes[start..end];

            let reply = match decoder.decode(cursor_phy, window) {
                Ok(r) => r,
                Err(_) => return (MatchDirective::Fail, proved, roots),
            };
            if !reply.is_instruction || reply.size_in_bytes == 0 {
                return (MatchDirective::Fail, proved, roots);
            }
            let Some(v) = object.address_space().physical_to_virtual(cursor_phy) else {
                return (MatchDirective::Fail, proved, roots);
            };
            proved.insert(v, InstructionSupplement { optional: instr.is_alignment_pad });

            let decoded_flags = object.classify(&reply.mnemonic_text, reply.size_in_bytes);
            if instr.is_alignment_pad && !decoded_flags.is_nop {
                return (MatchDirective::Fail, proved, roots);
            }

            cursor_phy += reply.size_in_bytes as u64;
            size_sum += reply.size_in_bytes;
            last_v = v;
            last_flags = Some(decoded_flags);

            if !(instr.is_alignment_pad && size_sum < instr.byte_length) {
                break;
            }
        }

        if size_sum != instr.byte_length {
            if instr.is_alignment_pad {
                return (MatchDirective::Fail, proved, roots);
            }
            let decoded_flags = last_flags.as_ref().unwrap();
            if object.might_have_multiple_encodings(decoded_flags, instr.byte_length) {
                let start = phy_base as usize;
                let end = cursor_phy as usize;
                let replacement_bytes = image_bytes[start..end].to_vec();
                return (
                    MatchDirective::RequireModify {
                        label_name: instr.label_name.clone(),
                        index_within_label: instr.index_within_label,
                        replacement_bytes,
                    },
                    proved,
                    roots,
                );
            }
            return (MatchDirective::Fail, proved, roots);
        }

        let decoded_flags = last_flags.unwrap();
        for s in flags::successors(&decoded_flags, last_v) {
            if known_offsets.insert(s) {
                roots.push(InstructionRoot { virtual_offset: s, predecessor_virtual_offset: last_v });
            }
        }
    }

    (MatchDirective::Succeed, proved, roots)
}
