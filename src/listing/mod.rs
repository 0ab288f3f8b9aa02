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

/// Parses MSVC `.cod` listings.
pub mod msvc;
/// Parses GNU `.lst` listings (post listing-fixer formalization).
pub mod gnu;

use std::collections::HashMap;

/// A single instruction recorded in a listing, at a byte offset
/// relative to the start of its enclosing function.  Immutable once
/// parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingInstruction {
    pub byte_offset_in_function: usize,
    pub byte_length: usize,
    pub is_alignment_pad: bool,
    pub label_name: String,
    pub index_within_label: usize,
}

/// A named location within a function, partitioning its instructions
/// into runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLabel {
    pub byte_offset_in_function: usize,
    pub name: String,
}

/// One translation unit's view of a single function: its instructions
/// and labels in listing order, its total byte length, and the source
/// file the compiler attributed it to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFunction {
    pub instructions: Vec<ListingInstruction>,
    pub labels: Vec<ListingLabel>,
    pub total_byte_length: usize,
    pub source_file_name: String,
}

impl ListingFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove trailing alignment-padding instructions (and any label
    /// whose only instruction was such padding).  Both dialects call
    /// this once parsing of a function's body is complete.
    pub fn trim_trailing_alignment(&mut self) {
        let mut remove_insns = 0usize;
        let mut remove_labels = 0usize;
        for insn in self.instructions.iter().rev() {
            if !insn.is_alignment_pad {
                break;
            }
            remove_insns += 1;
            if insn.index_within_label == 0 {
                remove_labels += 1;
            }
        }
        let keep = self.instructions.len() - remove_insns;
        self.instructions.truncate(keep);
        let keep_labels = self.labels.len() - remove_labels;
        self.labels.truncate(keep_labels);
    }
}

/// A single translation unit's listing: every function it defines,
/// keyed by name.
pub type ListingModel = HashMap<String, ListingFunction>;
