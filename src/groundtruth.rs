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
//! The final, per-binary result [`crate::builder::GroundTruthBuilder`]
//! produces, ready to hand to [`crate::store`].
use std::collections::HashMap;

use crate::matcher::{InstructionSupplement, ProvedMap};

/// A named, half-open instruction range: `start_virtual ≤ v <
/// end_virtual` for every offset attributed to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRange {
    pub name: String,
    pub start_virtual: u64,
    pub end_virtual: u64,
}

/// Every proved instruction offset (with its optionality) and every
/// function's range plus the offsets attributed to it.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    pub instructions: ProvedMap,
    pub functions: Vec<(FunctionRange, Vec<u64>)>,
}

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another match's proved instructions in, AND-composing
    /// `optional`: an instruction already proved non-optional by one
    /// source stays non-optional no matter what a later source says.
    pub fn merge_instructions(&mut self, proved: &ProvedMap) {
        for (&offset, supplement) in proved {
            self.instructions
                .entry(offset)
                .and_modify(|existing| existing.optional = existing.optional && supplement.optional)
                .or_insert(*supplement);
        }
    }

    pub fn push_function(&mut self, range: FunctionRange, offsets: Vec<u64>) {
        self.functions.push((range, offsets));
    }

    /// Drop a function and un-merge nothing else — used when a fix
    /// round invalidates a previously-succeeded function so it can be
    /// re-matched from scratch. Offsets proved only by this function
    /// are left in the instruction map; a subsequent successful
    /// re-match overwrites them, and a failed one leaves them as
    /// harmless orphans (still valid instructions, just unattributed
    /// until the next round resolves them).
    pub fn remove_function(&mut self, name: &str) {
        self.functions.retain(|(range, _)| range.name != name);
    }

    pub fn supplement(&self, offset: u64) -> Option<&InstructionSupplement> {
        self.instructions.get(&offset)
    }
}

/// Build a quick lookup for the store: offset → containing function
/// name, used only in tests and diagnostics.
pub fn offset_to_function(gt: &GroundTruth) -> HashMap<u64, String> {
    let mut map = HashMap::new();
    for (range, offsets) in &gt.functions {
        for &off in offsets {
            map.insert(off, range.name.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_non_optional_when_any_source_says_so() {
        let mut gt = GroundTruth::new();
        let mut a = ProvedMap::new();
        a.insert(0x1000, InstructionSupplement { optional: true });
        let mut b = ProvedMap::new();
        b.insert(0x1000, InstructionSupplement { optional: false });
        gt.merge_instructions(&a);
        gt.merge_instructions(&b);
        assert!(!gt.supplement(0x1000).unwrap().optional);
    }

    #[test]
    fn remove_function_drops_only_named_range() {
        let mut gt = GroundTruth::new();
        gt.push_function(FunctionRange { name: "foo".into(), start_virtual: 0, end_virtual: 1 }, vec![0]);
        gt.push_function(FunctionRange { name: "bar".into(), start_virtual: 1, end_virtual: 2 }, vec![1]);
        gt.remove_function("foo");
        assert_eq!(gt.functions.len(), 1);
        assert_eq!(gt.functions[0].0.name, "bar");
    }
}
