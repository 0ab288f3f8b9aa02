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
//! Orchestrates candidate-listing ranking per symbol, drives the
//! matcher, folds results into the final [`GroundTruth`], and emits
//! the match log.
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use log::{info, warn};

use crate::decoder::DecoderClient;
use crate::fixer::{self, ListingFixer, Reassembler};
use crate::flags;
use crate::groundtruth::{FunctionRange, GroundTruth};
use crate::listing::{gnu, ListingModel};
use crate::matcher::{self, InstructionRoot, InstructionSupplement, MatchDirective};
use crate::object::{ObjectKind, ObjectModule};
use crate::symtab::SymbolFunction;

/// One candidate listing file and its parsed functions. `source_path`
/// is only populated for GNU listings that can be patched by the
/// fixer; MSVC listings never carry one.
pub struct Listing {
    pub file_name: String,
    pub model: ListingModel,
    pub source_path: Option<PathBuf>,
}

const MAX_FIX_ROUNDS: usize = 8;

pub struct GroundTruthBuilder {
    pub aggressive_root_search: bool,
    pub function_size_check: bool,
    pub object_kind: ObjectKind,
}

impl Default for GroundTruthBuilder {
    fn default() -> Self {
        Self { aggressive_root_search: true, function_size_check: true, object_kind: ObjectKind::ElfX86 }
    }
}

impl GroundTruthBuilder {
    pub fn new(object_kind: ObjectKind) -> Self {
        Self { object_kind, ..Default::default() }
    }

    /// Runs the full build: one pass per round, applying any
    /// `RequireModify` fixes between rounds (ELF only) until either
    /// every required symbol is solved or a round makes no progress.
    pub fn build(
        &self,
        object: &dyn ObjectModule,
        symbols: &[SymbolFunction],
        listings: &mut [Listing],
        decoder: &mut dyn DecoderClient,
        image_bytes: &[u8],
        binary_name: &str,
        reassembler: Option<&dyn Reassembler>,
    ) -> (GroundTruth, String, bool) {
        let mut ground_truth = GroundTruth::new();
        let mut used: HashSet<String> = HashSet::new();
        let mut solved: HashSet<String> = HashSet::new();
        let mut match_log = String::new();
        // ELF withholds every unmatched symbol (log only, never fails
        // the binary); MSVC treats a non-withheld miss as fatal.
        let mut binary_failed = false;

        let mut symbols_sorted: Vec<&SymbolFunction> = symbols.iter().collect();
        symbols_sorted.sort_by_key(|s| s.offset);

        for round in 0..MAX_FIX_ROUNDS {
            let solved_before_round = solved.len();
            let mut pending_fix: Option<(usize, String, usize, Vec<u8>)> = None;

            for symbol in &symbols_sorted {
                if solved.contains(&symbol.name) {
                    continue;
                }
                let candidate_indices =
                    rank_candidates(self.object_kind, symbol, listings, &used, binary_name);
                if candidate_indices.is_empty() {
                    if is_withheld(self.object_kind, symbol) {
                        warn!("withheld {} (library symbol, no candidate listing)", symbol.name);
                    } else {
                        warn!("no candidate listing for {}", symbol.name);
                        binary_failed = true;
                    }
                    continue;
                }

                let mut matched = false;
                for &idx in &candidate_indices {
                    let Some(listing_fn) = listings[idx].model.get(&symbol.name) else { continue };
                    let (directive, proved, roots) =
                        matcher::match_function(listing_fn, symbol.offset, object, decoder, image_bytes);

                    match directive {
                        MatchDirective::Succeed => {
                            let Some(phy_start) = object.address_space().virtual_to_physical(symbol.offset) else {
                                continue;
                            };
                            let Some(upper_bound) = object
                                .address_space()
                                .physical_to_virtual(phy_start + listing_fn.total_byte_length as u64)
                            else {
                                continue;
                            };

                            if self.object_kind == ObjectKind::ElfX86 && self.function_size_check {
                                let span = upper_bound.saturating_sub(symbol.offset);
                                if span > symbol.size + 15 {
                                    continue;
                                }
                            }

                            let mut proved = proved;
                            let mut roots = roots;
                            if self.aggressive_root_search {
                                run_aggressive_root_search(
                                    object,
                                    decoder,
                                    image_bytes,
                                    &mut roots,
                                    &mut proved,
                                    symbol.offset,
                                    upper_bound,
                                );
                            }

                            let offsets: Vec<u64> = proved.keys().copied().collect();
                            ground_truth.merge_instructions(&proved);
                            ground_truth.push_function(
                                FunctionRange { name: symbol.name.clone(), start_virtual: symbol.offset, end_virtual: upper_bound },
                                offsets,
                            );
                            used.insert(listings[idx].file_name.clone());
                            solved.insert(symbol.name.clone());
                            match_log.push_str(&format!(
                                "{} > {} < {}\n",
                                symbol.source_hint, symbol.name, listings[idx].file_name
                            ));
                            info!("+ {} matched via {}", symbol.name, listings[idx].file_name);
                            matched = true;
                            break;
                        }
                        MatchDirective::Fail => continue,
                        MatchDirective::RequireModify { label_name, index_within_label, replacement_bytes } => {
                            if self.object_kind != ObjectKind::ElfX86 || reassembler.is_none() {
                                continue;
                            }
                            pending_fix = Some((idx, label_name, index_within_label, replacement_bytes));
                            break;
                        }
                    }
                }

                if !matched && pending_fix.is_some() {
                    break;
                }
                if !matched && pending_fix.is_none() {
                    if is_withheld(self.object_kind, symbol) {
                        warn!("withheld {} (no candidate matched, looks like a library symbol)", symbol.name);
                    } else {
                        warn!("{} cannot find a match", symbol.name);
                        binary_failed = true;
                    }
                }
            }

            let Some((idx, label_name, index_within_label, replacement_bytes)) = pending_fix else {
                break;
            };
            let Some(reassembler) = reassembler else { break };
            let Some(source_path) = listings[idx].source_path.clone() else { break };

            let fixer = ListingFixer::new(reassembler);
            if fixer.apply_fix(&source_path, &label_name, index_within_label, &replacement_bytes).is_err() {
                break;
            }
            let Ok(reparsed) = gnu::parse(&source_path) else { break };
            let drifted = fixer::detect_drift(&listings[idx].model, &reparsed);
            for name in &drifted {
                solved.remove(name);
                ground_truth.remove_function(name);
            }
            listings[idx].model = reparsed;

            if solved.len() <= solved_before_round && round > 0 {
                break;
            }
        }

        // ELF never hard-fails a binary over unmatched symbols: every
        // miss is logged as a withheld match, matching the upstream
        // generator's commented-out `failure = true` on this path.
        let binary_failed = binary_failed && self.object_kind == ObjectKind::CoffX86;
        (ground_truth, match_log, binary_failed)
    }
}

/// MSVC withholds a miss when the source hint names a library object
/// (`lib:object` shape); ELF withholds unconditionally, since its
/// generator never distinguishes library misses from genuine ones.
fn is_withheld(kind: ObjectKind, symbol: &SymbolFunction) -> bool {
    match kind {
        ObjectKind::CoffX86 => symbol.source_hint.contains(':'),
        ObjectKind::ElfX86 => true,
    }
}

fn strip_ext(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

fn basename_matches(listing_stem: &str, binary_name: &str) -> bool {
    if listing_stem == binary_name
        || listing_stem.starts_with(binary_name)
        || listing_stem.ends_with(binary_name)
        || binary_name.starts_with(listing_stem)
        || binary_name.ends_with(listing_stem)
    {
        return true;
    }
    listing_stem.split('_').any(|tok| tok == binary_name) || binary_name.split('_').any(|tok| tok == listing_stem)
}

/// Rank candidate listing indices for `symbol`, per `kind`'s priority
/// rules. Only listings containing a non-empty function of that name
/// are returned at all.
pub fn rank_candidates(
    kind: ObjectKind,
    symbol: &SymbolFunction,
    listings: &[Listing],
    used: &HashSet<String>,
    binary_name: &str,
) -> Vec<usize> {
    let mut candidates: Vec<usize> = listings
        .iter()
        .enumerate()
        .filter(|(_, l)| l.model.get(&symbol.name).is_some_and(|f| !f.instructions.is_empty()))
        .map(|(i, _)| i)
        .collect();

    match kind {
        ObjectKind::ElfX86 => {
            candidates.sort_by_key(|&i| {
                let is_prior = !used.contains(&listings[i].file_name);
                let name_matches = !basename_matches(strip_ext(&listings[i].file_name), binary_name);
                (is_prior, name_matches)
            });
        }
        ObjectKind::CoffX86 => {
            let hint_stem = strip_ext(&symbol.source_hint).to_string();
            candidates.sort_by_key(|&i| {
                let stem = strip_ext(&listings[i].file_name);
                let exact_hint = stem != hint_stem;
                let is_used = !used.contains(&listings[i].file_name);
                (exact_hint, is_used)
            });
        }
    }
    candidates
}

/// BFS over instruction roots the matcher couldn't place in the
/// listing. Bounds: `[function_start, upper_bound)`; every proved
/// offset is marked `optional = true`.
fn run_aggressive_root_search(
    object: &dyn ObjectModule,
    decoder: &mut dyn DecoderClient,
    image_bytes: &[u8],
    roots: &mut Vec<InstructionRoot>,
    proved: &mut matcher::ProvedMap,
    lower_bound: u64,
    upper_bound: u64,
) {
    let mut queue: VecDeque<InstructionRoot> = roots.drain(..).collect();
    while let Some(root) = queue.pop_front() {
        let v = root.virtual_offset;
        if proved.contains_key(&v) {
            continue;
        }
        if v < lower_bound || v >= upper_bound {
            continue;
        }
        if !object.address_space().virtual_is_valid(v) {
            continue;
        }
        let Some(phy) = object.address_space().virtual_to_physical(v) else { continue };
        let start = phy as usize;
        if start >= image_bytes.len() {
            continue;
        }
        let end = (start + matcher::MAX_INSTRUCTION_LEN).min(image_bytes.len());
        let Ok(reply) = decoder.decode(phy, &image_bytes[start..end]) else { continue };
        if !reply.is_instruction || reply.size_in_bytes == 0 {
            continue;
        }
        proved.insert(v, InstructionSupplement { optional: true });
        let decoded = object.classify(&reply.mnemonic_text, reply.size_in_bytes);
        for s in flags::successors(&decoded, v) {
            queue.push_back(InstructionRoot { virtual_offset: s, predecessor_virtual_offset: v });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str) -> Listing {
        Listing { file_name: name.to_string(), model: ListingModel::new(), source_path: None }
    }

    fn symbol(name: &str, hint: &str) -> SymbolFunction {
        SymbolFunction {
            name: name.to_string(),
            offset: 0,
            size: 0,
            section_name: ".text".into(),
            source_hint: hint.to_string(),
            has_source: true,
        }
    }

    #[test]
    fn elf_ranking_prefers_prior_then_name_match() {
        use crate::listing::{ListingFunction, ListingInstruction};
        let insn = ListingInstruction {
            byte_offset_in_function: 0,
            byte_length: 1,
            is_alignment_pad: false,
            label_name: "foo:".into(),
            index_within_label: 0,
        };
        let mut prior = listing("prog_a.lst");
        prior.model.insert(
            "foo".into(),
            ListingFunction { instructions: vec![insn.clone()], labels: vec![], total_byte_length: 1, source_file_name: String::new() },
        );
        let mut other = listing("prog_b.lst");
        other.model.insert(
            "foo".into(),
            ListingFunction { instructions: vec![insn], labels: vec![], total_byte_length: 1, source_file_name: String::new() },
        );
        let listings = vec![other, prior];
        let mut used = HashSet::new();
        used.insert("prog_a.lst".to_string());
        let ranked = rank_candidates(ObjectKind::ElfX86, &symbol("foo", ""), &listings, &used, "prog");
        assert_eq!(ranked[0], 1);
    }

    #[test]
    fn msvc_ranking_prefers_source_hint_match() {
        use crate::listing::{ListingFunction, ListingInstruction};
        let insn = ListingInstruction {
            byte_offset_in_function: 0,
            byte_length: 1,
            is_alignment_pad: false,
            label_name: "foo:".into(),
            index_within_label: 0,
        };
        let mut a = listing("a.cod");
        a.model.insert(
            "foo".into(),
            ListingFunction { instructions: vec![insn.clone()], labels: vec![], total_byte_length: 1, source_file_name: String::new() },
        );
        let mut b = listing("b.cod");
        b.model.insert(
            "foo".into(),
            ListingFunction { instructions: vec![insn], labels: vec![], total_byte_length: 1, source_file_name: String::new() },
        );
        let listings = vec![a, b];
        let used = HashSet::new();
        let ranked = rank_candidates(ObjectKind::CoffX86, &symbol("foo", "b.obj"), &listings, &used, "prog");
        assert_eq!(ranked[0], 1);
    }

    #[test]
    fn withheld_rule_differs_by_dialect() {
        let msvc_lib = symbol("memcpy", "msvcrt:memcpy.obj");
        assert!(is_withheld(ObjectKind::CoffX86, &msvc_lib));
        let msvc_local = symbol("main", "prog.obj");
        assert!(!is_withheld(ObjectKind::CoffX86, &msvc_local));
        let elf_any_source = symbol("memcpy", "libc.c");
        assert!(is_withheld(ObjectKind::ElfX86, &elf_any_source));
    }
}
