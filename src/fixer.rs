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
//! Rewrites a formalized `.fm.s` source when the matcher asks for a
//! `RequireModify`, and re-assembles it. ELF path only — MSVC listings
//! are never patched.
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::{GtError, GtResult};
use crate::listing::ListingModel;

/// Invokes the external assembler toolchain (`as`/`gcc -c`, optionally
/// `g`-prefixed). Injected so the fixer's own logic — locate by label,
/// rewrite as `.byte`, detect post-modify drift — is testable without
/// a real toolchain present.
pub trait Reassembler {
    fn reassemble(&self, source_path: &Path) -> GtResult<()>;
}

/// Each instruction line the formalizer emits carries a trailing
/// `# @<label>#<index>` marker; that's the 1:1 contract between the
/// parser's `(label_name, index_within_label)` and the source text.
fn marker(label_name: &str, index_within_label: usize) -> String {
    format!("@{label_name}#{index_within_label}")
}

/// Rewrite the single instruction line tagged with `(label_name,
/// index_within_label)` to a `.byte` directive encoding
/// `replacement_bytes`, keeping its marker comment intact. The
/// rewritten line stays in listing-line grammar (offset field, space-
/// separated hex-pair bytes field) rather than GAS `.byte 0x..`
/// syntax, since this same file is re-parsed by [`crate::listing::gnu`]
/// once reassembly completes.
pub fn rewrite_instruction(
    source: &str,
    label_name: &str,
    index_within_label: usize,
    replacement_bytes: &[u8],
) -> GtResult<String> {
    let needle = marker(label_name, index_within_label);
    let mut out = Vec::new();
    let mut found = false;
    for line in source.lines() {
        if line.contains(&needle) {
            let offset_field = line.split('\t').next().unwrap_or("");
            let byte_list: Vec<String> = replacement_bytes.iter().map(|b| format!("{b:02x}")).collect();
            out.push(format!("{offset_field}\t{}\t.byte\t# {needle}", byte_list.join(" ")));
            found = true;
        } else {
            out.push(line.to_string());
        }
    }
    if !found {
        return Err(GtError::StructuralFail(format!(
            "no instruction tagged {needle} in formalized source"
        )));
    }
    out.push(String::new());
    Ok(out.join("\n"))
}

pub struct ListingFixer<'a> {
    reassembler: &'a dyn Reassembler,
}

impl<'a> ListingFixer<'a> {
    pub fn new(reassembler: &'a dyn Reassembler) -> Self {
        Self { reassembler }
    }

    /// Apply one `RequireModify` fix to `source_path` and re-assemble
    /// it. Re-parsing the resulting `.lst` is the caller's job (it
    /// already owns the GNU listing parser).
    pub fn apply_fix(
        &self,
        source_path: &Path,
        label_name: &str,
        index_within_label: usize,
        replacement_bytes: &[u8],
    ) -> GtResult<()> {
        let text = fs::read_to_string(source_path)
            .map_err(|e| GtError::StructuralFail(format!("{}: {e}", source_path.display())))?;
        let rewritten = rewrite_instruction(&text, label_name, index_within_label, replacement_bytes)?;
        fs::write(source_path, rewritten)
            .map_err(|e| GtError::StructuralFail(format!("{}: {e}", source_path.display())))?;
        self.reassembler.reassemble(source_path)
    }
}

/// Shells out to the GNU assembler toolchain to regenerate a listing
/// after [`rewrite_instruction`] patches it. Optionally `g`-prefixed
/// (cross toolchains installed as `gas`/`ggcc` on some distros).
pub struct SubprocessReassembler {
    pub gnu_prefix: bool,
}

impl Reassembler for SubprocessReassembler {
    fn reassemble(&self, source_path: &Path) -> GtResult<()> {
        let prefix = if self.gnu_prefix { "g" } else { "" };
        let status = Command::new(format!("{prefix}as"))
            .arg(source_path)
            .status()
            .map_err(|e| GtError::StructuralFail(format!("failed to launch {prefix}as: {e}")))?;
        if !status.success() {
            return Err(GtError::StructuralFail(format!(
                "{prefix}as failed to reassemble {}",
                source_path.display()
            )));
        }
        Ok(())
    }
}

/// After a fix round, functions whose re-parsed instructions differ
/// from their prior version must be re-matched even if they had
/// already succeeded (binutils PR 25621: one function's assembler fix
/// can perturb another's encoding within the same translation unit).
pub fn detect_drift(before: &ListingModel, after: &ListingModel) -> Vec<String> {
    let mut drifted = Vec::new();
    for (name, old_func) in before {
        match after.get(name) {
            Some(new_func) if new_func.instructions != old_func.instructions => drifted.push(name.clone()),
            None => drifted.push(name.clone()),
            _ => {}
        }
    }
    drifted
}
