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
//! The on-disk artifact layout under a run's root directory:
//! `bin/<group>/<exe>`, `s/`, `o/`, `ref/`, `match/`, `gt/`.
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GtError, GtResult};

pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn bin_dir(&self, group: &str) -> PathBuf {
        self.root.join("bin").join(group)
    }
    pub fn listing_dir(&self, group: &str) -> PathBuf {
        self.root.join("s").join(group)
    }
    pub fn object_dir(&self, group: &str) -> PathBuf {
        self.root.join("o").join(group)
    }
    pub fn ref_dir(&self, group: &str) -> PathBuf {
        self.root.join("ref").join(group)
    }
    pub fn match_dir(&self, group: &str) -> PathBuf {
        self.root.join("match").join(group)
    }
    pub fn gt_dir(&self, group: &str) -> PathBuf {
        self.root.join("gt").join(group)
    }

    /// Create `match/`, `ref/`, `gt/` for `group` if missing. The
    /// input directories (`bin`, `s`, `o`) are never created — it is
    /// an error for them to be absent.
    pub fn ensure_output_dirs(&self, group: &str) -> GtResult<()> {
        for dir in [self.match_dir(group), self.ref_dir(group), self.gt_dir(group)] {
            fs::create_dir_all(&dir).map_err(|e| GtError::StructuralFail(format!("{}: {e}", dir.display())))?;
        }
        Ok(())
    }

    /// List binaries under `bin/<group>`; every regular file is a
    /// candidate binary to process.
    pub fn binaries(&self, group: &str) -> GtResult<Vec<PathBuf>> {
        list_files(&self.bin_dir(group))
    }

    /// List every group directory name under `bin/`.
    pub fn groups(&self) -> GtResult<Vec<String>> {
        let dir = self.root.join("bin");
        let entries = fs::read_dir(&dir).map_err(|e| GtError::StructuralFail(format!("{}: {e}", dir.display())))?;
        let mut groups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GtError::StructuralFail(e.to_string()))?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    groups.push(name.to_string());
                }
            }
        }
        groups.sort();
        Ok(groups)
    }
}

fn list_files(dir: &Path) -> GtResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| GtError::StructuralFail(format!("{}: {e}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| GtError::StructuralFail(e.to_string()))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
