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
//! Persistence seam: the matching engine and builder never link
//! against SQLite directly, only the CLI driver and this module's own
//! tests do.
pub mod sqlite;

use crate::error::GtResult;
use crate::groundtruth::GroundTruth;

/// Write and read back a binary's [`GroundTruth`].
pub trait GroundTruthSink {
    fn write(&self, path: &std::path::Path, ground_truth: &GroundTruth) -> GtResult<()>;
}
