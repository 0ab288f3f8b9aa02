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
use std::fmt;

/// Top-level error kinds for a single binary's ground-truth run.  A
/// [`GtError`] always means the containing binary is discarded; milder
/// outcomes (withheld symbols, rejected candidates) are represented as
/// values, not errors, so the builder can keep going.
#[derive(Debug)]
pub enum GtError {
    /// A listing or symbol-table file could not be read or did not
    /// conform to its dialect's grammar.
    ParseFatal(String),
    /// A required (non-library) symbol exhausted every candidate
    /// listing without succeeding.
    MatchFail(String),
    /// Duplicate function in an object, a missing section, or a
    /// listing with no corresponding object file.
    StructuralFail(String),
    /// The decoder could not classify bytes it was asked to resolve.
    DecoderFail(String),
}

impl fmt::Display for GtError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GtError::ParseFatal(m) => write!(f, "parse error: {m}"),
            GtError::MatchFail(m) => write!(f, "match failure: {m}"),
            GtError::StructuralFail(m) => write!(f, "structural failure: {m}"),
            GtError::DecoderFail(m) => write!(f, "decoder failure: {m}"),
        }
    }
}

impl std::error::Error for GtError {}

pub type GtResult<T> = Result<T, GtError>;
