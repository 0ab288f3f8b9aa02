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
//! Verified disassembly ground-truth generation for compiled x86 and
//! x86-64 binaries: proving, byte-exact, which file offsets are real
//! instructions and which function each belongs to, by matching a
//! compiler's assembly listing against the linked binary's bytes.

pub mod builder;
pub mod decoder;
pub mod error;
pub mod fixer;
pub mod flags;
pub mod groundtruth;
pub mod layout;
pub mod listing;
pub mod matcher;
pub mod object;
pub mod store;
pub mod symtab;
pub mod triple;

#[cfg(test)]
mod test_support;
