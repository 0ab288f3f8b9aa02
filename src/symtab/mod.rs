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

/// ELF symbol resolution via `nm -f sys5`.
pub mod nm;
/// MSVC linker `.map` file resolution.
pub mod msvc_map;
/// MSVC `dumpbin.exe` output resolution, both binary- and object-level.
pub mod dumpbin;

/// A function symbol as reported by a binary's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFunction {
    pub name: String,
    /// Virtual-address offset within the binary.
    pub offset: u64,
    /// May be `0` (absent) or unreliable (MSVC); the builder treats
    /// both cases specially.
    pub size: u64,
    pub section_name: String,
    /// Source-file hint as reported by the symbol table (possibly
    /// containing a `lib:object` qualifier on the MSVC side).
    pub source_hint: String,
    pub has_source: bool,
}

/// Sort a resolved symbol list ascending by offset, as every back end
/// is required to hand back to the builder.
pub fn sort_by_offset(symbols: &mut [SymbolFunction]) {
    symbols.sort_by_key(|s| s.offset);
}
