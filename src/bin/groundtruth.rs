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
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{arg, Arg, Command};
use log::{error, info, warn, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use groundtruth::builder::{GroundTruthBuilder, Listing};
use groundtruth::decoder::SubprocessDecoder;
use groundtruth::fixer::SubprocessReassembler;
use groundtruth::layout::Layout;
use groundtruth::listing::{gnu, msvc};
use groundtruth::object::{elf_reader, pe_reader, CoffModule, ElfModule, ObjectKind, ObjectModule};
use groundtruth::store::sqlite;
use groundtruth::symtab::{self, SymbolFunction};
use groundtruth::triple::{self, LlvmTriple};

fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("groundtruth")
        .about("Verified disassembly ground-truth generator")
        .version("0.1.0")
        .arg(Arg::new("root").required(true))
        .arg(Arg::new("triple").short('l').long("triple").takes_value(true))
        .arg(Arg::new("gnu").short('g').long("gnu"))
        .arg(Arg::new("single_file").long("single-file").takes_value(true))
        .arg(Arg::new("single_dir").long("single-dir").takes_value(true))
        .arg(Arg::new("no_function_size_check").long("no-function-size-check"))
        .arg(Arg::new("resolver_isa").long("resolver-isa").takes_value(true))
        .arg(Arg::new("dumpbin_machine").long("dumpbin-machine").takes_value(true))
        .arg(Arg::new("print").long("print"))
        .arg(arg!(--verbose "Raise log level to info"))
        .get_matches();

    if matches.is_present("print") {
        for t in triple::SUPPORTED_TRIPLES {
            println!("{t}");
        }
        return Ok(());
    }

    let verbose = matches.is_present("verbose");
    init_logging(if verbose { LevelFilter::Info } else { LevelFilter::Warn });

    let triple_str = matches.value_of("triple").unwrap_or("x86_64-PC-Linux-GNU-ELF");
    let llvm_triple = triple::parse(triple_str)?;
    let gnu_prefix = matches.is_present("gnu");
    let function_size_check = !matches.is_present("no_function_size_check");
    let resolver_isa = matches
        .value_of("resolver_isa")
        .map(str::to_string)
        .unwrap_or_else(|| default_resolver_isa(&llvm_triple).to_string());
    let dumpbin_machine = matches
        .value_of("dumpbin_machine")
        .map(str::to_string)
        .unwrap_or_else(|| triple::default_dumpbin_variant(&llvm_triple).to_string());

    let root = PathBuf::from(matches.value_of("root").unwrap());
    let layout = Layout::new(&root);

    let groups = if let Some(dir) = matches.value_of("single_dir") {
        vec![dir.to_string()]
    } else {
        layout.groups()?
    };

    let mut total_succeed = 0usize;
    let mut total_discard = 0usize;

    for group in &groups {
        layout.ensure_output_dirs(group)?;
        let binaries = layout.binaries(group)?;
        for binary_path in binaries {
            if let Some(only) = matches.value_of("single_file") {
                if binary_path.file_name().and_then(|n| n.to_str()) != Some(only) {
                    continue;
                }
            }
            let binary_name = binary_path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
            println!("\t+ {binary_name}");
            match process_binary(
                &layout,
                group,
                &binary_path,
                &binary_name,
                &llvm_triple,
                gnu_prefix,
                function_size_check,
                &resolver_isa,
                &dumpbin_machine,
            ) {
                Ok(true) => total_succeed += 1,
                Ok(false) => total_discard += 1,
                Err(e) => {
                    println!("\tERROR: {binary_name}: {e}");
                    error!("{binary_name}: {e}");
                    total_discard += 1;
                }
            }
        }
    }

    println!("Succeed: {total_succeed}, Discard: {total_discard}");
    Ok(())
}

fn default_resolver_isa(triple: &LlvmTriple) -> &'static str {
    if triple.is_64_bit {
        "x86-64"
    } else {
        "x86"
    }
}

/// Resolve symbols, objects and listings for one binary, run the
/// builder, and persist its output. Returns whether the binary
/// succeeded (per §4.7's per-binary failure semantics).
fn process_binary(
    layout: &Layout,
    group: &str,
    binary_path: &Path,
    binary_name: &str,
    llvm_triple: &LlvmTriple,
    gnu_prefix: bool,
    function_size_check: bool,
    resolver_isa: &str,
    dumpbin_machine: &str,
) -> Result<bool, Box<dyn Error>> {
    let image_bytes = fs::read(binary_path)?;

    let (object, symbols): (Box<dyn ObjectModule>, Vec<SymbolFunction>) = match llvm_triple.object_kind {
        ObjectKind::ElfX86 => {
            let address_space = elf_reader::address_space(&image_bytes)?;
            let module = ElfModule::new(address_space, Vec::new());
            let mut syms = symtab::nm::generate(binary_path, gnu_prefix)?;
            symtab::sort_by_offset(&mut syms);
            (Box::new(module), syms)
        }
        ObjectKind::CoffX86 => {
            let layout_parsed = pe_reader::parse(&image_bytes)?;
            let module = CoffModule::new(layout_parsed.address_space, layout_parsed.sections);
            let map_path = layout.ref_dir(group).join(format!("{binary_name}.map"));
            let (mut syms, load_base) = symtab::msvc_map::parse(&map_path)?;
            let dump_text = symtab::dumpbin::generate(dumpbin_machine, binary_path)?;
            symtab::dumpbin::refine_binary(&dump_text, load_base, &mut syms);
            symtab::sort_by_offset(&mut syms);
            (Box::new(module), syms)
        }
    };

    let mut listings = load_listings(layout, group, llvm_triple.object_kind)?;

    let mut decoder = SubprocessDecoder::spawn(resolver_isa)?;
    let reassembler = SubprocessReassembler { gnu_prefix };
    let reassembler_ref: Option<&dyn groundtruth::fixer::Reassembler> =
        if llvm_triple.object_kind == ObjectKind::ElfX86 { Some(&reassembler) } else { None };

    let builder = GroundTruthBuilder {
        aggressive_root_search: true,
        function_size_check,
        object_kind: llvm_triple.object_kind,
    };
    let (ground_truth, match_log, binary_failed) = builder.build(
        object.as_ref(),
        &symbols,
        &mut listings,
        &mut decoder,
        &image_bytes,
        binary_name,
        reassembler_ref,
    );

    for line in match_log.lines() {
        info!("{line}");
    }
    fs::write(layout.match_dir(group).join(format!("{binary_name}.mth")), &match_log)?;
    sqlite::create(&layout.gt_dir(group).join(format!("{binary_name}.sqlite")), &ground_truth)?;

    if binary_failed {
        warn!("{binary_name} discarded: one or more required symbols could not be matched");
    }
    Ok(!binary_failed)
}

/// Load every listing under `s/<group>`, dialect chosen per triple.
fn load_listings(layout: &Layout, group: &str, object_kind: ObjectKind) -> Result<Vec<Listing>, Box<dyn Error>> {
    let dir = layout.listing_dir(group);
    let mut listings = Vec::new();
    let entries = fs::read_dir(&dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let model = match object_kind {
            ObjectKind::ElfX86 => gnu::parse(&path)?,
            ObjectKind::CoffX86 => msvc::parse(&path)?,
        };
        let source_path = if object_kind == ObjectKind::ElfX86 { Some(path) } else { None };
        listings.push(Listing { file_name, model, source_path });
    }
    listings.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(listings)
}

/// Configure the `log4rs` console appender the same way across every
/// entry point: plain level-tagged lines to stdout.
fn init_logging(level: LevelFilter) {
    let encoder = PatternEncoder::new("[{l}] {m}{n}");
    let stdout = ConsoleAppender::builder().encoder(Box::new(encoder)).build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .unwrap();
    let _handle = log4rs::init_config(config).unwrap();
}
