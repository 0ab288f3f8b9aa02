//! Builder-level coverage for the MSVC/COFF path: a local symbol that
//! matches normally alongside a C-runtime import with no candidate
//! listing, which must be withheld rather than fail the binary.
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use groundtruth::builder::{GroundTruthBuilder, Listing};
use groundtruth::decoder::{DecodeReply, DecoderClient};
use groundtruth::error::GtResult;
use groundtruth::listing::msvc;
use groundtruth::object::{AddressSpace, CoffModule, ObjectKind, ProgramHeader};
use groundtruth::symtab::SymbolFunction;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_cod(contents: &str) -> std::path::PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("gt_e2e_msvc_{}_{id}.cod", std::process::id()));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

struct CannedDecoder {
    replies: VecDeque<DecodeReply>,
}

impl DecoderClient for CannedDecoder {
    fn decode(&mut self, _phy: u64, _bytes: &[u8]) -> GtResult<DecodeReply> {
        Ok(self.replies.pop_front().expect("decoder exhausted"))
    }
}

fn identity_module() -> CoffModule {
    CoffModule::new(
        AddressSpace::new(vec![ProgramHeader {
            virtual_base: 0x1000,
            physical_base: 0x1000,
            memory_size: 0x2000,
            file_size: 0x2000,
        }]),
        Vec::new(),
    )
}

fn symbol(name: &str, offset: u64, size: u64, source_hint: &str) -> SymbolFunction {
    SymbolFunction {
        name: name.to_string(),
        offset,
        size,
        section_name: ".text".into(),
        source_hint: source_hint.to_string(),
        has_source: true,
    }
}

#[test]
fn library_import_is_withheld_while_local_symbol_still_matches() {
    let cod = "\
_TEXT SEGMENT
main\tPROC
  00000\t b8 00 00 00 00\t mov eax, 0
  00005\t c3\t ret  0
main\tENDP
_TEXT ENDS
";
    let path = temp_cod(cod);
    let model = msvc::parse(&path).unwrap();
    assert_eq!(model.get("main").unwrap().instructions.len(), 2);
    // No listing anywhere defines `memcpy` — it only ever reaches this
    // binary via the CRT import, never a translation unit of its own.
    let mut listings = vec![Listing { file_name: "prog.cod".into(), model, source_path: None }];

    let object = identity_module();
    let symbols = vec![
        symbol("main", 0x1000, 6, "prog.obj"),
        symbol("memcpy", 0x2000, 0, "msvcrt:memcpy.obj"),
    ];
    let image = vec![0xb8, 0, 0, 0, 0, 0xc3];
    let mut decoder = CannedDecoder {
        replies: vec![
            DecodeReply { is_instruction: true, size_in_bytes: 5, mnemonic_text: "mov eax, 0".into() },
            DecodeReply { is_instruction: true, size_in_bytes: 1, mnemonic_text: "ret".into() },
        ]
        .into(),
    };

    let builder = GroundTruthBuilder::new(ObjectKind::CoffX86);
    let (gt, match_log, failed) =
        builder.build(&object, &symbols, &mut listings, &mut decoder, &image, "prog", None);

    assert!(!failed);
    assert_eq!(gt.functions.len(), 1);
    assert_eq!(gt.functions[0].0.name, "main");
    assert!(match_log.contains("main"));
    assert!(!match_log.contains("memcpy"));
}

#[test]
fn missing_local_symbol_fails_the_binary() {
    // Same shape, but the unresolved symbol's source hint names this
    // binary's own object file, not a library — MSVC's stricter rule
    // treats that as a genuine miss.
    let cod = "\
_TEXT SEGMENT
main\tPROC
  00000\t b8 00 00 00 00\t mov eax, 0
  00005\t c3\t ret  0
main\tENDP
_TEXT ENDS
";
    let path = temp_cod(cod);
    let model = msvc::parse(&path).unwrap();
    let mut listings = vec![Listing { file_name: "prog.cod".into(), model, source_path: None }];

    let object = identity_module();
    let symbols = vec![
        symbol("main", 0x1000, 6, "prog.obj"),
        symbol("helper", 0x2000, 4, "prog.obj"),
    ];
    let image = vec![0xb8, 0, 0, 0, 0, 0xc3];
    let mut decoder = CannedDecoder {
        replies: vec![
            DecodeReply { is_instruction: true, size_in_bytes: 5, mnemonic_text: "mov eax, 0".into() },
            DecodeReply { is_instruction: true, size_in_bytes: 1, mnemonic_text: "ret".into() },
        ]
        .into(),
    };

    let builder = GroundTruthBuilder::new(ObjectKind::CoffX86);
    let (gt, _, failed) = builder.build(&object, &symbols, &mut listings, &mut decoder, &image, "prog", None);

    assert!(failed);
    assert_eq!(gt.functions.len(), 1);
}
