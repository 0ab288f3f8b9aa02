//! Cross-module coverage the per-file unit tests don't reach: a
//! builder result persisted through the real sqlite store, and the
//! on-disk directory layout exercised against a real filesystem tree
//! rather than just string-building its paths.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use groundtruth::builder::{GroundTruthBuilder, Listing};
use groundtruth::decoder::{DecodeReply, DecoderClient};
use groundtruth::error::GtResult;
use groundtruth::layout::Layout;
use groundtruth::listing::gnu;
use groundtruth::object::{AddressSpace, ElfModule, ObjectKind, ProgramHeader};
use groundtruth::store::sqlite;
use groundtruth::symtab::SymbolFunction;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_dir(prefix: &str) -> std::path::PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("gt_{prefix}_{}_{id}", std::process::id()));
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

#[test]
fn builder_output_round_trips_through_sqlite() {
    let lst_path = temp_dir("pipeline_lst").with_extension("lst");
    std::fs::write(&lst_path, "main:\n  0:\tb8 00 00 00 00\tmov    %eax,0x0\n  5:\tc3\tret\n").unwrap();
    let model = gnu::parse(&lst_path).unwrap();
    let mut listings = vec![Listing { file_name: "prog.lst".into(), model, source_path: Some(lst_path) }];

    let object = ElfModule::new(
        AddressSpace::new(vec![ProgramHeader {
            virtual_base: 0x1000,
            physical_base: 0x1000,
            memory_size: 0x1000,
            file_size: 0x1000,
        }]),
        Vec::new(),
    );
    let symbols = vec![SymbolFunction {
        name: "main".into(),
        offset: 0x1000,
        size: 6,
        section_name: ".text".into(),
        source_hint: "prog.c".into(),
        has_source: true,
    }];
    let image = vec![0xb8, 0, 0, 0, 0, 0xc3];
    let mut decoder = CannedDecoder {
        replies: vec![
            DecodeReply { is_instruction: true, size_in_bytes: 5, mnemonic_text: "mov %eax,0x0".into() },
            DecodeReply { is_instruction: true, size_in_bytes: 1, mnemonic_text: "ret".into() },
        ]
        .into(),
    };

    let builder = GroundTruthBuilder::new(ObjectKind::ElfX86);
    let (ground_truth, _, failed) =
        builder.build(&object, &symbols, &mut listings, &mut decoder, &image, "prog", None);
    assert!(!failed);

    let db_path = temp_dir("pipeline_db").with_extension("sqlite");
    sqlite::create(&db_path, &ground_truth).unwrap();
    let (instructions, functions) = sqlite::read(&db_path).unwrap();

    assert_eq!(instructions.len(), ground_truth.instructions.len());
    assert!(!instructions[&0x1000].optional);
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].name, "main");
    assert_eq!(functions[0].start_virtual, 0x1000);
    assert_eq!(functions[0].end_virtual, 0x1006);
}

#[test]
fn layout_ensure_output_dirs_creates_tree_and_lists_group_binaries() {
    let root = temp_dir("layout_root");
    std::fs::create_dir_all(root.join("bin").join("g1")).unwrap();
    std::fs::create_dir_all(root.join("bin").join("g2")).unwrap();
    std::fs::write(root.join("bin").join("g1").join("prog"), b"\0").unwrap();
    std::fs::write(root.join("bin").join("g1").join("prog2"), b"\0").unwrap();

    let layout = Layout::new(&root);
    let mut groups = layout.groups().unwrap();
    groups.sort();
    assert_eq!(groups, vec!["g1".to_string(), "g2".to_string()]);

    assert!(!layout.match_dir("g1").exists());
    layout.ensure_output_dirs("g1").unwrap();
    assert!(layout.match_dir("g1").is_dir());
    assert!(layout.ref_dir("g1").is_dir());
    assert!(layout.gt_dir("g1").is_dir());

    let binaries = layout.binaries("g1").unwrap();
    assert_eq!(binaries.len(), 2);
    assert!(binaries.iter().all(|p| p.starts_with(root.join("bin").join("g1"))));

    std::fs::remove_dir_all(&root).unwrap();
}
