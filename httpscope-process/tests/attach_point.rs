use std::os::unix::fs::MetadataExt;

use httpscope_process::{pidns, resolve_function, AttachPoint, ProcessError, ROUND_TRIP_SYMBOL};

#[test]
fn test_current_pid_namespace_matches_procfs() {
    let meta = std::fs::metadata(pidns::SELF_PIDNS).unwrap();
    let ns = pidns::current().unwrap();
    assert_eq!((ns.dev, ns.ino), (meta.dev(), meta.ino()));
}

#[test]
fn test_round_trip_symbol_absent_from_non_go_binary() {
    let exe = std::env::current_exe().unwrap();
    match resolve_function(&exe, ROUND_TRIP_SYMBOL) {
        Err(ProcessError::SymbolNotFound { symbol, path }) => {
            assert_eq!(symbol, ROUND_TRIP_SYMBOL);
            assert_eq!(path, exe);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_return_offsets_point_at_return_instructions() {
    // Rust test binaries are unstripped and their C `main` returns normally.
    let exe = std::env::current_exe().unwrap();
    let function = resolve_function(&exe, "main").unwrap();
    let image = std::fs::read(&exe).unwrap();

    let at = AttachPoint::returns_of(&function, None);
    assert_eq!(at.offsets.len(), function.returns.len());
    for offset in at.offsets {
        let offset = offset as usize;
        assert!(offset >= function.file_offset as usize);
        if cfg!(target_arch = "x86_64") {
            // Plain or imm16 RET, possibly behind a REP or BND prefix
            assert!(matches!(image[offset], 0xc3 | 0xc2 | 0xf3 | 0xf2), "0x{offset:x}");
        } else if cfg!(target_arch = "aarch64") {
            let word = u32::from_le_bytes(image[offset..offset + 4].try_into().unwrap());
            assert_eq!(word & 0xffff_fc1f, 0xd65f_0000, "0x{offset:x}");
        }
    }
}
