//! セッションとディスパッチャの統合テスト

use std::sync::Arc;
use sumire_core::{
    register_builtins, CommandOutput, DispatchResult, Dispatcher, Session, SymbolService,
};
use sumire_target::{Arch, SnapshotBuilder};

const APP_BASE: u64 = 0x1000;
const MRT_BASE: u64 = 0x1_0000;
const HEAP_DIR: u64 = 0x2_0000;
const SEG_START: u64 = 0x3_0000;
const TYPE_WIDGET: u64 = 0x4_0000;

const APP_ID: [u8; 16] = [0xaa; 16];

fn runtime_image() -> Vec<u8> {
    let mut bytes = b"MRT0".to_vec();
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&HEAP_DIR.to_le_bytes());
    bytes
}

fn heap_directory(segments: &[(u64, u64)]) -> Vec<u8> {
    let mut bytes = b"HEAP".to_vec();
    bytes.extend_from_slice(&(segments.len() as u32).to_le_bytes());
    for (start, end) in segments {
        bytes.extend_from_slice(&start.to_le_bytes());
        bytes.extend_from_slice(&end.to_le_bytes());
    }
    bytes
}

fn v1_object(type_handle: u64, size: u64) -> Vec<u8> {
    let mut bytes = type_handle.to_le_bytes().to_vec();
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes.resize(size as usize, 0);
    bytes
}

fn type_descriptor(module_base: u64, token: u32, instance_size: u32) -> Vec<u8> {
    let mut bytes = module_base.to_le_bytes().to_vec();
    bytes.extend_from_slice(&token.to_le_bytes());
    bytes.extend_from_slice(&instance_size.to_le_bytes());
    bytes
}

/// ランタイムと2オブジェクトのヒープ、スレッド2本を持つダンプ
fn build_dump(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    let seg_end = SEG_START + 0x40;
    let mut heap = v1_object(TYPE_WIDGET, 0x20);
    heap.extend(v1_object(TYPE_WIDGET, 0x20));

    SnapshotBuilder::new(Arch::X86_64)
        .process_id(100)
        .module(APP_BASE, 0x1000, APP_ID, "3.0", "/usr/bin/app")
        .module(MRT_BASE, 0x1000, [0xbb; 16], "1.4.2", "/usr/lib/libmrt.so")
        .thread(7, APP_BASE + 0x100, 0x5_0000, 0)
        .thread(8, APP_BASE + 0x200, 0x5_1000, 0)
        .region(MRT_BASE, runtime_image())
        .region(HEAP_DIR, heap_directory(&[(SEG_START, seg_end)]))
        .region(SEG_START, heap)
        .region(TYPE_WIDGET, type_descriptor(APP_BASE, 0x7, 0x18))
        .build_to_file(dir, name)
        .unwrap()
}

fn session_with_symbols(sym_dir: &std::path::Path) -> Session {
    let key = sumire_core::SymbolKey::new("app", &APP_ID);
    std::fs::write(sym_dir.join(key.file_name()), "T 7 App.Widget\nM 0 1000 App.Main\n").unwrap();

    let service = SymbolService::new();
    service.add_directory_path(sym_dir);
    Session::new(Arc::new(service))
}

fn dispatcher() -> Dispatcher {
    let mut d = Dispatcher::new();
    register_builtins(&mut d).unwrap();
    d
}

fn run_ok(d: &Dispatcher, session: &mut Session, line: &str) -> CommandOutput {
    match d.execute(session, line) {
        DispatchResult::Done(output) => output,
        DispatchResult::Failed(msg) => panic!("command '{}' failed: {}", line, msg),
    }
}

fn run_err(d: &Dispatcher, session: &mut Session, line: &str) -> String {
    match d.execute(session, line) {
        DispatchResult::Failed(msg) => msg,
        DispatchResult::Done(_) => panic!("command '{}' unexpectedly succeeded", line),
    }
}

#[test]
fn test_open_switch_close() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = build_dump(dir.path(), "a.sdmp");
    let path_b = build_dump(dir.path(), "b.sdmp");
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    run_ok(&d, &mut session, &format!("open {}", path_a.display()));
    run_ok(&d, &mut session, &format!("open {}", path_b.display()));
    assert_eq!(session.current_id().unwrap(), 2);

    // 最初のターゲットに戻れる
    run_ok(&d, &mut session, "target 1");
    assert_eq!(session.current_id().unwrap(), 1);

    // カレントを閉じると選択が外れる
    run_ok(&d, &mut session, "close");
    assert!(session.current_id().is_err());
    assert_eq!(session.target_ids(), vec![2]);

    // 存在しないIDのcloseは冪等
    run_ok(&d, &mut session, "close 99");
}

#[test]
fn test_target_commands_require_open_target() {
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    for line in ["modules", "threads", "runtimes", "dumpheap", "backtrace"] {
        let msg = run_err(&d, &mut session, line);
        assert!(msg.contains("missing required service"), "{}: {}", line, msg);
    }
}

#[test]
fn test_unknown_and_ambiguous_commands() {
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    let msg = run_err(&d, &mut session, "frobnicate");
    assert!(msg.contains("unknown command"));

    // "ta"は targets/target のどちらにも前方一致する
    let msg = run_err(&d, &mut session, "ta");
    assert!(msg.contains("ambiguous"));

    // 完全一致するエイリアスは前方一致より優先される
    let output = run_ok(&d, &mut session, "h");
    assert!(!output.lines.is_empty());
}

#[test]
fn test_case_insensitive_and_prefix_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_dump(dir.path(), "r.sdmp");
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    run_ok(&d, &mut session, &format!("open {}", path.display()));

    // 大文字小文字は区別しない
    let upper = run_ok(&d, &mut session, "MODULES");
    let lower = run_ok(&d, &mut session, "modules");
    assert_eq!(upper.lines, lower.lines);
    assert_eq!(upper.lines.len(), 2);

    // 一意な前方一致は解決される（大文字でも）
    let prefixed = run_ok(&d, &mut session, "modu");
    assert_eq!(prefixed.lines, lower.lines);
    let bt = run_ok(&d, &mut session, "BACK");
    assert!(bt.lines[0].contains("thread 7"));
}

#[test]
fn test_empty_line_does_nothing() {
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    let output = run_ok(&d, &mut session, "   ");
    assert!(output.lines.is_empty());
    assert!(!output.exit);
}

#[test]
fn test_quit_requests_exit() {
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    assert!(run_ok(&d, &mut session, "quit").exit);
    assert!(run_ok(&d, &mut session, "exit").exit);
}

#[test]
fn test_thread_selection_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_dump(dir.path(), "t.sdmp");
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    run_ok(&d, &mut session, &format!("open {}", path.display()));
    run_ok(&d, &mut session, "thread 8");
    assert_eq!(session.context().current_thread(), Some(8));

    let msg = run_err(&d, &mut session, "thread 999");
    assert!(msg.contains("no thread 999"));
    // 失敗した選択は以前の選択を壊さない
    assert_eq!(session.context().current_thread(), Some(8));
}

#[test]
fn test_opening_new_target_clears_selections() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = build_dump(dir.path(), "a.sdmp");
    let path_b = build_dump(dir.path(), "b.sdmp");
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    run_ok(&d, &mut session, &format!("open {}", path_a.display()));
    run_ok(&d, &mut session, "thread 7");
    run_ok(&d, &mut session, "runtime 0");

    run_ok(&d, &mut session, &format!("open {}", path_b.display()));
    assert_eq!(session.context().current_thread(), None);
    assert_eq!(session.context().current_runtime(), None);
}

#[test]
fn test_dumpheap_resolves_type_names() {
    let dir = tempfile::tempdir().unwrap();
    let syms = tempfile::tempdir().unwrap();
    let path = build_dump(dir.path(), "heap.sdmp");
    let mut session = session_with_symbols(syms.path());
    let d = dispatcher();

    run_ok(&d, &mut session, &format!("open {}", path.display()));
    let output = run_ok(&d, &mut session, "dumpheap");

    // 2オブジェクト + サマリ行
    assert_eq!(output.lines.len(), 3);
    assert!(output.lines[0].contains("App.Widget"));
    assert!(output.lines[1].contains("App.Widget"));
    assert!(output.lines[2].contains("2 objects"));
}

#[test]
fn test_dumpheap_without_symbols_reports_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_dump(dir.path(), "heap.sdmp");
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    run_ok(&d, &mut session, &format!("open {}", path.display()));
    let output = run_ok(&d, &mut session, "dumpheap");
    assert!(output.lines[0].contains("<unresolved>"));
}

#[test]
fn test_dumpobj_shows_type_details() {
    let dir = tempfile::tempdir().unwrap();
    let syms = tempfile::tempdir().unwrap();
    let path = build_dump(dir.path(), "obj.sdmp");
    let mut session = session_with_symbols(syms.path());
    let d = dispatcher();

    run_ok(&d, &mut session, &format!("open {}", path.display()));
    let output = run_ok(&d, &mut session, &format!("dumpobj 0x{:x}", SEG_START));
    let text = output.lines.join("\n");
    assert!(text.contains("App.Widget"));
    assert!(text.contains("32 bytes"));
}

#[test]
fn test_symbolpath_lists_and_adds() {
    let mut session = Session::new(Arc::new(SymbolService::new()));
    let d = dispatcher();

    let output = run_ok(&d, &mut session, "symbolpath");
    assert!(output.lines[0].contains("no symbol locations"));

    run_ok(&d, &mut session, "symbolpath cache /tmp/symcache");
    run_ok(&d, &mut session, "symbolpath server http://symbols.example 2");
    let output = run_ok(&d, &mut session, "symbolpath");
    assert_eq!(output.lines.len(), 2);

    let msg = run_err(&d, &mut session, "symbolpath bogus");
    assert!(msg.contains("unknown symbolpath subcommand"));
}
