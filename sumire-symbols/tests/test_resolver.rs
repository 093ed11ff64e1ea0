//! 探索チェーン・リトライ・メモ化のテスト

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use sumire_symbols::{
    FetchOutcome, SymbolError, SymbolKey, SymbolService, SymbolTransport,
};

/// 呼び出し回数を数えるモックトランスポート
struct CountingTransport {
    calls: Arc<AtomicU32>,
    outcome: fn() -> FetchOutcome,
}

impl SymbolTransport for CountingTransport {
    fn fetch(&self, _url: &str, _key: &SymbolKey) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

fn service_with(outcome: fn() -> FetchOutcome) -> (SymbolService, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let transport = CountingTransport {
        calls: Arc::clone(&calls),
        outcome,
    };
    (SymbolService::with_transport(Box::new(transport)), calls)
}

fn key() -> SymbolKey {
    SymbolKey::new("libmrt", &[0x5a; 16])
}

#[test]
fn test_retry_bound_is_exact() {
    let (service, calls) = service_with(|| FetchOutcome::Transient("timeout".to_string()));
    service.add_server("https://symbols.example.com", 3);

    let err = service.resolve(&key()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SymbolError>(),
        Some(SymbolError::NotFound(_))
    ));
    // 常に一時エラーを返すサーバにはちょうど3回
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_not_found_is_not_retried() {
    let (service, calls) = service_with(|| FetchOutcome::NotFound);
    service.add_server("https://symbols.example.com", 5);

    assert!(service.resolve(&key()).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_outcome_is_memoized() {
    let (service, calls) = service_with(|| FetchOutcome::Transient("5xx".to_string()));
    service.add_server("https://symbols.example.com", 2);

    assert!(service.resolve(&key()).is_err());
    let after_first = calls.load(Ordering::SeqCst);
    assert_eq!(after_first, 2);

    // 2回目はトランスポートに触れない
    assert!(service.resolve(&key()).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
}

#[test]
fn test_memoized_even_after_adding_locations() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(key().file_name()), "T 1 A\n").unwrap();

    let (service, _) = service_with(|| FetchOutcome::NotFound);
    service.add_server("https://symbols.example.com", 1);

    // NotFoundが確定する
    assert!(service.resolve(&key()).is_err());

    // 後からヒットするディレクトリを足しても再解決しない
    service.add_directory_path(dir.path());
    assert!(service.resolve(&key()).is_err());
}

#[test]
fn test_local_directory_hit_skips_servers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(key().file_name()), "T 1 A\n").unwrap();

    let (service, calls) = service_with(|| FetchOutcome::NotFound);
    // サーバを先に追加しても、ローカルが先に当たる
    service.add_server("https://symbols.example.com", 3);
    service.add_directory_path(dir.path());

    let path = service.resolve(&key()).unwrap();
    assert!(path.ends_with(key().file_name()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_server_hit_writes_through_to_cache() {
    let cache = tempfile::tempdir().unwrap();

    let (service, calls) =
        service_with(|| FetchOutcome::Fetched(b"T 2a App.Request\n".to_vec()));
    service.add_cache_path(cache.path());
    service.add_server("https://symbols.example.com", 3);

    let path = service.resolve(&key()).unwrap();
    assert_eq!(path, cache.path().join(key().file_name()));
    assert!(path.is_file());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 解析済みの形でも取得できる
    let file = service.load(&key()).unwrap();
    assert_eq!(file.type_name(0x2a), Some("App.Request"));

    // 2回目の解決はメモ化ヒット
    service.resolve(&key()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_first_matching_location_wins() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    std::fs::write(dir_a.path().join(key().file_name()), "T 1 FromA\n").unwrap();
    std::fs::write(dir_b.path().join(key().file_name()), "T 1 FromB\n").unwrap();

    let service = SymbolService::new();
    service.add_directory_path(dir_a.path());
    service.add_directory_path(dir_b.path());

    let file = service.load(&key()).unwrap();
    assert_eq!(file.type_name(1), Some("FromA"));
}
