//! シンボルサーバとの通信境界
//!
//! ネットワークの詳細はこのトレイトの実装側の責務。リゾルバは
//! 「取得できた / 確定的に無い / 一時的に失敗した」の3値だけを扱う。

use crate::key::SymbolKey;
use std::path::Path;

/// 1回のフェッチの結果
#[derive(Debug)]
pub enum FetchOutcome {
    /// シンボルファイルのバイト列を取得できた
    Fetched(Vec<u8>),
    /// サーバは応答したがシンボルは存在しない（リトライしない）
    NotFound,
    /// タイムアウトやサーバエラーなどの一時的な失敗（リトライ対象）
    Transient(String),
}

/// シンボルサーバトランスポート
pub trait SymbolTransport: Send + Sync {
    /// 指定サーバから指定モジュールのシンボルを取得する
    fn fetch(&self, url: &str, key: &SymbolKey) -> FetchOutcome;
}

/// URLをファイルシステム上のプレフィクスとして扱うトランスポート
///
/// ファイル共有型のシンボルサーバに相当する。HTTPなどのトランスポートは
/// このトレイトの別実装として差し込む。
pub struct DirTransport;

impl SymbolTransport for DirTransport {
    fn fetch(&self, url: &str, key: &SymbolKey) -> FetchOutcome {
        let path = Path::new(url).join(key.file_name());
        match std::fs::read(&path) {
            Ok(bytes) => FetchOutcome::Fetched(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FetchOutcome::NotFound,
            Err(e) => FetchOutcome::Transient(format!("{}: {}", path.display(), e)),
        }
    }
}
