//! シンボル解決サービス
//!
//! 探索チェーン（ローカルキャッシュ/ディレクトリ → サーバ）を順に当たり、
//! 結果をサービスの寿命いっぱいメモ化する。サーバヒットはキャッシュに
//! 書き戻す（ライトスルー、削除なし）。

use crate::errors::SymbolError;
use crate::key::SymbolKey;
use crate::store::SymbolFile;
use crate::transport::{DirTransport, FetchOutcome, SymbolTransport};
use crate::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 探索先
#[derive(Clone)]
enum SearchLocation {
    /// シンボルサーバ（リトライ回数付き）
    Server { url: String, retry_count: u32 },
    /// ローカルキャッシュディレクトリ（書き戻し先）
    Cache(PathBuf),
    /// アドホックなディレクトリ
    Directory(PathBuf),
}

/// 解決結果
///
/// 一度確定した結果は、その後の探索先追加でも再解決しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    NotFound,
}

/// シンボル解決サービス
///
/// セッション全体で共有されるため、探索先の追加も共有参照で行える。
pub struct SymbolService {
    locations: Mutex<Vec<SearchLocation>>,
    transport: Box<dyn SymbolTransport>,
    /// キー -> 確定済み解決結果
    memo: Mutex<HashMap<SymbolKey, Resolution>>,
    /// キー -> 解析済みシンボルファイル
    loaded: Mutex<HashMap<SymbolKey, Arc<SymbolFile>>>,
    /// キャッシュ未設定時にサーバヒットを保存する場所
    scratch_dir: PathBuf,
}

impl SymbolService {
    /// デフォルトのトランスポートでサービスを作成する
    pub fn new() -> Self {
        Self::with_transport(Box::new(DirTransport))
    }

    /// トランスポートを指定してサービスを作成する
    pub fn with_transport(transport: Box<dyn SymbolTransport>) -> Self {
        Self {
            locations: Mutex::new(Vec::new()),
            transport,
            memo: Mutex::new(HashMap::new()),
            loaded: Mutex::new(HashMap::new()),
            scratch_dir: std::env::temp_dir().join("sumire-symbols"),
        }
    }

    /// シンボルサーバを探索チェーンに追加する
    pub fn add_server(&self, url: &str, retry_count: u32) {
        self.locations.lock().unwrap().push(SearchLocation::Server {
            url: url.to_string(),
            retry_count,
        });
    }

    /// キャッシュディレクトリを探索チェーンに追加する
    pub fn add_cache_path<P: Into<PathBuf>>(&self, dir: P) {
        self.locations
            .lock()
            .unwrap()
            .push(SearchLocation::Cache(dir.into()));
    }

    /// ディレクトリを探索チェーンに追加する
    pub fn add_directory_path<P: Into<PathBuf>>(&self, dir: P) {
        self.locations
            .lock()
            .unwrap()
            .push(SearchLocation::Directory(dir.into()));
    }

    /// 探索チェーンの一覧を表示用文字列で取得する
    pub fn describe_locations(&self) -> Vec<String> {
        self.locations
            .lock()
            .unwrap()
            .iter()
            .map(|loc| match loc {
                SearchLocation::Server { url, retry_count } => {
                    format!("server {} (retries: {})", url, retry_count)
                }
                SearchLocation::Cache(dir) => format!("cache {}", dir.display()),
                SearchLocation::Directory(dir) => format!("dir {}", dir.display()),
            })
            .collect()
    }

    /// モジュールのシンボルファイルを解決する
    ///
    /// 全探索先がミスした場合は `SymbolError::NotFound`。結果は成功・失敗
    /// ともにメモ化され、同一キーの2回目以降はトランスポートに触れない。
    pub fn resolve(&self, key: &SymbolKey) -> Result<PathBuf> {
        if let Some(outcome) = self.memo.lock().unwrap().get(key) {
            debug!("symbol resolution memo hit for {}: {:?}", key, outcome);
            return match outcome {
                Resolution::Found(path) => Ok(path.clone()),
                Resolution::NotFound => Err(SymbolError::NotFound(key.clone()).into()),
            };
        }

        // ロックの外で探索してから一度だけ記録する。
        // エントリは「無い」か「完成済み」のどちらかしか観測されない。
        let outcome = self.probe(key);
        self.memo
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| outcome.clone());

        match outcome {
            Resolution::Found(path) => Ok(path),
            Resolution::NotFound => Err(SymbolError::NotFound(key.clone()).into()),
        }
    }

    /// シンボルファイルを解決して解析済みの形で取得する
    pub fn load(&self, key: &SymbolKey) -> Result<Arc<SymbolFile>> {
        if let Some(file) = self.loaded.lock().unwrap().get(key) {
            return Ok(Arc::clone(file));
        }

        let path = self.resolve(key)?;
        let file = Arc::new(SymbolFile::load(&path)?);
        self.loaded
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| Arc::clone(&file));
        Ok(file)
    }

    /// 探索チェーンを1周する
    ///
    /// ローカル（キャッシュ/ディレクトリ）を追加順に、その後サーバを追加順に。
    fn probe(&self, key: &SymbolKey) -> Resolution {
        let locations = self.locations.lock().unwrap().clone();
        let file_name = key.file_name();

        for loc in &locations {
            let dir = match loc {
                SearchLocation::Cache(dir) | SearchLocation::Directory(dir) => dir,
                SearchLocation::Server { .. } => continue,
            };
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                debug!("symbols for {} found locally: {}", key, candidate.display());
                return Resolution::Found(candidate);
            }
        }

        for loc in &locations {
            let (url, retry_count) = match loc {
                SearchLocation::Server { url, retry_count } => (url, *retry_count),
                _ => continue,
            };
            if let Some(bytes) = self.probe_server(url, retry_count, key) {
                match self.store_fetched(&locations, key, &bytes) {
                    Ok(path) => return Resolution::Found(path),
                    Err(e) => {
                        warn!("failed to store symbols for {}: {}", key, e);
                        // 保存できなければこのヒットは使えない。次のサーバへ。
                    }
                }
            }
        }

        debug!("symbols for {} not found in any location", key);
        Resolution::NotFound
    }

    /// 1つのサーバをリトライ付きで当たる
    ///
    /// Transientのみリトライ対象。NotFoundは確定なので即座に諦める。
    fn probe_server(&self, url: &str, retry_count: u32, key: &SymbolKey) -> Option<Vec<u8>> {
        let attempts = retry_count.max(1);
        for attempt in 1..=attempts {
            match self.transport.fetch(url, key) {
                FetchOutcome::Fetched(bytes) => {
                    debug!("fetched symbols for {} from {}", key, url);
                    return Some(bytes);
                }
                FetchOutcome::NotFound => {
                    debug!("server {} has no symbols for {}", url, key);
                    return None;
                }
                FetchOutcome::Transient(msg) => {
                    warn!(
                        "transient failure fetching {} from {} (attempt {}/{}): {}",
                        key, url, attempt, attempts, msg
                    );
                }
            }
        }
        None
    }

    /// 取得したバイト列をローカルに書き戻す
    ///
    /// 最初に設定されたキャッシュパスへ。キャッシュ未設定ならスクラッチへ。
    fn store_fetched(
        &self,
        locations: &[SearchLocation],
        key: &SymbolKey,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let dir = locations
            .iter()
            .find_map(|loc| match loc {
                SearchLocation::Cache(dir) => Some(dir.clone()),
                _ => None,
            })
            .unwrap_or_else(|| self.scratch_dir.clone());

        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("Failed to create cache dir {:?}: {}", dir, e))?;
        let path = dir.join(key.file_name());
        std::fs::write(&path, bytes)
            .map_err(|e| anyhow::anyhow!("Failed to write {:?}: {}", path, e))?;
        Ok(path)
    }
}

impl Default for SymbolService {
    fn default() -> Self {
        Self::new()
    }
}
