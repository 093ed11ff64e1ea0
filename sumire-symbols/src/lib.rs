//! Sumire シンボル解決
//!
//! このクレートは、モジュールのデバッグシンボルファイルを解決する機能を提供します。
//! キャッシュ/ディレクトリ/シンボルサーバの探索チェーン、リトライポリシー、
//! 解決結果のメモ化、シンボルファイル（型トークン・メソッド範囲）の解析を行います。

pub mod errors;
pub mod key;
pub mod resolver;
pub mod store;
pub mod transport;

pub use errors::SymbolError;
pub use key::SymbolKey;
pub use resolver::{Resolution, SymbolService};
pub use store::{MethodRange, SymbolFile};
pub use transport::{DirTransport, FetchOutcome, SymbolTransport};

/// シンボル解決の結果型
pub type Result<T> = anyhow::Result<T>;
