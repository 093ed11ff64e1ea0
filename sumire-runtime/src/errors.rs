//! ランタイム解析のエラー型

use thiserror::Error;

/// ランタイム構造の解釈で発生するエラー
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// ヒープウォークの発散（破損または誤解釈されたレイアウト）
    ///
    /// 継続すると無限・不正なスキャンになるため、クエリ全体に対して致命的。
    #[error("corrupt heap: {0}")]
    CorruptHeap(String),

    /// 型の定義モジュールのシンボルが取得できず、型名を解決できない
    #[error("cannot resolve type handle 0x{handle:x}: {reason}")]
    UnresolvedType { handle: u64, reason: String },
}
