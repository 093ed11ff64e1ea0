//! コマンド処理のエラー型

use thiserror::Error;

/// コマンドの解決と実行で発生するエラー
#[derive(Debug, Error)]
pub enum CommandError {
    /// 名前にもエイリアスにも一致しない
    #[error("unknown command: {0}")]
    Unknown(String),

    /// 前方一致が複数のコマンドに当たり、完全一致も無い
    #[error("ambiguous command '{input}': matches {candidates}")]
    Ambiguous { input: String, candidates: String },

    /// コマンドが要求するサービスがアクティブなスコープチェーンに無い
    #[error("missing required service: {0}")]
    MissingService(String),

    /// スコープチェーンのどこにも該当する能力の提供者が無い
    #[error("no service registered for {0}")]
    ServiceNotFound(String),
}
