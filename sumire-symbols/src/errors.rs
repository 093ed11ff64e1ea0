//! シンボル解決のエラー型

use crate::key::SymbolKey;
use thiserror::Error;

/// シンボル解決で発生するエラー
#[derive(Debug, Error)]
pub enum SymbolError {
    /// 設定済みの全探索先でシンボルが見つからなかった
    #[error("symbols not found for {0}")]
    NotFound(SymbolKey),

    /// シンボルファイルの内容が解析できない
    #[error("invalid symbol file: {0}")]
    InvalidSymbolFile(String),
}
