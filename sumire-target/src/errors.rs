//! ターゲットモデルのエラー型

use std::path::PathBuf;
use thiserror::Error;

/// ダンプのオープンとメモリ読み取りで発生するエラー
#[derive(Debug, Error)]
pub enum TargetError {
    /// 指定されたパスにファイルが存在しない
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// バイト列が認識可能なスナップショットフォーマットではない
    #[error("invalid snapshot format: {0}")]
    InvalidDumpFormat(String),

    /// 要求された範囲の一部がダンプにマップされていない
    #[error("cannot read {len} bytes at 0x{addr:x}: address range is not mapped")]
    MemoryRead { addr: u64, len: usize },

    /// クローズ済みのターゲットに対する読み取り
    #[error("target is closed")]
    TargetClosed,
}
