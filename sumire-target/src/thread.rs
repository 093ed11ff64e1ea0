//! スレッド情報

/// スレッドID
pub type ThreadId = u32;

/// ダンプに記録されたスレッド
///
/// スナップショット取得時点のレジスタ値を保持する。
#[derive(Debug, Clone, Copy)]
pub struct ThreadInfo {
    pub tid: ThreadId,
    /// プログラムカウンタ
    pub pc: u64,
    /// スタックポインタ
    pub sp: u64,
    /// フレームポインタ
    pub fp: u64,
}
