//! 検出されたランタイムインスタンス

use crate::layout::LayoutKind;
use sumire_target::ModuleInfo;

/// ターゲット内で検出されたマネージドランタイム
///
/// 以後の構造ウォークはすべてこのハンドルを起点に行う。
#[derive(Debug, Clone)]
pub struct Runtime {
    /// 検出元のランタイムモジュール
    module: ModuleInfo,
    /// レイアウト規則（モジュールのバージョンから選択）
    layout: LayoutKind,
}

impl Runtime {
    pub(crate) fn new(module: ModuleInfo, layout: LayoutKind) -> Self {
        Self { module, layout }
    }

    /// 検出元モジュールを取得する
    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    /// ランタイムのバージョン文字列を取得する
    pub fn version(&self) -> &str {
        &self.module.version
    }

    /// レイアウト規則を取得する
    pub fn layout(&self) -> LayoutKind {
        self.layout
    }

    /// ランタイムモジュールのベースアドレス（ハンドルの同一性キー）
    pub fn base(&self) -> u64 {
        self.module.base
    }
}
