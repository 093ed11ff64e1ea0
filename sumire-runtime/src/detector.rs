//! ランタイムモジュールの検出ロジック

use crate::layout::LayoutKind;
use crate::runtime::Runtime;
use crate::Result;
use regex::Regex;
use sumire_target::{ModuleInfo, Target};
use tracing::{debug, warn};

/// ランタイム検出器
///
/// モジュール名のパターンでランタイムモジュールを見つける。
/// 1つのプロセスが複数のランタイムインスタンスをホストすることもある。
pub struct RuntimeDetector {
    pattern: Regex,
}

impl RuntimeDetector {
    /// 既定のMRTパターンで検出器を作成する
    pub fn new() -> Result<Self> {
        // libmrt.so / mrt.dll / libmrtcore.dylib など
        let pattern = Regex::new(r"^(lib)?mrt(core)?\.(so|dll|dylib)$")?;
        Ok(Self { pattern })
    }

    /// モジュールがランタイムモジュールか判定する
    pub fn is_runtime_module(&self, module: &ModuleInfo) -> bool {
        self.pattern.is_match(module.name())
    }

    /// ターゲット内のランタイムをすべて検出する
    ///
    /// 名前は一致するがバージョンからレイアウトを選べないモジュールは
    /// 警告を出して読み飛ばす。0個・1個・複数のいずれもあり得る。
    pub fn detect(&self, target: &Target) -> Vec<Runtime> {
        let mut runtimes = Vec::new();

        for module in target.modules() {
            if !self.is_runtime_module(module) {
                continue;
            }
            match LayoutKind::from_version(&module.version) {
                Some(layout) => {
                    debug!(
                        "detected runtime {} v{} at 0x{:x} ({:?})",
                        module.name(),
                        module.version,
                        module.base,
                        layout
                    );
                    runtimes.push(Runtime::new(module.clone(), layout));
                }
                None => {
                    warn!(
                        "module {} matches runtime pattern but version '{}' is unsupported",
                        module.name(),
                        module.version
                    );
                }
            }
        }

        runtimes
    }
}
