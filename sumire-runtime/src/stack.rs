//! スタックトレースの再構築
//!
//! アンワインド規約はアーキテクチャごとに差し替え可能な戦略とする。
//! 現在サポートする両アーキテクチャはフレームポインタチェーン規約
//! （`[fp]` = 呼び出し元fp、`[fp+8]` = リターンアドレス）を使う。

use sumire_target::{AddressSpace, AddressSpaceExt, Arch, ThreadInfo};

/// フレーム数の上限（暴走チェーンの打ち切り）
const MAX_FRAMES: usize = 256;

/// スタックフレーム
///
/// シンボルが解決できなかったフレームはアドレスのみを持つ。
#[derive(Debug, Clone)]
pub struct Frame {
    /// 命令アドレス
    pub pc: u64,
    /// アドレスを含むモジュール名（見つかれば）
    pub module: Option<String>,
    /// メソッド名（モジュールのシンボルが解決できた場合のみ）
    pub method: Option<String>,
}

/// アンワインド戦略
pub trait Unwinder {
    /// スレッドのフレームの命令アドレス列を返す（呼び出し側が先頭）
    ///
    /// 1フレームの失敗でウォーク全体を失敗させない。読めなくなった
    /// 時点で打ち切り、そこまでの部分結果を返す。
    fn walk(&self, space: &dyn AddressSpace, thread: &ThreadInfo) -> Vec<u64>;
}

/// フレームポインタチェーンによるアンワインド
pub struct FramePointerUnwinder;

impl Unwinder for FramePointerUnwinder {
    fn walk(&self, space: &dyn AddressSpace, thread: &ThreadInfo) -> Vec<u64> {
        let mut pcs = vec![thread.pc];
        let mut fp = thread.fp;

        while pcs.len() < MAX_FRAMES {
            if fp == 0 {
                break;
            }
            // [fp] = 呼び出し元fp、[fp+8] = リターンアドレス
            let Some(ret_slot) = fp.checked_add(8) else {
                // fpがアドレス空間の端。これ以上のフレームは無い。
                break;
            };
            let (next_fp, ret) = match (space.read_u64(fp), space.read_u64(ret_slot)) {
                (Ok(next_fp), Ok(ret)) => (next_fp, ret),
                // 未マップに達したら部分結果で打ち切る
                _ => break,
            };
            if ret == 0 {
                break;
            }
            pcs.push(ret);

            // fpが増加しないチェーンはループの兆候
            if next_fp <= fp {
                break;
            }
            fp = next_fp;
        }

        pcs
    }
}

/// アーキテクチャに応じたアンワインド戦略を選択する
pub fn unwinder_for(arch: Arch) -> Box<dyn Unwinder> {
    match arch {
        // 両者ともフレームポインタチェーン。メタデータ駆動の規約が
        // 必要になればここに別実装を差し込む。
        Arch::X86_64 | Arch::Aarch64 => Box::new(FramePointerUnwinder),
    }
}
