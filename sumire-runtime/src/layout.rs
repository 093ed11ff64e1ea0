//! バージョン別オブジェクトレイアウト
//!
//! オブジェクトヘッダの形はランタイムのメジャーバージョンで決まる。
//! - V1: `u64 type_handle | u64 size`（sizeはヘッダ込みバイト数）
//! - V2: `u32 size_words | u32 flags | u64 type_handle`（size = size_words * 8）
//!
//! どちらも最小サイズは16バイト、8バイトアライン。`type_handle == 0` は
//! フリー領域を表す。

use sumire_target::{AddressSpace, AddressSpaceExt};
use crate::Result;

/// オブジェクトヘッダのサイズ（両レイアウト共通、バイト）
pub const OBJECT_HEADER_SIZE: u64 = 16;

/// オブジェクトの最小サイズ（バイト）
pub const OBJECT_MIN_SIZE: u64 = 16;

/// レイアウト種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    V1,
    V2,
}

impl LayoutKind {
    /// ランタイムのバージョン文字列からレイアウトを選択する
    ///
    /// メジャーバージョンだけを見る。未知のメジャーはNone。
    pub fn from_version(version: &str) -> Option<Self> {
        match version.split('.').next()? {
            "1" => Some(LayoutKind::V1),
            "2" => Some(LayoutKind::V2),
            _ => None,
        }
    }

    /// 指定アドレスのオブジェクトヘッダを読む
    ///
    /// アドレスはダンプ由来またはユーザ入力。ヘッダがアドレス空間に
    /// 収まらない位置は読み取りエラーとして扱う。
    pub fn read_header(&self, space: &dyn AddressSpace, addr: u64) -> Result<ObjectHeader> {
        let second = addr.checked_add(8).ok_or_else(|| {
            anyhow::anyhow!("object header at 0x{:x} overflows the address space", addr)
        })?;
        match self {
            LayoutKind::V1 => {
                let type_handle = space.read_u64(addr)?;
                let size = space.read_u64(second)?;
                Ok(ObjectHeader { type_handle, size })
            }
            LayoutKind::V2 => {
                let size_words = space.read_u32(addr)?;
                let _flags = space.read_u32(addr + 4)?;
                let type_handle = space.read_u64(second)?;
                Ok(ObjectHeader {
                    type_handle,
                    size: size_words as u64 * 8,
                })
            }
        }
    }
}

/// 解釈済みオブジェクトヘッダ
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    /// 型ハンドル（型記述子のアドレス）。0はフリー領域。
    pub type_handle: u64,
    /// ヘッダ込みのオブジェクトサイズ（バイト）
    pub size: u64,
}

impl ObjectHeader {
    /// フリー領域（ガベージコレクタの隙間）か
    pub fn is_free(&self) -> bool {
        self.type_handle == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_version() {
        assert_eq!(LayoutKind::from_version("1.0.0"), Some(LayoutKind::V1));
        assert_eq!(LayoutKind::from_version("1.9"), Some(LayoutKind::V1));
        assert_eq!(LayoutKind::from_version("2.3.1"), Some(LayoutKind::V2));
        assert_eq!(LayoutKind::from_version("7.0"), None);
        assert_eq!(LayoutKind::from_version(""), None);
    }
}
