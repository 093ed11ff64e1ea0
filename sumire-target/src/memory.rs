//! アドレス空間の抽象
//!
//! ダンプのメモリは読み取り専用。書き込み操作は存在しない。

use crate::Result;

/// メモリから読み取り可能な型
pub trait MemoryReadable: Sized {
    /// バイト配列から値を構築
    fn from_le_bytes(bytes: &[u8]) -> Result<Self>;

    /// 型のサイズ（バイト数）
    fn size() -> usize;
}

impl MemoryReadable for u64 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Failed to convert {} bytes to u64 array (expected 8 bytes)",
                bytes.len()
            )
        })?;
        Ok(u64::from_le_bytes(array))
    }

    fn size() -> usize {
        8
    }
}

impl MemoryReadable for u32 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 4] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Failed to convert {} bytes to u32 array (expected 4 bytes)",
                bytes.len()
            )
        })?;
        Ok(u32::from_le_bytes(array))
    }

    fn size() -> usize {
        4
    }
}

impl MemoryReadable for u16 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 2] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Failed to convert {} bytes to u16 array (expected 2 bytes)",
                bytes.len()
            )
        })?;
        Ok(u16::from_le_bytes(array))
    }

    fn size() -> usize {
        2
    }
}

impl MemoryReadable for u8 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(anyhow::anyhow!("Cannot read u8 from empty bytes"));
        }
        Ok(bytes[0])
    }

    fn size() -> usize {
        1
    }
}

/// ダンプメモリへの読み取り専用ビュー
///
/// 要求範囲の全バイトが満たせる場合のみ成功する。
/// 部分的に埋まったバッファを黙って返すことはない。
pub trait AddressSpace {
    /// 指定範囲を読み取る
    ///
    /// 範囲内に未マップのバイトが1つでもあれば `MemoryRead` エラー。
    fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>>;

    /// マップ済みリージョンの一覧を (開始アドレス, 長さ) で返す
    fn ranges(&self) -> Vec<(u64, u64)>;

    /// 指定アドレスがマップされているか
    fn is_mapped(&self, addr: u64) -> bool {
        self.ranges()
            .iter()
            .any(|&(start, len)| addr >= start && addr - start < len)
    }
}

/// 型付き読み取りの拡張
pub trait AddressSpaceExt: AddressSpace {
    /// 型付き値を読み取る（ジェネリック版）
    ///
    /// # Examples
    /// ```ignore
    /// let value: u64 = space.read_typed(addr)?;
    /// let value: u32 = space.read_typed(addr)?;
    /// ```
    fn read_typed<T: MemoryReadable>(&self, addr: u64) -> Result<T> {
        let bytes = self.read(addr, T::size())?;
        T::from_le_bytes(&bytes)
    }

    /// u64値を読み取る（リトルエンディアン）
    fn read_u64(&self, addr: u64) -> Result<u64> {
        self.read_typed(addr)
    }

    /// u32値を読み取る（リトルエンディアン）
    fn read_u32(&self, addr: u64) -> Result<u32> {
        self.read_typed(addr)
    }

    /// u16値を読み取る（リトルエンディアン）
    fn read_u16(&self, addr: u64) -> Result<u16> {
        self.read_typed(addr)
    }

    /// u8値を読み取る
    fn read_u8(&self, addr: u64) -> Result<u8> {
        self.read_typed(addr)
    }
}

impl<T: AddressSpace + ?Sized> AddressSpaceExt for T {}
