//! SDMPスナップショットフォーマットの定義と解析
//!
//! ヘッダとテーブルは固定サイズのメタデータなのでオープン時に一括で解析する。
//! リージョンの中身（メモリの実体）はここでは触らない。

use crate::errors::TargetError;
use crate::module::ModuleInfo;
use crate::thread::ThreadInfo;
use crate::Result;

/// スナップショットファイルのマジックナンバー
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SDMP";

/// サポートするフォーマットバージョン
pub const SNAPSHOT_VERSION: u16 = 1;

/// ヘッダの固定サイズ（バイト）
pub const HEADER_SIZE: usize = 48;

/// ターゲットのアーキテクチャ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    /// フォーマット上のアーキテクチャIDから変換する
    pub fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            1 => Ok(Arch::X86_64),
            2 => Ok(Arch::Aarch64),
            other => Err(TargetError::InvalidDumpFormat(format!(
                "unknown architecture id {}",
                other
            ))
            .into()),
        }
    }

    /// ポインタサイズ（バイト）を取得する
    pub fn pointer_size(&self) -> usize {
        // 現在サポートする両アーキテクチャとも64ビット
        8
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::X86_64 => f.write_str("x86_64"),
            Arch::Aarch64 => f.write_str("aarch64"),
        }
    }
}

/// スナップショットヘッダ
#[derive(Debug, Clone)]
pub struct SnapshotHeader {
    pub version: u16,
    pub arch: Arch,
    /// プロセスID（記録されていないダンプもある）
    pub process_id: Option<u32>,
    pub module_count: u32,
    pub thread_count: u32,
    pub region_count: u32,
    pub module_table_off: u64,
    pub thread_table_off: u64,
    pub region_table_off: u64,
}

/// マップ済みメモリリージョン
#[derive(Debug, Clone, Copy)]
pub struct Region {
    /// 仮想アドレス
    pub vaddr: u64,
    /// サイズ（バイト）
    pub size: u64,
    /// スナップショットファイル内のオフセット
    pub file_off: u64,
}

impl Region {
    /// 指定アドレスがこのリージョンに含まれるか
    ///
    /// アドレス空間の最上部に置かれたリージョンでも溢れないよう、
    /// 加算ではなく差分で判定する。
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.vaddr && addr - self.vaddr < self.size
    }

    /// リージョン終端の仮想アドレス（排他的、アドレス空間上限で飽和）
    pub fn end(&self) -> u64 {
        self.vaddr.saturating_add(self.size)
    }
}

/// バイト列を先頭から読み進める小さなカーソル
///
/// 範囲外読み取りはすべて `InvalidDumpFormat` として報告する。
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                TargetError::InvalidDumpFormat(format!(
                    "truncated snapshot: need {} bytes at offset {}",
                    len, self.pos
                ))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            TargetError::InvalidDumpFormat("non-UTF-8 string in snapshot table".to_string()).into()
        })
    }
}

/// テーブルの要素数がファイルに収まり得るか検証する
///
/// countはダンプに書かれた未検証の値。レコードの最小サイズで見積もり、
/// ファイルサイズを超える数は確保前に弾く。
fn check_count(count: u32, min_record: u64, data_len: usize, what: &str) -> Result<()> {
    if count as u64 * min_record > data_len as u64 {
        return Err(TargetError::InvalidDumpFormat(format!(
            "{} count {} cannot fit in a {} byte file",
            what, count, data_len
        ))
        .into());
    }
    Ok(())
}

/// ヘッダを解析する
pub fn parse_header(data: &[u8]) -> Result<SnapshotHeader> {
    if data.len() < HEADER_SIZE {
        return Err(TargetError::InvalidDumpFormat(format!(
            "file too small for header: {} bytes",
            data.len()
        ))
        .into());
    }
    if &data[0..4] != SNAPSHOT_MAGIC {
        return Err(TargetError::InvalidDumpFormat("bad magic".to_string()).into());
    }

    let mut cur = Cursor::new(data, 4);
    let version = cur.read_u16()?;
    if version != SNAPSHOT_VERSION {
        return Err(TargetError::InvalidDumpFormat(format!(
            "unsupported snapshot version {}",
            version
        ))
        .into());
    }
    let arch = Arch::from_raw(cur.read_u16()?)?;
    let process_id = match cur.read_u32()? {
        0 => None,
        pid => Some(pid),
    };
    let module_count = cur.read_u32()?;
    let thread_count = cur.read_u32()?;
    let region_count = cur.read_u32()?;
    let module_table_off = cur.read_u64()?;
    let thread_table_off = cur.read_u64()?;
    let region_table_off = cur.read_u64()?;

    Ok(SnapshotHeader {
        version,
        arch,
        process_id,
        module_count,
        thread_count,
        region_count,
        module_table_off,
        thread_table_off,
        region_table_off,
    })
}

/// モジュールテーブルを解析する
///
/// ダンプに記録されたロード順のまま返す。
pub fn parse_modules(data: &[u8], header: &SnapshotHeader) -> Result<Vec<ModuleInfo>> {
    // 固定部: base + size + build_id + version_len + path_len
    check_count(header.module_count, 44, data.len(), "module")?;
    let mut cur = Cursor::new(data, header.module_table_off as usize);
    let mut modules = Vec::with_capacity(header.module_count as usize);

    for _ in 0..header.module_count {
        let base = cur.read_u64()?;
        let size = cur.read_u64()?;
        let mut build_id = [0u8; 16];
        build_id.copy_from_slice(cur.take(16)?);
        let version_len = cur.read_u16()? as usize;
        let path_len = cur.read_u16()? as usize;
        let version = cur.read_string(version_len)?;
        let path = cur.read_string(path_len)?;

        modules.push(ModuleInfo {
            base,
            size,
            build_id,
            version,
            path,
        });
    }

    Ok(modules)
}

/// スレッドテーブルを解析する
pub fn parse_threads(data: &[u8], header: &SnapshotHeader) -> Result<Vec<ThreadInfo>> {
    check_count(header.thread_count, 28, data.len(), "thread")?;
    let mut cur = Cursor::new(data, header.thread_table_off as usize);
    let mut threads = Vec::with_capacity(header.thread_count as usize);

    for _ in 0..header.thread_count {
        let tid = cur.read_u32()?;
        let pc = cur.read_u64()?;
        let sp = cur.read_u64()?;
        let fp = cur.read_u64()?;
        threads.push(ThreadInfo { tid, pc, sp, fp });
    }

    Ok(threads)
}

/// リージョンテーブルを解析する
///
/// 各リージョンの実体がファイル内に収まっていることもここで検証する。
pub fn parse_regions(data: &[u8], header: &SnapshotHeader) -> Result<Vec<Region>> {
    check_count(header.region_count, 24, data.len(), "region")?;
    let mut cur = Cursor::new(data, header.region_table_off as usize);
    let mut regions = Vec::with_capacity(header.region_count as usize);

    for _ in 0..header.region_count {
        let vaddr = cur.read_u64()?;
        let size = cur.read_u64()?;
        let file_off = cur.read_u64()?;

        let end = file_off.checked_add(size).ok_or_else(|| {
            TargetError::InvalidDumpFormat("region offset overflow".to_string())
        })?;
        if end > data.len() as u64 {
            return Err(TargetError::InvalidDumpFormat(format!(
                "region at 0x{:x} extends past end of file",
                vaddr
            ))
            .into());
        }
        regions.push(Region {
            vaddr,
            size,
            file_off,
        });
    }

    // アドレス検索用にソートしておく（テーブル上の順序は使わない）
    regions.sort_by_key(|r| r.vaddr);

    Ok(regions)
}
