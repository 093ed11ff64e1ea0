//! スナップショットファイルの読み込みとアドレス空間の実装

use crate::errors::TargetError;
use crate::format::{self, Region, SnapshotHeader};
use crate::memory::AddressSpace;
use crate::module::ModuleInfo;
use crate::thread::ThreadInfo;
use crate::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// オープン済みのスナップショットファイル
///
/// ファイル全体をメモリマップし、テーブル類だけを先に解析する。
/// ダンプは不変なので、共有参照だけでどこからでも安全に読める。
#[derive(Debug)]
pub struct SnapshotFile {
    mmap: Mmap,
    header: SnapshotHeader,
    modules: Vec<ModuleInfo>,
    threads: Vec<ThreadInfo>,
    /// 仮想アドレスでソート済み
    regions: Vec<Region>,
}

impl SnapshotFile {
    /// スナップショットファイルを開く
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow::Error::from(TargetError::FileNotFound(path.to_path_buf()))
            } else {
                anyhow::anyhow!("Failed to open {:?}: {}", path, e)
            }
        })?;

        // 読み取り専用マップ。ダンプファイルは解析中に変更されない前提。
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| anyhow::anyhow!("Failed to mmap {:?}: {}", path, e))?;

        let header = format::parse_header(&mmap)?;
        let modules = format::parse_modules(&mmap, &header)?;
        let threads = format::parse_threads(&mmap, &header)?;
        let regions = format::parse_regions(&mmap, &header)?;

        debug!(
            "opened snapshot: {} modules, {} threads, {} regions",
            modules.len(),
            threads.len(),
            regions.len()
        );

        Ok(Self {
            mmap,
            header,
            modules,
            threads,
            regions,
        })
    }

    /// ヘッダを取得する
    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    /// モジュールテーブルを取得する（ロード順）
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// スレッドテーブルを取得する（生成順）
    pub fn threads(&self) -> &[ThreadInfo] {
        &self.threads
    }

    /// 指定アドレスを含むリージョンを探す
    fn region_for(&self, addr: u64) -> Option<&Region> {
        let idx = match self.regions.binary_search_by_key(&addr, |r| r.vaddr) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let region = &self.regions[idx];
        region.contains(addr).then_some(region)
    }
}

impl AddressSpace for SnapshotFile {
    /// 指定範囲を読み取る
    ///
    /// 仮想アドレス空間上で連続していれば、隣接する複数リージョンに
    /// またがる読み取りも許す。1バイトでも未マップなら全体が失敗する。
    fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(len);
        let mut cursor = addr;
        let mut remaining = len as u64;

        while remaining > 0 {
            let region = self
                .region_for(cursor)
                .ok_or(TargetError::MemoryRead { addr, len })?;

            let offset_in_region = cursor - region.vaddr;
            let available = region.size - offset_in_region;
            let take = remaining.min(available);

            let start = (region.file_off + offset_in_region) as usize;
            out.extend_from_slice(&self.mmap[start..start + take as usize]);

            // アドレス空間最上部で終わるリージョンではカーソルが一周する。
            // remainingが0になった後は参照されないのでwrappingで良い。
            cursor = cursor.wrapping_add(take);
            remaining -= take;
        }

        Ok(out)
    }

    fn ranges(&self) -> Vec<(u64, u64)> {
        self.regions.iter().map(|r| (r.vaddr, r.size)).collect()
    }
}
