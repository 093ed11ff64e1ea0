//! 合成スナップショットの構築
//!
//! テストやフォーマット検証のために、有効なSDMPバイト列をメモリ上で組み立てる。
//! ワークスペース内の各クレートのテストがフィクスチャ生成に使用する。

use crate::format::{Arch, HEADER_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

struct ModuleRecord {
    base: u64,
    size: u64,
    build_id: [u8; 16],
    version: String,
    path: String,
}

struct ThreadRecord {
    tid: u32,
    pc: u64,
    sp: u64,
    fp: u64,
}

/// スナップショットビルダー
pub struct SnapshotBuilder {
    arch: Arch,
    process_id: u32,
    modules: Vec<ModuleRecord>,
    threads: Vec<ThreadRecord>,
    regions: Vec<(u64, Vec<u8>)>,
}

impl SnapshotBuilder {
    /// 指定アーキテクチャのビルダーを作成する
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            process_id: 0,
            modules: Vec::new(),
            threads: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// プロセスIDを設定する（0は「記録なし」）
    pub fn process_id(mut self, pid: u32) -> Self {
        self.process_id = pid;
        self
    }

    /// モジュールを追加する（追加順 = ロード順）
    pub fn module(
        mut self,
        base: u64,
        size: u64,
        build_id: [u8; 16],
        version: &str,
        path: &str,
    ) -> Self {
        self.modules.push(ModuleRecord {
            base,
            size,
            build_id,
            version: version.to_string(),
            path: path.to_string(),
        });
        self
    }

    /// スレッドを追加する（追加順 = 生成順）
    pub fn thread(mut self, tid: u32, pc: u64, sp: u64, fp: u64) -> Self {
        self.threads.push(ThreadRecord { tid, pc, sp, fp });
        self
    }

    /// メモリリージョンを追加する
    pub fn region(mut self, vaddr: u64, bytes: Vec<u8>) -> Self {
        self.regions.push((vaddr, bytes));
        self
    }

    /// SDMPバイト列を組み立てる
    pub fn build(self) -> Vec<u8> {
        let module_table: Vec<u8> = self.modules.iter().flat_map(encode_module).collect();
        let thread_table: Vec<u8> = self.threads.iter().flat_map(encode_thread).collect();

        let module_table_off = HEADER_SIZE as u64;
        let thread_table_off = module_table_off + module_table.len() as u64;
        let region_table_off = thread_table_off + thread_table.len() as u64;
        let mut payload_off = region_table_off + self.regions.len() as u64 * 24;

        let mut region_table = Vec::new();
        let mut payloads = Vec::new();
        for (vaddr, bytes) in &self.regions {
            region_table.extend_from_slice(&vaddr.to_le_bytes());
            region_table.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            region_table.extend_from_slice(&payload_off.to_le_bytes());
            payload_off += bytes.len() as u64;
            payloads.extend_from_slice(bytes);
        }

        let arch_raw: u16 = match self.arch {
            Arch::X86_64 => 1,
            Arch::Aarch64 => 2,
        };

        let mut out = Vec::with_capacity(payload_off as usize);
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&arch_raw.to_le_bytes());
        out.extend_from_slice(&self.process_id.to_le_bytes());
        out.extend_from_slice(&(self.modules.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.threads.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.regions.len() as u32).to_le_bytes());
        out.extend_from_slice(&module_table_off.to_le_bytes());
        out.extend_from_slice(&thread_table_off.to_le_bytes());
        out.extend_from_slice(&region_table_off.to_le_bytes());
        debug_assert_eq!(out.len(), HEADER_SIZE);

        out.extend_from_slice(&module_table);
        out.extend_from_slice(&thread_table);
        out.extend_from_slice(&region_table);
        out.extend_from_slice(&payloads);
        out
    }

    /// バイト列を指定ディレクトリのファイルに書き出してパスを返す
    ///
    /// ディレクトリの寿命（一時ディレクトリなど）は呼び出し側が管理する。
    pub fn build_to_file(self, dir: &std::path::Path, name: &str) -> std::io::Result<std::path::PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, self.build())?;
        Ok(path)
    }
}

fn encode_module(m: &ModuleRecord) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&m.base.to_le_bytes());
    out.extend_from_slice(&m.size.to_le_bytes());
    out.extend_from_slice(&m.build_id);
    out.extend_from_slice(&(m.version.len() as u16).to_le_bytes());
    out.extend_from_slice(&(m.path.len() as u16).to_le_bytes());
    out.extend_from_slice(m.version.as_bytes());
    out.extend_from_slice(m.path.as_bytes());
    out
}

fn encode_thread(t: &ThreadRecord) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&t.tid.to_le_bytes());
    out.extend_from_slice(&t.pc.to_le_bytes());
    out.extend_from_slice(&t.sp.to_le_bytes());
    out.extend_from_slice(&t.fp.to_le_bytes());
    out
}
