//! ターゲットモデル
//!
//! 開かれた1つのダンプを表す。モジュール/スレッドテーブルはオープン時に
//! 確定し、以後不変。メモリの実体はアドレス空間経由で遅延アクセスする。

use crate::dump::SnapshotFile;
use crate::errors::TargetError;
use crate::format::Arch;
use crate::module::ModuleInfo;
use crate::thread::{ThreadId, ThreadInfo};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// 開かれたダンプ
#[derive(Debug)]
pub struct Target {
    /// ダンプファイルのパス
    path: PathBuf,
    /// プロセスID（記録されていないダンプもある）
    process_id: Option<u32>,
    /// アーキテクチャ
    arch: Arch,
    /// モジュール一覧（ロード順）
    modules: Vec<ModuleInfo>,
    /// スレッド一覧（生成順）
    threads: Vec<ThreadInfo>,
    /// アドレス空間。クローズで解放される。
    reader: Option<Arc<SnapshotFile>>,
}

impl Target {
    /// ダンプファイルを開いてターゲットを作成する
    ///
    /// ヘッダとテーブルは即時解析するが、ヒープの中身には触れない。
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = SnapshotFile::open(&path)?;

        let header = snapshot.header();
        let process_id = header.process_id;
        let arch = header.arch;
        let modules = snapshot.modules().to_vec();
        let threads = snapshot.threads().to_vec();

        debug!("target opened: {:?} ({})", path, arch);

        Ok(Self {
            path,
            process_id,
            arch,
            modules,
            threads,
            reader: Some(Arc::new(snapshot)),
        })
    }

    /// ターゲットを閉じてアドレス空間を解放する
    ///
    /// 冪等。すでに閉じたターゲットを閉じても何も起きない。
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("target closed: {:?}", self.path);
        }
    }

    /// 閉じられているか
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// アドレス空間への参照を取得する
    pub fn reader(&self) -> Result<Arc<SnapshotFile>> {
        self.reader
            .clone()
            .ok_or_else(|| TargetError::TargetClosed.into())
    }

    /// ダンプファイルのパスを取得する
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// プロセスIDを取得する
    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    /// アーキテクチャを取得する
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// モジュール一覧を取得する（ロード順、呼び出しごとに同一）
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// スレッド一覧を取得する（生成順、呼び出しごとに同一）
    pub fn threads(&self) -> &[ThreadInfo] {
        &self.threads
    }

    /// 指定IDのスレッドを取得する
    pub fn thread(&self, tid: ThreadId) -> Option<&ThreadInfo> {
        self.threads.iter().find(|t| t.tid == tid)
    }

    /// 指定アドレスを含むモジュールを探す
    pub fn module_for_addr(&self, addr: u64) -> Option<&ModuleInfo> {
        self.modules.iter().find(|m| m.contains(addr))
    }
}
