//! Sumire ターゲットモデル
//!
//! このクレートは、プロセスのメモリスナップショット（ダンプ）を開き、
//! 読み取り専用のアドレス空間として扱うための低レベル機能を提供します。
//! SDMPフォーマットの解析、モジュール/スレッドテーブル、メモリ読み取りなどを行います。

pub mod builder;
pub mod dump;
pub mod errors;
pub mod format;
pub mod memory;
pub mod module;
pub mod target;
pub mod thread;

pub use builder::SnapshotBuilder;
pub use dump::SnapshotFile;
pub use errors::TargetError;
pub use format::{Arch, Region, SnapshotHeader};
pub use memory::{AddressSpace, AddressSpaceExt, MemoryReadable};
pub use module::ModuleInfo;
pub use target::Target;
pub use thread::{ThreadId, ThreadInfo};

/// ターゲットモデルの結果型
pub type Result<T> = anyhow::Result<T>;
