//! Sumire 解析セッションのコア機能
//!
//! このクレートは、ダンプ解析セッションの中核となるロジックを提供します。
//! 複数ターゲットの管理、カレント選択のコンテキスト、スコープ付きサービス
//! レジストリ、コマンドディスパッチャを統合します。

pub mod commands;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod parse;
pub mod session;

pub use commands::register_builtins;
pub use context::{Capability, Context, Scope, ServiceRegistry};
pub use dispatch::{CommandOutput, CommandSpec, DispatchResult, Dispatcher};
pub use errors::CommandError;
pub use session::{CurrentTarget, SelectedRuntime, SelectedThread, Session, TargetId};

// 他のクレートから使用するために再エクスポート
pub use sumire_runtime::{Frame, Runtime, RuntimeInspector};
pub use sumire_symbols::{SymbolKey, SymbolService};
pub use sumire_target::{ModuleInfo, Target, ThreadId, ThreadInfo};

/// 解析セッションの結果型
pub type Result<T> = anyhow::Result<T>;
