//! 解析セッション
//!
//! 複数の開かれたターゲットと、カレント選択、共有シンボルサービスを束ねる。
//! セッションは1スレッドで駆動される前提だが、中のサービス
//! （SymbolService、RuntimeInspector）は内部同期を持つ。

use crate::context::{Context, Scope};
use crate::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use sumire_runtime::{Runtime, RuntimeInspector};
use sumire_symbols::SymbolService;
use sumire_target::{Target, ThreadId};
use tracing::debug;

/// セッション内でターゲットを識別するID（オープン順に採番、再利用しない）
pub type TargetId = usize;

/// カレントターゲットの存在を示すマーカーサービス
///
/// Targetスコープに登録され、ターゲットを要求するコマンドの
/// 実行前チェックに使われる。
pub struct CurrentTarget(pub TargetId);

/// 選択中ランタイム（検出リスト内のインデックス）のマーカーサービス
pub struct SelectedRuntime(pub usize);

/// 選択中スレッドのマーカーサービス
pub struct SelectedThread(pub ThreadId);

/// 開かれたターゲットと付随する状態
pub struct TargetEntry {
    pub target: Target,
    pub inspector: RuntimeInspector,
    /// 検出結果。最初に必要になったときに確定する。
    runtimes: Option<Vec<Runtime>>,
}

/// 解析セッション
pub struct Session {
    symbols: Arc<SymbolService>,
    targets: BTreeMap<TargetId, TargetEntry>,
    next_id: TargetId,
    context: Context,
}

impl Session {
    /// セッションを作成する
    ///
    /// シンボルサービスはGlobalスコープに登録され、セッション全体で共有される。
    pub fn new(symbols: Arc<SymbolService>) -> Self {
        let mut context = Context::new();
        context
            .services_mut()
            .register(Scope::Global, Arc::clone(&symbols));
        Self {
            symbols,
            targets: BTreeMap::new(),
            next_id: 1,
            context,
        }
    }

    /// ダンプファイルを開いて新しいターゲットを追加する
    ///
    /// 成功したターゲットがカレントになる。
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<TargetId> {
        let target = Target::open(path)?;
        let inspector = RuntimeInspector::new(Arc::clone(&self.symbols))?;

        let id = self.next_id;
        self.next_id += 1;
        self.targets.insert(
            id,
            TargetEntry {
                target,
                inspector,
                runtimes: None,
            },
        );
        debug!("target {} opened", id);
        self.set_current(Some(id));
        Ok(id)
    }

    /// ターゲットを閉じてセッションから外す
    ///
    /// 冪等。存在しないIDは何もしない。カレントだった場合は選択が外れる。
    pub fn close(&mut self, id: TargetId) {
        if let Some(mut entry) = self.targets.remove(&id) {
            entry.target.close();
            debug!("target {} closed", id);
            if self.context.current_target() == Some(id) {
                self.set_current(None);
            }
        }
    }

    /// カレントターゲットを切り替える
    ///
    /// ランタイム/スレッドの選択とTarget以下のスコープはクリアされる。
    pub fn set_current(&mut self, id: Option<TargetId>) {
        self.context.set_current_target(id);
        if let Some(id) = id {
            self.context
                .services_mut()
                .register(Scope::Target, Arc::new(CurrentTarget(id)));
        }
    }

    /// 開いているターゲットのID一覧（オープン順）
    pub fn target_ids(&self) -> Vec<TargetId> {
        self.targets.keys().copied().collect()
    }

    /// IDでターゲットを引く
    pub fn target(&self, id: TargetId) -> Option<&TargetEntry> {
        self.targets.get(&id)
    }

    /// カレントターゲットのエントリを取得する
    pub fn current(&self) -> Result<&TargetEntry> {
        let id = self.current_id()?;
        self.targets
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("current target {} no longer open", id))
    }

    /// カレントターゲットのIDを取得する
    pub fn current_id(&self) -> Result<TargetId> {
        self.context
            .current_target()
            .ok_or_else(|| anyhow::anyhow!("no target selected (use 'open <path>')"))
    }

    /// カレントターゲットのランタイム一覧を取得する
    ///
    /// 初回アクセスで検出を実行し、以後はその結果を返す。
    pub fn runtimes(&mut self) -> Result<&[Runtime]> {
        let id = self.current_id()?;
        let entry = self
            .targets
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("current target {} no longer open", id))?;
        if entry.runtimes.is_none() {
            let detected = entry.inspector.detect_runtimes(&entry.target);
            debug!("target {}: {} runtime(s) detected", id, detected.len());
            entry.runtimes = Some(detected);
        }
        Ok(entry
            .runtimes
            .as_deref()
            .unwrap_or_default())
    }

    /// ランタイムを選択する
    pub fn select_runtime(&mut self, index: usize) -> Result<()> {
        let count = self.runtimes()?.len();
        if index >= count {
            return Err(anyhow::anyhow!(
                "runtime index {} out of range ({} detected)",
                index,
                count
            ));
        }
        self.context.set_current_runtime(Some(index));
        self.context
            .services_mut()
            .register(Scope::Runtime, Arc::new(SelectedRuntime(index)));
        Ok(())
    }

    /// スレッドを選択する
    ///
    /// カレントターゲットに属するスレッドのみ選択できる。
    pub fn select_thread(&mut self, tid: ThreadId) -> Result<()> {
        let entry = self.current()?;
        if entry.target.thread(tid).is_none() {
            return Err(anyhow::anyhow!("no thread {} in current target", tid));
        }
        self.context.set_current_thread(Some(tid));
        self.context
            .services_mut()
            .register(Scope::Thread, Arc::new(SelectedThread(tid)));
        Ok(())
    }

    /// コンテキストを取得する
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// コンテキストへの可変参照を取得する
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// 共有シンボルサービスを取得する
    pub fn symbols(&self) -> &Arc<SymbolService> {
        &self.symbols
    }
}
