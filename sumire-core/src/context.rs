//! カレント選択とスコープ付きサービスレジストリ
//!
//! グローバルなサービスロケータの代わりに、明示的なスコープチェーン
//! （Global → Target → Runtime → Thread）を持つレジストリをコマンド実行に
//! 引き回す。狭いスコープの登録が広いスコープの登録を隠す。

use crate::errors::CommandError;
use crate::Result;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use sumire_target::ThreadId;

/// サービスのスコープ
///
/// 各スコープの寿命は所有エンティティの寿命に一致する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Target,
    Runtime,
    Thread,
}

impl Scope {
    fn index(self) -> usize {
        match self {
            Scope::Global => 0,
            Scope::Target => 1,
            Scope::Runtime => 2,
            Scope::Thread => 3,
        }
    }
}

/// コマンドが要求する能力（サービス型と表示名）
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    type_id: TypeId,
    name: &'static str,
}

impl Capability {
    /// 型Tに対する能力を作成する
    pub fn of<T: Any>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name,
        }
    }

    /// 表示名を取得する
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// スコープ付きサービスレジストリ
///
/// 型IDをキーとするtypemapをスコープごとに持つ。
pub struct ServiceRegistry {
    scopes: [HashMap<TypeId, Arc<dyn Any + Send + Sync>>; 4],
}

impl ServiceRegistry {
    /// 空のレジストリを作成する
    pub fn new() -> Self {
        Self {
            scopes: Default::default(),
        }
    }

    /// サービスを指定スコープに登録する
    ///
    /// 同じスコープに同じ型を登録し直すと置き換えになる。
    pub fn register<T: Any + Send + Sync>(&mut self, scope: Scope, service: Arc<T>) {
        self.scopes[scope.index()].insert(TypeId::of::<T>(), service);
    }

    /// サービスを解決する
    ///
    /// 狭いスコープから順に（Thread → Runtime → Target → Global）探し、
    /// 最初に見つかったものを返す。どこにも無ければ `ServiceNotFound`。
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let type_id = TypeId::of::<T>();
        for scope in self.scopes.iter().rev() {
            if let Some(service) = scope.get(&type_id) {
                let service = Arc::clone(service)
                    .downcast::<T>()
                    .expect("registry entry type mismatch");
                return Ok(service);
            }
        }
        Err(CommandError::ServiceNotFound(std::any::type_name::<T>().to_string()).into())
    }

    /// 能力が解決可能か（コマンド実行前のバインドチェック用）
    pub fn contains(&self, cap: &Capability) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.contains_key(&cap.type_id))
    }

    /// 指定スコープの登録をすべて破棄する
    pub fn clear_scope(&mut self, scope: Scope) {
        self.scopes[scope.index()].clear();
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// カレント選択のコンテキスト
///
/// 不変条件: スレッド/ランタイムの選択はカレントターゲットに属するものだけ。
/// ターゲットを切り替えると狭い選択はすべてクリアされる（選択はターゲットを
/// またいで持ち越さない）。
pub struct Context {
    services: ServiceRegistry,
    current_target: Option<usize>,
    current_runtime: Option<usize>,
    current_thread: Option<ThreadId>,
}

impl Context {
    /// 空のコンテキストを作成する
    pub fn new() -> Self {
        Self {
            services: ServiceRegistry::new(),
            current_target: None,
            current_runtime: None,
            current_thread: None,
        }
    }

    /// サービスレジストリへの参照を取得する
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// サービスレジストリへの可変参照を取得する
    pub fn services_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.services
    }

    /// カレントターゲットを取得する
    pub fn current_target(&self) -> Option<usize> {
        self.current_target
    }

    /// カレントランタイム（検出リスト内のインデックス）を取得する
    pub fn current_runtime(&self) -> Option<usize> {
        self.current_runtime
    }

    /// カレントスレッドを取得する
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current_thread
    }

    /// カレントターゲットを差し替える
    ///
    /// 旧ターゲット配下のランタイム/スレッド選択と、Target以下の
    /// スコープのサービスはすべて破棄される。
    pub fn set_current_target(&mut self, target: Option<usize>) {
        self.current_target = target;
        self.current_runtime = None;
        self.current_thread = None;
        self.services.clear_scope(Scope::Target);
        self.services.clear_scope(Scope::Runtime);
        self.services.clear_scope(Scope::Thread);
    }

    /// カレントランタイムを選択する（所属検証は呼び出し側）
    pub fn set_current_runtime(&mut self, index: Option<usize>) {
        self.current_runtime = index;
        self.services.clear_scope(Scope::Runtime);
    }

    /// カレントスレッドを選択する（所属検証は呼び出し側）
    pub fn set_current_thread(&mut self, tid: Option<ThreadId>) {
        self.current_thread = tid;
        self.services.clear_scope(Scope::Thread);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Greeter(&'static str);

    #[test]
    fn test_narrow_scope_shadows_broad() {
        let mut registry = ServiceRegistry::new();
        registry.register(Scope::Global, Arc::new(Greeter("global")));
        registry.register(Scope::Target, Arc::new(Greeter("target")));

        let greeter = registry.get::<Greeter>().unwrap();
        assert_eq!(greeter.0, "target");

        // Targetスコープが消えるとGlobalが見える
        registry.clear_scope(Scope::Target);
        let greeter = registry.get::<Greeter>().unwrap();
        assert_eq!(greeter.0, "global");
    }

    #[test]
    fn test_missing_service() {
        let registry = ServiceRegistry::new();
        let err = registry.get::<Greeter>().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_switching_target_clears_narrow_selections() {
        let mut ctx = Context::new();
        ctx.set_current_target(Some(0));
        ctx.set_current_runtime(Some(0));
        ctx.set_current_thread(Some(42));

        ctx.set_current_target(Some(1));
        assert_eq!(ctx.current_target(), Some(1));
        assert_eq!(ctx.current_runtime(), None);
        assert_eq!(ctx.current_thread(), None);
    }

    #[test]
    fn test_contains_checks_all_scopes() {
        let mut registry = ServiceRegistry::new();
        let cap = Capability::of::<Greeter>("greeter");
        assert!(!registry.contains(&cap));

        registry.register(Scope::Thread, Arc::new(Greeter("thread")));
        assert!(registry.contains(&cap));
    }
}
