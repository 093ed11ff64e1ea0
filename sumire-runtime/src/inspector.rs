//! ランタイムインスペクタのファサード
//!
//! 1つのターゲットに対する検出・ヒープウォーク・型解決・スタックトレースを
//! まとめる。型記述子キャッシュはターゲットと同じ寿命を持ち、ターゲットの
//! クローズとともに破棄される。

use crate::detector::RuntimeDetector;
use crate::heap::{self, HeapWalk};
use crate::runtime::Runtime;
use crate::stack::{unwinder_for, Frame};
use crate::types::{self, TypeDescriptor};
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sumire_symbols::{SymbolKey, SymbolService};
use sumire_target::{AddressSpace, Target, ThreadId};
use tracing::debug;

/// ランタイムインスペクタ
pub struct RuntimeInspector {
    symbols: Arc<SymbolService>,
    detector: RuntimeDetector,
    /// (ランタイムベース, 型ハンドル) -> 解決済み記述子
    type_cache: Mutex<HashMap<(u64, u64), Arc<TypeDescriptor>>>,
}

impl RuntimeInspector {
    /// インスペクタを作成する
    pub fn new(symbols: Arc<SymbolService>) -> Result<Self> {
        Ok(Self {
            symbols,
            detector: RuntimeDetector::new()?,
            type_cache: Mutex::new(HashMap::new()),
        })
    }

    /// ターゲット内のランタイムを検出する
    pub fn detect_runtimes(&self, target: &Target) -> Vec<Runtime> {
        self.detector.detect(target)
    }

    /// 遅延ヒープウォークを開始する
    ///
    /// 毎回ディレクトリから読み直す。ダンプは不変なので、同じランタイムに
    /// 対する再ウォークは同一のオブジェクト列を生む。
    pub fn walk_heap(&self, target: &Target, runtime: &Runtime) -> Result<HeapWalk> {
        let space = target.reader()?;
        let segments = heap::read_heap_directory(space.as_ref(), runtime)?;
        debug!(
            "starting heap walk for runtime at 0x{:x}: {} segments",
            runtime.base(),
            segments.len()
        );
        Ok(HeapWalk::new(
            space as Arc<dyn AddressSpace>,
            runtime.layout(),
            segments,
        ))
    }

    /// 型ハンドルを記述子に解決する
    ///
    /// 結果はランタイムごと・ハンドルごとにセッション中キャッシュされる。
    pub fn resolve_type(
        &self,
        target: &Target,
        runtime: &Runtime,
        handle: u64,
    ) -> Result<Arc<TypeDescriptor>> {
        let cache_key = (runtime.base(), handle);
        if let Some(desc) = self.type_cache.lock().unwrap().get(&cache_key) {
            return Ok(Arc::clone(desc));
        }

        // ロックの外で解決し、完成した記述子だけを一度だけ入れる
        let space = target.reader()?;
        let desc = Arc::new(types::resolve_type(
            space.as_ref(),
            target,
            &self.symbols,
            handle,
        )?);
        self.type_cache
            .lock()
            .unwrap()
            .entry(cache_key)
            .or_insert_with(|| Arc::clone(&desc));
        Ok(desc)
    }

    /// スレッドのスタックトレースを取得する
    ///
    /// フレームごとにシンボル解決を試み、解決できないフレームは
    /// アドレスのみで報告する。1フレームの失敗でウォーク全体は失敗しない。
    pub fn stack_trace(&self, target: &Target, tid: ThreadId) -> Result<Vec<Frame>> {
        let thread = target
            .thread(tid)
            .ok_or_else(|| anyhow::anyhow!("no thread {} in target", tid))?;
        let space = target.reader()?;
        let unwinder = unwinder_for(target.arch());

        let pcs = unwinder.walk(space.as_ref(), thread);
        let frames = pcs
            .into_iter()
            .map(|pc| self.symbolize(target, pc))
            .collect();
        Ok(frames)
    }

    /// 1つの命令アドレスをフレームに整形する
    fn symbolize(&self, target: &Target, pc: u64) -> Frame {
        let module = match target.module_for_addr(pc) {
            Some(m) => m,
            None => {
                return Frame {
                    pc,
                    module: None,
                    method: None,
                }
            }
        };

        let key = SymbolKey::new(module.stem(), &module.build_id);
        // シンボルミスは回復可能。アドレスのみのフレームに落とす。
        let method = self
            .symbols
            .load(&key)
            .ok()
            .and_then(|file| {
                file.method_at(pc - module.base)
                    .map(|m| m.display_name().to_string())
            });

        Frame {
            pc,
            module: Some(module.name().to_string()),
            method,
        }
    }
}
