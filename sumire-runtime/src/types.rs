//! 型記述子の解決
//!
//! 型ハンドルはメモリ上の型記述子を指す:
//! `u64 module_base | u32 name_token | u32 instance_size`
//!
//! 型名は定義モジュールのシンボルファイル（Tレコード）から引く。

use crate::errors::RuntimeError;
use crate::Result;
use sumire_symbols::{SymbolKey, SymbolService};
use sumire_target::{AddressSpace, AddressSpaceExt, Target};

/// 解決済み型記述子
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// 型ハンドル（記述子のアドレス）
    pub handle: u64,
    /// 定義モジュールのベースアドレス
    pub module_base: u64,
    /// シンボルファイル内の名前トークン
    pub name_token: u32,
    /// インスタンスサイズ（バイト）
    pub instance_size: u32,
    /// 解決済みの型名
    pub name: String,
}

/// 型ハンドルを記述子に解決する
///
/// 定義モジュールのシンボルが（フェッチを試しても）得られない場合と、
/// トークンがシンボルファイルに無い場合は `UnresolvedType`。
pub fn resolve_type(
    space: &dyn AddressSpace,
    target: &Target,
    symbols: &SymbolService,
    handle: u64,
) -> Result<TypeDescriptor> {
    // ハンドルはヒープのオブジェクトヘッダから来る未検証の値
    let tail = handle.checked_add(12).ok_or_else(|| RuntimeError::UnresolvedType {
        handle,
        reason: "descriptor overflows the address space".to_string(),
    })?;
    let module_base = space.read_u64(handle)?;
    let name_token = space.read_u32(handle + 8)?;
    let instance_size = space.read_u32(tail)?;

    let module = target
        .modules()
        .iter()
        .find(|m| m.base == module_base)
        .ok_or_else(|| RuntimeError::UnresolvedType {
            handle,
            reason: format!("no module with base 0x{:x}", module_base),
        })?;

    let key = SymbolKey::new(module.stem(), &module.build_id);
    let file = symbols
        .load(&key)
        .map_err(|e| RuntimeError::UnresolvedType {
            handle,
            reason: format!("symbols unavailable for {}: {}", key, e),
        })?;

    let name = file
        .type_name(name_token)
        .ok_or_else(|| RuntimeError::UnresolvedType {
            handle,
            reason: format!("token 0x{:x} not present in symbols for {}", name_token, key),
        })?
        .to_string();

    Ok(TypeDescriptor {
        handle,
        module_base,
        name_token,
        instance_size,
        name,
    })
}
