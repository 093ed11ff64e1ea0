//! シンボルファイルの解析
//!
//! `.sym` はUTF-8の行指向テキスト:
//! - `T <token-hex> <type-name>`   型トークンから型名
//! - `M <start-hex> <size-hex> <method-name>`  モジュール相対のメソッド範囲
//!
//! 未知のレコード種別は警告だけ出して読み飛ばす。

use crate::errors::SymbolError;
use crate::Result;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// メソッドのアドレス範囲（モジュール相対）
#[derive(Debug, Clone)]
pub struct MethodRange {
    pub start: u64,
    pub size: u64,
    /// レコードに書かれたままのメソッド名（マングルされていることもある）
    pub name: String,
    /// デマングルされたメソッド名（可読な形式）
    pub demangled_name: String,
}

impl MethodRange {
    fn new(start: u64, size: u64, name: String) -> Self {
        let demangled_name = demangle_method(&name);
        Self {
            start,
            size,
            name,
            demangled_name,
        }
    }

    /// 表示用の名前を取得（デマングル可能ならデマングル後、できなければ元の名前）
    pub fn display_name(&self) -> &str {
        &self.demangled_name
    }
}

/// メソッド名をデマングルする
///
/// ネイティブモジュールのシンボルはRust形式でマングルされていることがある。
/// マネージドメソッド名はそのまま通る。
fn demangle_method(name: &str) -> String {
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return format!("{:#}", demangled);
    }
    name.to_string()
}

/// 解析済みシンボルファイル
pub struct SymbolFile {
    /// 型トークン -> 型名
    types: HashMap<u32, String>,
    /// 開始アドレスでソート済み
    methods: Vec<MethodRange>,
}

impl SymbolFile {
    /// バイト列から解析する
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| SymbolError::InvalidSymbolFile("not UTF-8".to_string()))?;

        let mut types = HashMap::new();
        let mut methods = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let kind = parts.next().unwrap_or_default();
            match kind {
                "T" => {
                    let (token, name) = parse_type_record(&mut parts)
                        .ok_or_else(|| bad_record(lineno, line))?;
                    types.insert(token, name);
                }
                "M" => {
                    let range = parse_method_record(&mut parts)
                        .ok_or_else(|| bad_record(lineno, line))?;
                    methods.push(range);
                }
                other => {
                    warn!("skipping unknown symbol record kind '{}' (line {})", other, lineno + 1);
                }
            }
        }

        methods.sort_by_key(|m| m.start);

        Ok(Self { types, methods })
    }

    /// ファイルから読み込んで解析する
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read symbol file {:?}: {}", path, e))?;
        Self::parse(&bytes)
    }

    /// 型トークンから型名を引く
    pub fn type_name(&self, token: u32) -> Option<&str> {
        self.types.get(&token).map(|s| s.as_str())
    }

    /// モジュール相対アドレスを含むメソッドを探す
    ///
    /// バイナリサーチで直前の開始アドレスを見つけ、範囲内かを確認する。
    pub fn method_at(&self, rel_addr: u64) -> Option<&MethodRange> {
        let idx = match self.methods.binary_search_by_key(&rel_addr, |m| m.start) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let method = &self.methods[idx];
        (rel_addr < method.start + method.size).then_some(method)
    }

    /// 型レコード数
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// メソッドレコード数
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

fn bad_record(lineno: usize, line: &str) -> anyhow::Error {
    SymbolError::InvalidSymbolFile(format!("line {}: '{}'", lineno + 1, line)).into()
}

fn parse_type_record<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<(u32, String)> {
    let token = u32::from_str_radix(parts.next()?, 16).ok()?;
    let name = parts.collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then_some((token, name))
}

fn parse_method_record<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<MethodRange> {
    let start = u64::from_str_radix(parts.next()?, 16).ok()?;
    let size = u64::from_str_radix(parts.next()?, 16).ok()?;
    let name = parts.collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then(|| MethodRange::new(start, size, name))
}
