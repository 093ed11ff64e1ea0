//! シンボル検索キー

use std::fmt;

/// モジュール識別子（シンボル検索キー）
///
/// モジュールのファイル名（拡張子なし）とビルド識別子の組。
/// セッション中、同一キーのシンボルは不変とみなす。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    stem: String,
    build_id_hex: String,
}

impl SymbolKey {
    /// キーを作成する
    pub fn new(stem: &str, build_id: &[u8; 16]) -> Self {
        let build_id_hex = build_id.iter().map(|b| format!("{:02x}", b)).collect();
        Self {
            stem: stem.to_string(),
            build_id_hex,
        }
    }

    /// モジュール名部分を取得する
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// ビルド識別子（小文字16進）を取得する
    pub fn build_id_hex(&self) -> &str {
        &self.build_id_hex
    }

    /// 探索先ディレクトリ内でのファイル名
    pub fn file_name(&self) -> String {
        format!("{}-{}.sym", self.stem, self.build_id_hex)
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stem, self.build_id_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        let key = SymbolKey::new("libmrt", &[0x0f; 16]);
        assert_eq!(key.file_name(), format!("libmrt-{}.sym", "0f".repeat(16)));
    }

    #[test]
    fn test_keys_with_same_identity_are_equal() {
        let a = SymbolKey::new("app", &[1; 16]);
        let b = SymbolKey::new("app", &[1; 16]);
        let c = SymbolKey::new("app", &[2; 16]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
