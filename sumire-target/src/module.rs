//! モジュール情報

/// ロード済みモジュール（実行ファイルまたはライブラリ）
///
/// 発見後は不変。シンボル解決のキーとなるbuild_idを持つ。
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// ベースアドレス
    pub base: u64,
    /// イメージサイズ（バイト）
    pub size: u64,
    /// ビルド識別子（シンボル検索キー）
    pub build_id: [u8; 16],
    /// モジュールのバージョン文字列
    pub version: String,
    /// ファイルパス
    pub path: String,
}

impl ModuleInfo {
    /// パスの末尾要素（ファイル名）を取得する
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// 拡張子を除いたファイル名を取得する
    pub fn stem(&self) -> &str {
        let name = self.name();
        name.split('.').next().unwrap_or(name)
    }

    /// build_idを小文字16進文字列として取得する
    pub fn build_id_hex(&self) -> String {
        self.build_id.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// 指定アドレスがこのモジュールの範囲内か
    ///
    /// base/sizeはダンプ由来。最上部に載るモジュールでも溢れない判定にする。
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str) -> ModuleInfo {
        ModuleInfo {
            base: 0x1000,
            size: 0x2000,
            build_id: [0xab; 16],
            version: "1.0.0".to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn test_name_and_stem() {
        let m = module("/usr/lib/libmrt.so");
        assert_eq!(m.name(), "libmrt.so");
        assert_eq!(m.stem(), "libmrt");

        let m = module("app");
        assert_eq!(m.name(), "app");
        assert_eq!(m.stem(), "app");
    }

    #[test]
    fn test_build_id_hex() {
        let m = module("/usr/lib/libmrt.so");
        assert_eq!(m.build_id_hex(), "ab".repeat(16));
    }

    #[test]
    fn test_contains() {
        let m = module("/usr/lib/libmrt.so");
        assert!(m.contains(0x1000));
        assert!(m.contains(0x2fff));
        assert!(!m.contains(0x3000));
        assert!(!m.contains(0xfff));
    }

    #[test]
    fn test_contains_at_top_of_address_space() {
        let mut m = module("/usr/lib/libmrt.so");
        m.base = u64::MAX - 0xfff;
        m.size = 0x1000;

        assert!(m.contains(u64::MAX));
        assert!(m.contains(m.base));
        assert!(!m.contains(m.base - 1));
        assert!(!m.contains(0));
    }
}
