//! コマンドのトークナイズ、解決、実行
//!
//! 行を受け取り、名前・エイリアス・一意な前方一致でコマンドを解決し、
//! 要求される能力をチェックしてから実行する。実行中のエラーはすべて
//! ここで吸収され、`DispatchResult::Failed` として呼び出し側に返る。

use crate::context::Capability;
use crate::errors::CommandError;
use crate::session::Session;
use crate::Result;

/// コマンド実行の出力
#[derive(Debug, Default)]
pub struct CommandOutput {
    /// 表示する行
    pub lines: Vec<String>,
    /// セッション終了の要求
    pub exit: bool,
}

impl CommandOutput {
    /// 出力なしの結果を作成する
    pub fn empty() -> Self {
        Self::default()
    }

    /// 複数行の出力を作成する
    pub fn lines(lines: Vec<String>) -> Self {
        Self { lines, exit: false }
    }

    /// 1行の出力を作成する
    pub fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            exit: false,
        }
    }

    /// セッション終了を要求する結果を作成する
    pub fn exit() -> Self {
        Self {
            lines: Vec::new(),
            exit: true,
        }
    }
}

/// コマンドの実行関数
pub type CommandFn = fn(&mut Session, &[String]) -> Result<CommandOutput>;

/// 登録されるコマンドの定義
pub struct CommandSpec {
    /// 正式名（小文字）
    pub name: &'static str,
    /// エイリアス（小文字）
    pub aliases: &'static [&'static str],
    /// helpに表示する一行説明
    pub summary: &'static str,
    /// 実行前にスコープチェーンで解決可能であるべき能力
    pub required: Vec<Capability>,
    /// 実行本体
    pub run: CommandFn,
}

/// 1行のディスパッチ結果
#[derive(Debug)]
pub enum DispatchResult {
    /// コマンドが完了した（出力と終了フラグ付き）
    Done(CommandOutput),
    /// 解決または実行に失敗した（表示用メッセージ）
    Failed(String),
}

/// コマンドディスパッチャ
pub struct Dispatcher {
    commands: Vec<CommandSpec>,
}

impl Dispatcher {
    /// 空のディスパッチャを作成する
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// コマンドを登録する
    ///
    /// 名前もエイリアスも登録済みの名前・エイリアスと衝突してはならない。
    /// 重複を許すと先勝ちの曖昧な解決になるため、登録時点で拒否する。
    pub fn register(&mut self, spec: CommandSpec) -> Result<()> {
        for existing in &self.commands {
            if existing.name == spec.name {
                return Err(anyhow::anyhow!("command '{}' already registered", spec.name));
            }
            let collides = existing.aliases.contains(&spec.name)
                || spec.aliases.contains(&existing.name)
                || spec
                    .aliases
                    .iter()
                    .any(|a| existing.aliases.contains(a));
            if collides {
                return Err(anyhow::anyhow!(
                    "command '{}' conflicts with '{}'",
                    spec.name,
                    existing.name
                ));
            }
        }
        self.commands.push(spec);
        Ok(())
    }

    /// 登録済みコマンドの一覧（help用）
    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// 1行を実行する
    ///
    /// 空行は何もしない。コマンドのエラーはここで文字列化され、
    /// 呼び出し側（REPL）には決して伝播しない。
    pub fn execute(&self, session: &mut Session, line: &str) -> DispatchResult {
        let tokens = match tokenize(line) {
            Ok(tokens) => tokens,
            Err(e) => return DispatchResult::Failed(format!("{:#}", e)),
        };
        let Some((name, args)) = tokens.split_first() else {
            return DispatchResult::Done(CommandOutput::empty());
        };

        let spec = match self.resolve(name) {
            Ok(spec) => spec,
            Err(e) => return DispatchResult::Failed(format!("{:#}", e)),
        };

        // 実行前バインドチェック: 要求能力がチェーンに無ければ実行しない
        for cap in &spec.required {
            if !session.context().services().contains(cap) {
                let err = CommandError::MissingService(cap.name().to_string());
                return DispatchResult::Failed(format!("{}", err));
            }
        }

        match (spec.run)(session, args) {
            Ok(output) => DispatchResult::Done(output),
            Err(e) => DispatchResult::Failed(format!("{:#}", e)),
        }
    }

    /// コマンド名を解決する
    ///
    /// 優先順位: 名前の完全一致 > エイリアスの完全一致 > 一意な前方一致。
    /// 大文字小文字は区別しない。
    fn resolve(&self, input: &str) -> Result<&CommandSpec> {
        let lowered = input.to_ascii_lowercase();

        for spec in &self.commands {
            if spec.name == lowered {
                return Ok(spec);
            }
        }
        for spec in &self.commands {
            if spec.aliases.contains(&lowered.as_str()) {
                return Ok(spec);
            }
        }

        // 前方一致は名前とエイリアスの両方を対象にするが、
        // 同一コマンドへの複数ヒットは1件と数える
        let mut matched: Vec<&CommandSpec> = Vec::new();
        for spec in &self.commands {
            let hits = spec.name.starts_with(&lowered)
                || spec.aliases.iter().any(|a| a.starts_with(&lowered));
            if hits {
                matched.push(spec);
            }
        }

        match matched.len() {
            0 => Err(CommandError::Unknown(input.to_string()).into()),
            1 => Ok(matched[0]),
            _ => {
                let candidates = matched
                    .iter()
                    .map(|s| s.name)
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(CommandError::Ambiguous {
                    input: input.to_string(),
                    candidates,
                }
                .into())
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// 行を空白区切りでトークンに分割する
///
/// ダブルクォートで囲むと空白を含むトークンを書ける。クォート内の
/// `\"` はエスケープされた引用符。閉じていないクォートはエラー。
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => in_quotes = false,
                '\\' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                _ => current.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
    }

    if in_quotes {
        return Err(anyhow::anyhow!("unterminated quote in command line"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
