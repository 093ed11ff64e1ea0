//! Sumire CLI - コマンドラインインターフェース
//!
//! プロセスメモリスナップショット解析ツール sumire のREPLインターフェース

use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::IsTerminal;
use std::path::PathBuf;
use sumire_core::{
    register_builtins, CommandOutput, DispatchResult, Dispatcher, Session, SymbolService,
};
use tracing_subscriber::EnvFilter;

/// Sumire - Process Snapshot Analyzer
#[derive(Parser)]
#[command(name = "sumire")]
#[command(version = "0.1.0")]
#[command(about = "Post-mortem analyzer for process memory snapshots", long_about = None)]
struct Cli {
    /// Dump files to open at startup
    dumps: Vec<PathBuf>,

    /// Execute a command at startup, before the interactive prompt
    /// (repeatable, runs in order)
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,

    /// Symbol cache directory (default: ~/.sumire/symbols)
    #[arg(long)]
    symbol_cache: Option<PathBuf>,

    /// Additional directory to search for symbol files (repeatable)
    #[arg(long = "symbol-dir")]
    symbol_dirs: Vec<PathBuf>,

    /// Symbol server URL (repeatable)
    #[arg(long = "symbol-server")]
    symbol_servers: Vec<String>,
}

fn main() -> Result<()> {
    // RUST_LOGで上書き可能。既定ではwarn以上のみ。
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let symbols = init_symbols(&cli);
    let mut session = Session::new(std::sync::Arc::new(symbols));
    let mut dispatcher = Dispatcher::new();
    register_builtins(&mut dispatcher)?;

    // 起動時に指定されたダンプを開く。開けないダンプは致命的。
    for dump in &cli.dumps {
        let id = session.open(dump)?;
        println!("target {}: {}", id, dump.display());
    }

    let exited = run_batch(&dispatcher, &mut session, &cli.commands);

    // 端末から起動されたときだけ対話モードに入る
    if !exited && std::io::stdin().is_terminal() {
        run_repl(&dispatcher, &mut session)?;
    }

    Ok(())
}

/// シンボルサービスを構築する
fn init_symbols(cli: &Cli) -> SymbolService {
    let service = SymbolService::new();

    let cache = cli
        .symbol_cache
        .clone()
        .or_else(|| home::home_dir().map(|h| h.join(".sumire").join("symbols")));
    if let Some(cache) = cache {
        service.add_cache_path(cache);
    }
    for dir in &cli.symbol_dirs {
        service.add_directory_path(dir.clone());
    }
    for url in &cli.symbol_servers {
        service.add_server(url, 3);
    }

    service
}

/// バッチモード: コマンドを順に実行し、失敗したら終了コード1で止まる
///
/// 戻り値はquit/exitが要求されたかどうか。
fn run_batch(dispatcher: &Dispatcher, session: &mut Session, commands: &[String]) -> bool {
    for line in commands {
        match dispatcher.execute(session, line) {
            DispatchResult::Done(output) => {
                print_output(&output);
                if output.exit {
                    return true;
                }
            }
            DispatchResult::Failed(msg) => {
                eprintln!("Error: {}", msg);
                std::process::exit(1);
            }
        }
    }
    false
}

/// REPLループを実行する
fn run_repl(dispatcher: &Dispatcher, session: &mut Session) -> Result<()> {
    println!("Sumire - Process Snapshot Analyzer");
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let history = home::home_dir().map(|h| h.join(".sumire_history"));
    if let Some(path) = &history {
        // 初回起動では履歴が無い
        let _ = rl.load_history(path);
    }

    loop {
        let readline = rl.readline("(sumire) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match dispatcher.execute(session, line) {
                    DispatchResult::Done(output) => {
                        print_output(&output);
                        if output.exit {
                            break;
                        }
                    }
                    DispatchResult::Failed(msg) => {
                        eprintln!("Error: {}", msg);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        // 履歴の保存失敗でセッションの結果は変えない
        let _ = rl.save_history(path);
    }

    Ok(())
}

fn print_output(output: &CommandOutput) {
    for line in &output.lines {
        println!("{}", line);
    }
}
