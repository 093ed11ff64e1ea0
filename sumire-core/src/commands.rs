//! 組み込みコマンド
//!
//! すべてのコマンドは `fn(&mut Session, &[String]) -> Result<CommandOutput>`
//! の形を持つ。ターゲットを前提とするコマンドは `CurrentTarget` 能力を
//! 要求として宣言し、ディスパッチャが実行前に存在を確認する。

use crate::context::Capability;
use crate::dispatch::{CommandOutput, CommandSpec, Dispatcher};
use crate::parse::parse_address;
use crate::session::{CurrentTarget, Session};
use crate::Result;
use sumire_runtime::Runtime;

/// 組み込みコマンドをすべて登録する
pub fn register_builtins(dispatcher: &mut Dispatcher) -> Result<()> {
    let target_cap = || vec![Capability::of::<CurrentTarget>("target")];

    let specs = vec![
        CommandSpec {
            name: "help",
            aliases: &["h"],
            summary: "show available commands",
            required: vec![],
            run: cmd_help,
        },
        CommandSpec {
            name: "quit",
            aliases: &["exit", "q"],
            summary: "end the session",
            required: vec![],
            run: cmd_quit,
        },
        CommandSpec {
            name: "open",
            aliases: &[],
            summary: "open a dump file as a new target",
            required: vec![],
            run: cmd_open,
        },
        CommandSpec {
            name: "close",
            aliases: &[],
            summary: "close a target (current if no id given)",
            required: vec![],
            run: cmd_close,
        },
        CommandSpec {
            name: "targets",
            aliases: &[],
            summary: "list open targets",
            required: vec![],
            run: cmd_targets,
        },
        CommandSpec {
            name: "target",
            aliases: &[],
            summary: "switch the current target",
            required: vec![],
            run: cmd_target,
        },
        CommandSpec {
            name: "modules",
            aliases: &["lm"],
            summary: "list modules of the current target",
            required: target_cap(),
            run: cmd_modules,
        },
        CommandSpec {
            name: "threads",
            aliases: &[],
            summary: "list threads of the current target",
            required: target_cap(),
            run: cmd_threads,
        },
        CommandSpec {
            name: "thread",
            aliases: &["t"],
            summary: "select a thread by id",
            required: target_cap(),
            run: cmd_thread,
        },
        CommandSpec {
            name: "runtimes",
            aliases: &[],
            summary: "list detected runtimes",
            required: target_cap(),
            run: cmd_runtimes,
        },
        CommandSpec {
            name: "runtime",
            aliases: &[],
            summary: "select a runtime by index",
            required: target_cap(),
            run: cmd_runtime,
        },
        CommandSpec {
            name: "dumpheap",
            aliases: &["heap"],
            summary: "walk the managed heap of the selected runtime",
            required: target_cap(),
            run: cmd_dumpheap,
        },
        CommandSpec {
            name: "dumpobj",
            aliases: &["do"],
            summary: "inspect the object at an address",
            required: target_cap(),
            run: cmd_dumpobj,
        },
        CommandSpec {
            name: "backtrace",
            aliases: &["bt"],
            summary: "show the stack trace of the selected thread",
            required: target_cap(),
            run: cmd_backtrace,
        },
        CommandSpec {
            name: "symbolpath",
            aliases: &["sympath"],
            summary: "show or extend symbol search locations",
            required: vec![],
            run: cmd_symbolpath,
        },
    ];

    for spec in specs {
        dispatcher.register(spec)?;
    }
    Ok(())
}

fn cmd_help(_session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    let lines = vec![
        "Commands:".to_string(),
        "  help                     show available commands".to_string(),
        "  quit | exit              end the session".to_string(),
        "  open <path>              open a dump file as a new target".to_string(),
        "  close [id]               close a target (current if no id given)".to_string(),
        "  targets                  list open targets".to_string(),
        "  target <id>              switch the current target".to_string(),
        "  modules | lm             list modules of the current target".to_string(),
        "  threads                  list threads of the current target".to_string(),
        "  thread <tid>             select a thread by id".to_string(),
        "  runtimes                 list detected runtimes".to_string(),
        "  runtime <index>          select a runtime by index".to_string(),
        "  dumpheap | heap          walk the managed heap of the selected runtime".to_string(),
        "  dumpobj <addr>           inspect the object at an address".to_string(),
        "  backtrace | bt           show the stack trace of the selected thread".to_string(),
        "  symbolpath [...]         show or extend symbol search locations".to_string(),
        String::new(),
        "Command names match case-insensitively; unique prefixes are accepted.".to_string(),
    ];
    Ok(CommandOutput::lines(lines))
}

fn cmd_quit(_session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    Ok(CommandOutput::exit())
}

fn cmd_open(session: &mut Session, args: &[String]) -> Result<CommandOutput> {
    let path = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("usage: open <path>"))?;
    let id = session.open(path)?;
    let entry = session.current()?;
    Ok(CommandOutput::line(format!(
        "target {}: {} ({}, {} modules, {} threads)",
        id,
        entry.target.path().display(),
        entry.target.arch(),
        entry.target.modules().len(),
        entry.target.threads().len(),
    )))
}

fn cmd_close(session: &mut Session, args: &[String]) -> Result<CommandOutput> {
    let id = match args.first() {
        Some(arg) => arg
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid target id '{}'", arg))?,
        None => session.current_id()?,
    };
    session.close(id);
    Ok(CommandOutput::line(format!("target {} closed", id)))
}

fn cmd_targets(session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    let current = session.context().current_target();
    let ids = session.target_ids();
    if ids.is_empty() {
        return Ok(CommandOutput::line("no open targets"));
    }
    let lines = ids
        .into_iter()
        .filter_map(|id| session.target(id).map(|entry| (id, entry)))
        .map(|(id, entry)| {
            let marker = if current == Some(id) { "*" } else { " " };
            format!(
                "{} {}  {} ({})",
                marker,
                id,
                entry.target.path().display(),
                entry.target.arch(),
            )
        })
        .collect();
    Ok(CommandOutput::lines(lines))
}

fn cmd_target(session: &mut Session, args: &[String]) -> Result<CommandOutput> {
    let arg = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("usage: target <id>"))?;
    let id = arg
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid target id '{}'", arg))?;
    if session.target(id).is_none() {
        return Err(anyhow::anyhow!("no open target with id {}", id));
    }
    session.set_current(Some(id));
    Ok(CommandOutput::line(format!("current target is now {}", id)))
}

fn cmd_modules(session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    let entry = session.current()?;
    let lines = entry
        .target
        .modules()
        .iter()
        .map(|m| {
            format!(
                "0x{:016x}  {:>10}  {:<12}  {}  {}",
                m.base,
                m.size,
                m.version,
                m.build_id_hex(),
                m.path,
            )
        })
        .collect();
    Ok(CommandOutput::lines(lines))
}

fn cmd_threads(session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    let selected = session.context().current_thread();
    let entry = session.current()?;
    let lines = entry
        .target
        .threads()
        .iter()
        .map(|t| {
            let marker = if selected == Some(t.tid) { "*" } else { " " };
            format!(
                "{} {:>6}  pc=0x{:016x}  sp=0x{:016x}  fp=0x{:016x}",
                marker, t.tid, t.pc, t.sp, t.fp
            )
        })
        .collect();
    Ok(CommandOutput::lines(lines))
}

fn cmd_thread(session: &mut Session, args: &[String]) -> Result<CommandOutput> {
    let arg = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("usage: thread <tid>"))?;
    let tid = arg
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid thread id '{}'", arg))?;
    session.select_thread(tid)?;
    Ok(CommandOutput::line(format!("thread {} selected", tid)))
}

fn cmd_runtimes(session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    let selected = session.context().current_runtime();
    let runtimes = session.runtimes()?;
    if runtimes.is_empty() {
        return Ok(CommandOutput::line("no managed runtimes detected"));
    }
    let lines = runtimes
        .iter()
        .enumerate()
        .map(|(i, rt)| {
            let marker = if selected == Some(i) { "*" } else { " " };
            format!(
                "{} {}  {} v{} at 0x{:016x}",
                marker,
                i,
                rt.module().name(),
                rt.version(),
                rt.base(),
            )
        })
        .collect();
    Ok(CommandOutput::lines(lines))
}

fn cmd_runtime(session: &mut Session, args: &[String]) -> Result<CommandOutput> {
    let arg = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("usage: runtime <index>"))?;
    let index = arg
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid runtime index '{}'", arg))?;
    session.select_runtime(index)?;
    Ok(CommandOutput::line(format!("runtime {} selected", index)))
}

/// 選択中ランタイム（未選択なら最初に検出されたもの）を取得する
fn pick_runtime(session: &mut Session) -> Result<Runtime> {
    let index = session.context().current_runtime().unwrap_or(0);
    let runtimes = session.runtimes()?;
    runtimes
        .get(index)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no managed runtime detected in current target"))
}

fn cmd_dumpheap(session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    let runtime = pick_runtime(session)?;
    let entry = session.current()?;

    let mut lines = Vec::new();
    let mut count: u64 = 0;
    let mut total_bytes: u64 = 0;
    for obj in entry.inspector.walk_heap(&entry.target, &runtime)? {
        let obj = obj?;
        let type_name = entry
            .inspector
            .resolve_type(&entry.target, &runtime, obj.type_handle)
            .map(|desc| desc.name.clone())
            .unwrap_or_else(|_| "<unresolved>".to_string());
        lines.push(format!(
            "0x{:016x}  {:>10}  {}",
            obj.addr, obj.size, type_name
        ));
        count += 1;
        total_bytes += obj.size;
    }
    lines.push(format!("{} objects, {} bytes", count, total_bytes));
    Ok(CommandOutput::lines(lines))
}

fn cmd_dumpobj(session: &mut Session, args: &[String]) -> Result<CommandOutput> {
    let arg = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("usage: dumpobj <addr>"))?;
    let addr = parse_address(arg)?;
    let runtime = pick_runtime(session)?;
    let entry = session.current()?;

    let space = entry.target.reader()?;
    let header = runtime.layout().read_header(space.as_ref(), addr)?;
    if header.is_free() {
        return Ok(CommandOutput::line(format!(
            "0x{:016x} is a free region of {} bytes",
            addr, header.size
        )));
    }

    let mut lines = vec![
        format!("address:       0x{:016x}", addr),
        format!("size:          {} bytes", header.size),
        format!("type handle:   0x{:016x}", header.type_handle),
    ];
    match entry
        .inspector
        .resolve_type(&entry.target, &runtime, header.type_handle)
    {
        Ok(desc) => {
            lines.push(format!("type:          {}", desc.name));
            lines.push(format!("instance size: {} bytes", desc.instance_size));
        }
        Err(e) => lines.push(format!("type:          <unresolved: {:#}>", e)),
    }
    Ok(CommandOutput::lines(lines))
}

fn cmd_backtrace(session: &mut Session, _args: &[String]) -> Result<CommandOutput> {
    let selected = session.context().current_thread();
    let entry = session.current()?;
    let tid = match selected {
        Some(tid) => tid,
        None => entry
            .target
            .threads()
            .first()
            .map(|t| t.tid)
            .ok_or_else(|| anyhow::anyhow!("target has no threads"))?,
    };

    let frames = entry.inspector.stack_trace(&entry.target, tid)?;
    let mut lines = vec![format!("thread {}:", tid)];
    for (i, frame) in frames.iter().enumerate() {
        let location = match (&frame.module, &frame.method) {
            (Some(module), Some(method)) => format!("  {}!{}", module, method),
            (Some(module), None) => format!("  {}", module),
            _ => String::new(),
        };
        lines.push(format!("#{:<3} 0x{:016x}{}", i, frame.pc, location));
    }
    Ok(CommandOutput::lines(lines))
}

fn cmd_symbolpath(session: &mut Session, args: &[String]) -> Result<CommandOutput> {
    let symbols = session.symbols();
    match args.first().map(String::as_str) {
        None => {
            let mut lines = symbols.describe_locations();
            if lines.is_empty() {
                lines.push("no symbol locations configured".to_string());
            }
            Ok(CommandOutput::lines(lines))
        }
        Some("server") => {
            let url = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: symbolpath server <url> [retries]"))?;
            let retries = match args.get(2) {
                Some(n) => n
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid retry count '{}'", n))?,
                None => 3,
            };
            symbols.add_server(url, retries);
            Ok(CommandOutput::line(format!("server added: {}", url)))
        }
        Some("cache") => {
            let dir = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: symbolpath cache <dir>"))?;
            symbols.add_cache_path(dir.as_str());
            Ok(CommandOutput::line(format!("cache added: {}", dir)))
        }
        Some("dir") => {
            let dir = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: symbolpath dir <dir>"))?;
            symbols.add_directory_path(dir.as_str());
            Ok(CommandOutput::line(format!("directory added: {}", dir)))
        }
        Some(other) => Err(anyhow::anyhow!(
            "unknown symbolpath subcommand '{}' (expected server, cache, or dir)",
            other
        )),
    }
}
