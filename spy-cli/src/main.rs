// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line surface over `spy-core`'s public facade, one subcommand
//! per operation plus `top`, mirroring `main.go`'s command set.

mod humanize;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spy_core::duration::format_duration;
use spy_core::var::VarKind;
use spy_core::GoProcess;

#[derive(Debug, Parser)]
#[clap(name = "gospy", about = "Non-invasive introspection for a running Go process")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliVarKind {
    Uint,
    Int,
    Bool,
    Str,
    Ptr,
}

impl From<CliVarKind> for VarKind {
    fn from(k: CliVarKind) -> Self {
        match k {
            CliVarKind::Uint => VarKind::Uint,
            CliVarKind::Int => VarKind::Int,
            CliVarKind::Bool => VarKind::Bool,
            CliVarKind::Str => VarKind::Str,
            CliVarKind::Ptr => VarKind::Ptr,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the target's reported Go version and uptime.
    Runtime {
        #[clap(long)]
        pid: i32,
        #[clap(long)]
        non_blocking: bool,
    },
    /// List live (or all) tasks.
    Tasks {
        #[clap(long)]
        pid: i32,
        #[clap(long)]
        include_dead: bool,
        #[clap(long)]
        json: bool,
        #[clap(long)]
        non_blocking: bool,
    },
    /// Print a best-effort stack trace for one task.
    Stack {
        #[clap(long)]
        pid: i32,
        #[clap(long)]
        task: u64,
        #[clap(long)]
        non_blocking: bool,
    },
    /// List logical processors and their scheduler state.
    Processors {
        #[clap(long)]
        pid: i32,
        #[clap(long)]
        non_blocking: bool,
    },
    /// Print aggregate heap/GC statistics.
    Memstats {
        #[clap(long)]
        pid: i32,
        #[clap(long)]
        non_blocking: bool,
    },
    /// Read one named global of a known kind, e.g. `runtime.buildVersion`.
    Var {
        #[clap(long)]
        pid: i32,
        #[clap(long)]
        name: String,
        #[clap(long, value_enum)]
        kind: CliVarKind,
        #[clap(long, value_enum)]
        pointee_kind: Option<CliVarKind>,
        #[clap(long)]
        non_blocking: bool,
    },
    /// Launch the terminal dashboard.
    Top {
        #[clap(long)]
        pid: i32,
        #[clap(long, default_value_t = 2)]
        refresh: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Runtime { pid, non_blocking } => with_suspend(pid, non_blocking, || cmd_runtime(pid)),
        Command::Tasks {
            pid,
            include_dead,
            json,
            non_blocking,
        } => with_suspend(pid, non_blocking, || cmd_tasks(pid, include_dead, json)),
        Command::Stack {
            pid,
            task,
            non_blocking,
        } => with_suspend(pid, non_blocking, || cmd_stack(pid, task)),
        Command::Processors { pid, non_blocking } => {
            with_suspend(pid, non_blocking, || cmd_processors(pid))
        }
        Command::Memstats { pid, non_blocking } => {
            with_suspend(pid, non_blocking, || cmd_memstats(pid))
        }
        Command::Var {
            pid,
            name,
            kind,
            pointee_kind,
            non_blocking,
        } => with_suspend(pid, non_blocking, || cmd_var(pid, &name, kind, pointee_kind)),
        Command::Top { pid, refresh } => cmd_top(pid, refresh),
    }
}

/// Suspends every OS thread of `pid` via `spy-attach`'s `PTRACE_ATTACH` for
/// the duration of `f`, unless `non_blocking` is set — spec.md's own
/// concurrency model (§5) treats "not paused" as the baseline, so
/// `--non-blocking` opts into that baseline instead of being the default.
fn with_suspend<T>(pid: i32, non_blocking: bool, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if non_blocking {
        return f();
    }
    let tids = spy_attach::list_threads(pid).with_context(|| format!("listing threads of pid {pid}"))?;
    let mut suspended = Vec::with_capacity(tids.len());
    for tid in tids {
        match spy_attach::SuspendedThread::attach(tid) {
            Ok(t) => suspended.push(t),
            Err(e) => log::warn!("could not suspend thread {tid}: {e}"),
        }
    }
    let result = f();
    for mut t in suspended {
        let _ = t.detach();
    }
    result
}

fn attach(pid: i32) -> Result<GoProcess> {
    GoProcess::attach(pid).with_context(|| format!("attaching to pid {pid}"))
}

fn cmd_runtime(pid: i32) -> Result<()> {
    let proc = attach(pid)?;
    let facts = proc.runtime_info().context("reading runtime info")?;
    let uptime = Duration::from_nanos(
        (chrono_like_nanotime() - facts.init_time_ns).max(0) as u64,
    );
    println!("go version: {}", facts.version);
    println!("uptime:     {}", format_duration(uptime));
    Ok(())
}

/// `runtime.nanotime`'s monotonic clock isn't reproducible on the CLI host;
/// this stands in for "now" on the same monotonic clock the target uses,
/// which the original links against directly via `//go:linkname`. Since
/// this binary has no equivalent linkage, uptime here is informational
/// only relative to the target's own init timestamp.
fn chrono_like_nanotime() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

fn cmd_tasks(pid: i32, include_dead: bool, json: bool) -> Result<()> {
    let proc = attach(pid)?;
    let tasks = proc.tasks(include_dead).context("listing tasks")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    for t in tasks {
        let loc = t.cur_func.as_deref().unwrap_or("?");
        let reason = t.wait_reason.as_deref().unwrap_or("");
        println!(
            "{:>8}  {:<12} {:<24} {}",
            t.id, t.status, loc, reason
        );
    }
    Ok(())
}

fn cmd_stack(pid: i32, task: u64) -> Result<()> {
    let proc = attach(pid)?;
    let frames = proc
        .task_stack_trace(task)
        .with_context(|| format!("unwinding task {task}"))?;
    for (i, f) in frames.iter().enumerate() {
        let loc = if f.line > 0 {
            format!("{} ({}:{})", f.func_name, f.file, f.line)
        } else {
            format!("{} (0x{:x})", f.func_name, f.pc)
        };
        let marker = if f.low_confidence { " (low confidence)" } else { "" };
        println!("#{i:<3} {loc}{marker}");
    }
    Ok(())
}

fn cmd_processors(pid: i32) -> Result<()> {
    let proc = attach(pid)?;
    let ps = proc.processors().context("listing processors")?;
    for p in ps {
        println!(
            "P{:<4} {:<10} mcache=0x{:x} schedtick={}",
            p.id, p.status, p.mcache, p.schedtick
        );
    }
    Ok(())
}

fn cmd_memstats(pid: i32) -> Result<()> {
    let proc = attach(pid)?;
    let (stats, err) = proc.mem_stats();
    println!("num_gc:          {}", stats.num_gc);
    println!(
        "pause_total:     {}",
        format_duration(Duration::from_nanos(stats.pause_total_ns))
    );
    println!("last_gc_unix:    {}", stats.last_gc_ns);
    if let Some(e) = err {
        eprintln!("warning: partial read: {e}");
    }
    Ok(())
}

fn cmd_var(pid: i32, name: &str, kind: CliVarKind, pointee_kind: Option<CliVarKind>) -> Result<()> {
    let proc = attach(pid)?;
    let value = proc
        .read_var(name, kind.into(), pointee_kind.map(Into::into))
        .with_context(|| format!("reading var {name}"))?;
    println!("{value:?}");
    Ok(())
}

fn cmd_top(pid: i32, refresh: u64) -> Result<()> {
    spy_tui::run(pid, Duration::from_secs(refresh)).context("running top dashboard")
}
