//! heapscope - version 0.1.0
//!
//! Process memory introspection CLI with tracing logging.
//! This is the entry point that initializes logging and dispatches the
//! smaps-profile and heap-dump subcommands.

mod cli;

use anyhow::Context;
use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, Level};

use cli::{Args, Commands, LogLevel};
use heapscope::heapdump::{record_stride, write_report, LeakInfo};
use heapscope::process::{
    native_heap_stats, profile_path, profile_pid, pss_pid, CategoryStats, MemoryProfile,
};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn main() {
    let args = Args::parse();
    setup_logging(&args);

    if let Err(e) = run(args) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

/// Dispatches the parsed subcommand.
fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Commands::Meminfo { pid, smaps, json } => command_meminfo(pid, smaps, json),
        Commands::Pss { pid } => command_pss(pid),
        Commands::Mallinfo { json } => command_mallinfo(json),
        Commands::Heapdump {
            input,
            output,
            backtrace_capacity,
            total_memory,
            maps,
        } => command_heapdump(input, output, backtrace_capacity, total_memory, maps),
    }
}

/// Profiles one process's smaps listing and prints per-category totals.
fn command_meminfo(pid: Option<u32>, smaps: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let profile = match (smaps, pid) {
        (Some(path), _) => profile_path(&path),
        (None, Some(pid)) => profile_pid(pid),
        (None, None) => anyhow::bail!("either --pid or --smaps is required"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    print_profile(&profile);
    Ok(())
}

fn print_row(name: &str, s: &CategoryStats) {
    println!(
        "{name:>16} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
        s.pss, s.swappable_pss, s.private_dirty, s.shared_dirty, s.private_clean, s.shared_clean
    );
}

/// Renders the finalized profile as a fixed-width table (values in kB).
fn print_profile(profile: &MemoryProfile) {
    println!(
        "{:>16} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "category (kB)", "pss", "sw-pss", "priv-dty", "shrd-dty", "priv-cln", "shrd-cln"
    );
    print_row("native", &profile.native);
    print_row("runtime", &profile.runtime);
    print_row("unknown", &profile.unknown);

    println!();
    println!("other (un-folded):");
    for entry in &profile.other {
        print_row(entry.name, &entry.stats);
    }

    println!();
    println!("runtime sub-heaps:");
    for entry in &profile.runtime_subs {
        print_row(entry.name, &entry.stats);
    }
}

/// Prints whole-process PSS/USS totals from a single smaps pass.
fn command_pss(pid: u32) -> anyhow::Result<()> {
    let (pss, uss) = pss_pid(pid);
    println!("Pss: {pss} kB");
    println!("Uss: {uss} kB");
    Ok(())
}

/// Prints this process's allocator arena counters.
fn command_mallinfo(json: bool) -> anyhow::Result<()> {
    let stats = native_heap_stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Native heap total:     {} bytes", stats.total);
        println!("Native heap allocated: {} bytes", stats.allocated);
        println!("Native heap free:      {} bytes", stats.free);
    }
    Ok(())
}

/// Decodes, sorts and renders a leak-record buffer.
fn command_heapdump(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    backtrace_capacity: usize,
    total_memory: Option<u64>,
    maps: Option<PathBuf>,
) -> anyhow::Result<()> {
    let info = match input {
        None => None,
        Some(path) => {
            let buf = fs::read(&path)
                .with_context(|| format!("reading record buffer {}", path.display()))?;
            let mut info = LeakInfo::decode(
                &buf,
                record_stride(backtrace_capacity),
                backtrace_capacity,
                0,
            )?;
            info.total_memory = total_memory.unwrap_or_else(|| info.net_total());
            info.sort();
            Some(info)
        }
    };

    let maps_path = maps.unwrap_or_else(|| PathBuf::from("/proc/self/maps"));
    let maps_file = fs::File::open(&maps_path).ok();

    match output {
        Some(path) => {
            let mut sink = fs::File::create(&path)
                .with_context(|| format!("creating report file {}", path.display()))?;
            write_report(&mut sink, info.as_ref(), maps_file)?;
            sink.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut sink = stdout.lock();
            write_report(&mut sink, info.as_ref(), maps_file)?;
        }
    }

    Ok(())
}
