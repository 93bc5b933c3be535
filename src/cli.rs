//! CLI arguments and subcommands for heapscope.
//!
//! This module defines the command-line interface structure using the
//! clap library, including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "heapscope",
    about = "Per-process heap category totals from smaps and native heap dump formatting",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

/// Subcommands for the introspection pipelines
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify /proc/<pid>/smaps and print per-category heap totals
    Meminfo {
        /// Process to profile; not needed with --smaps
        #[arg(long, required_unless_present = "smaps")]
        pid: Option<u32>,

        /// Read this smaps file instead of /proc/<pid>/smaps
        #[arg(long)]
        smaps: Option<PathBuf>,

        /// Emit the profile as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print whole-process PSS and USS totals (single-pass smaps scan)
    Pss {
        /// Process to scan
        #[arg(long)]
        pid: u32,
    },

    /// Print this process's native allocator arena counters
    Mallinfo {
        /// Emit the counters as JSON
        #[arg(long)]
        json: bool,
    },

    /// Format a raw allocator leak-record buffer into a heap dump report
    Heapdump {
        /// Raw record buffer file; omit when allocation tracking is disabled
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output file (defaults to stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Backtrace slots per record as reported by the allocator
        #[arg(long, default_value_t = 32)]
        backtrace_capacity: usize,

        /// Total tracked memory in bytes (defaults to the sum over records)
        #[arg(long)]
        total_memory: Option<u64>,

        /// Mapping listing to append (defaults to /proc/self/maps)
        #[arg(long)]
        maps: Option<PathBuf>,
    },
}
