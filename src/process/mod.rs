//! Per-process memory introspection from /proc.
//!
//! This module provides:
//! - `classifier`: mapping-name to heap-category rules
//! - `smaps`: the streaming classifying parser for /proc/<pid>/smaps
//! - `stats`: per-category accumulation and the finalized profile
//! - `memory`: single-pass whole-process PSS/USS totals
//! - `native_alloc`: allocator arena counters for the current process

pub mod classifier;
pub mod memory;
pub mod native_alloc;
pub mod smaps;
pub mod stats;

// Re-export commonly used types
pub use classifier::{classify_mapping, Classification, HeapCategory, RuntimeSub};
pub use memory::{pss_path, pss_pid, read_pss_uss};
pub use native_alloc::{native_heap_stats, NativeHeapStats};
pub use smaps::{parse_smaps, profile_path, profile_pid};
pub use stats::{CategoryEntry, CategoryStats, HeapStats, MemoryProfile};
