//! heapscope — process memory introspection for Android-style Linux
//! processes.
//!
//! Two independent pipelines answer "where did this process's memory
//! go?" without attaching a profiler:
//!
//! - **Smaps profiling**: stream `/proc/<pid>/smaps`, classify every
//!   mapping into a semantic heap category (native heap, managed runtime
//!   heap, shared objects, dex/oat/art files, ashmem, ...) and aggregate
//!   six per-category metrics including an estimated swappable share of
//!   pss.
//! - **Native heap dump**: decode a raw allocator leak-record buffer,
//!   sort it into a deterministic diff-friendly order, and render a text
//!   report followed by the process's mapping listing.
//!
//! # Usage
//!
//! ```rust
//! use heapscope::process::{parse_smaps, HeapStats};
//!
//! let listing = "\
//! 10000000-10001000 rw-p 00000000 00:00 0     [heap]
//! Pss:                  64 kB
//! Private_Dirty:        64 kB
//! ";
//!
//! let mut stats = HeapStats::new();
//! parse_smaps(listing.as_bytes(), &mut stats).unwrap();
//!
//! let profile = stats.finalize();
//! assert_eq!(profile.native.pss, 64);
//! ```
//!
//! Missing inputs are not failures: an unreadable smaps source yields a
//! zeroed profile, and a heap dump without leak-record data renders
//! guidance on enabling allocation tracking instead of erroring. Only an
//! unusable output sink is surfaced as a hard error.

pub mod heapdump;
pub mod process;

// Re-export main types for convenience
pub use heapdump::{
    compare_records, write_report, AllocationRecord, DecodeError, LeakInfo, BACKTRACE_CAPACITY,
};
pub use process::{
    classify_mapping, native_heap_stats, profile_path, profile_pid, pss_path, pss_pid,
    HeapCategory, HeapStats, MemoryProfile, NativeHeapStats, RuntimeSub,
};
