//! Native allocator arena counters for the current process.
//!
//! Answers the "how big is my own malloc heap" questions without going
//! through /proc: total arena size, bytes handed out, and bytes sitting
//! free in the allocator.

use serde::Serialize;

/// Allocator arena counters, in bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeHeapStats {
    /// Total arena size obtained from the system.
    pub total: u64,
    /// Bytes currently handed out to the application.
    pub allocated: u64,
    /// Bytes held by the allocator but not handed out.
    pub free: u64,
}

/// Snapshot of the current process's allocator counters via `mallinfo`.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn native_heap_stats() -> NativeHeapStats {
    // SAFETY: mallinfo has no preconditions and returns a plain struct
    // by value.
    let info = unsafe { libc::mallinfo() };
    NativeHeapStats {
        total: info.usmblks.max(0) as u64,
        allocated: info.uordblks.max(0) as u64,
        free: info.fordblks.max(0) as u64,
    }
}

/// Fallback for allocators without mallinfo: all counters report zero.
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn native_heap_stats() -> NativeHeapStats {
    NativeHeapStats::default()
}
