//! Mapping classification for grouping memory regions into heap categories.
//!
//! This module assigns every smaps mapping a semantic heap category based
//! on its backing name, using a fixed first-match-wins rule list. Shared
//! objects, archives and compiled code files are additionally marked
//! swappable so the parser can apportion their shared backing cost.

/// Heap categories for classified mappings.
///
/// Declaration order is the exposure order: downstream consumers index
/// the "other" list by position, so variants must not be reordered.
/// The first three categories are the core set exposed individually;
/// everything after them is folded into `Unknown` for summary views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCategory {
    Unknown,
    RuntimeHeap,
    Native,
    RuntimeOther,
    Stack,
    Cursor,
    Ashmem,
    UnknownDev,
    SharedObject,
    Jar,
    Apk,
    Font,
    Dex,
    Oat,
    ArtImage,
    UnknownMap,
}

impl HeapCategory {
    /// All categories, in exposure order.
    pub const ALL: [HeapCategory; 16] = [
        HeapCategory::Unknown,
        HeapCategory::RuntimeHeap,
        HeapCategory::Native,
        HeapCategory::RuntimeOther,
        HeapCategory::Stack,
        HeapCategory::Cursor,
        HeapCategory::Ashmem,
        HeapCategory::UnknownDev,
        HeapCategory::SharedObject,
        HeapCategory::Jar,
        HeapCategory::Apk,
        HeapCategory::Font,
        HeapCategory::Dex,
        HeapCategory::Oat,
        HeapCategory::ArtImage,
        HeapCategory::UnknownMap,
    ];

    /// Number of core categories (`Unknown`, `RuntimeHeap`, `Native`).
    pub const NUM_CORE: usize = 3;

    /// Stable display label, also used as the JSON key for this category.
    pub fn label(self) -> &'static str {
        match self {
            HeapCategory::Unknown => "unknown",
            HeapCategory::RuntimeHeap => "runtime",
            HeapCategory::Native => "native",
            HeapCategory::RuntimeOther => "runtime-other",
            HeapCategory::Stack => "stack",
            HeapCategory::Cursor => "cursor",
            HeapCategory::Ashmem => "ashmem",
            HeapCategory::UnknownDev => "unknown-dev",
            HeapCategory::SharedObject => "so",
            HeapCategory::Jar => "jar",
            HeapCategory::Apk => "apk",
            HeapCategory::Font => "ttf",
            HeapCategory::Dex => "dex",
            HeapCategory::Oat => "oat",
            HeapCategory::ArtImage => "art",
            HeapCategory::UnknownMap => "unknown-map",
        }
    }
}

/// Sub-categories of the managed runtime heaps.
///
/// Declaration order is the exposure order: Normal, Large, LinearAlloc,
/// Accounting, CodeCache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSub {
    Normal,
    Large,
    LinearAlloc,
    Accounting,
    CodeCache,
}

impl RuntimeSub {
    /// All runtime sub-categories, in exposure order.
    pub const ALL: [RuntimeSub; 5] = [
        RuntimeSub::Normal,
        RuntimeSub::Large,
        RuntimeSub::LinearAlloc,
        RuntimeSub::Accounting,
        RuntimeSub::CodeCache,
    ];

    /// Stable display label, also used as the JSON key for this sub-category.
    pub fn label(self) -> &'static str {
        match self {
            RuntimeSub::Normal => "normal",
            RuntimeSub::Large => "large",
            RuntimeSub::LinearAlloc => "linear-alloc",
            RuntimeSub::Accounting => "accounting",
            RuntimeSub::CodeCache => "code-cache",
        }
    }
}

/// Result of classifying one mapping name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: HeapCategory,
    /// Set only when `category` is `RuntimeHeap` or `RuntimeOther`.
    pub runtime_sub: Option<RuntimeSub>,
    /// Swappable mappings participate in the swappable-pss apportioning.
    pub swappable: bool,
}

impl Classification {
    fn plain(category: HeapCategory) -> Self {
        Classification {
            category,
            runtime_sub: None,
            swappable: false,
        }
    }

    fn swappable(category: HeapCategory) -> Self {
        Classification {
            category,
            runtime_sub: None,
            swappable: true,
        }
    }

    fn runtime(category: HeapCategory, sub: RuntimeSub) -> Self {
        Classification {
            category,
            runtime_sub: Some(sub),
            swappable: false,
        }
    }
}

/// Ashmem name prefix of the managed runtime's own regions.
const RUNTIME_ASHMEM_PREFIX: &str = "/dev/ashmem/dalvik-";

/// Runtime ashmem regions that back GC accounting structures rather than
/// object storage. Checked after the LinearAlloc prefix, before the
/// large-object and JIT cache prefixes.
const RUNTIME_ACCOUNTING_PREFIXES: [&str; 11] = [
    "/dev/ashmem/dalvik-mark",
    "/dev/ashmem/dalvik-allocspace alloc space live-bitmap",
    "/dev/ashmem/dalvik-allocspace alloc space mark-bitmap",
    "/dev/ashmem/dalvik-card table",
    "/dev/ashmem/dalvik-allocation stack",
    "/dev/ashmem/dalvik-live stack",
    "/dev/ashmem/dalvik-imagespace",
    "/dev/ashmem/dalvik-bitmap",
    "/dev/ashmem/dalvik-card-table",
    "/dev/ashmem/dalvik-mark-stack",
    "/dev/ashmem/dalvik-aux-structure",
];

/// True when `name` ends with `suffix` and has at least one character
/// before it. A mapping named exactly ".so" does not count as a library.
fn has_suffix(name: &str, suffix: &str) -> bool {
    name.len() > suffix.len() && name.ends_with(suffix)
}

/// Classifies runtime-owned ashmem regions by their name suffix.
fn classify_runtime_region(name: &str) -> Classification {
    if name.starts_with("/dev/ashmem/dalvik-LinearAlloc") {
        Classification::runtime(HeapCategory::RuntimeOther, RuntimeSub::LinearAlloc)
    } else if RUNTIME_ACCOUNTING_PREFIXES
        .iter()
        .any(|p| name.starts_with(p))
    {
        Classification::runtime(HeapCategory::RuntimeOther, RuntimeSub::Accounting)
    } else if name.starts_with("/dev/ashmem/dalvik-large") {
        Classification::runtime(HeapCategory::RuntimeHeap, RuntimeSub::Large)
    } else if name.starts_with("/dev/ashmem/dalvik-jit-code-cache") {
        Classification::runtime(HeapCategory::RuntimeOther, RuntimeSub::CodeCache)
    } else {
        // The regular managed heap segment.
        Classification::runtime(HeapCategory::RuntimeHeap, RuntimeSub::Normal)
    }
}

/// Classifies one mapping name into a heap category.
///
/// Pure and deterministic: the rules are evaluated in a fixed priority
/// order and the first match wins. `start`, `prev_end` and `prev_category`
/// feed the final rule, which folds an unnamed mapping directly adjacent
/// to a shared object (its bss segment) into `SharedObject`.
pub fn classify_mapping(
    name: &str,
    start: u64,
    prev_end: u64,
    prev_category: HeapCategory,
) -> Classification {
    if name.starts_with("[heap]") {
        Classification::plain(HeapCategory::Native)
    } else if name.starts_with("/dev/ashmem") {
        if name.starts_with(RUNTIME_ASHMEM_PREFIX) {
            classify_runtime_region(name)
        } else if name.starts_with("/dev/ashmem/CursorWindow") {
            Classification::plain(HeapCategory::Cursor)
        } else if name.starts_with("/dev/ashmem/libc malloc") {
            Classification::plain(HeapCategory::Native)
        } else {
            Classification::plain(HeapCategory::Ashmem)
        }
    } else if name.starts_with("[anon:libc_malloc]") {
        Classification::plain(HeapCategory::Native)
    } else if name.starts_with("[stack") {
        Classification::plain(HeapCategory::Stack)
    } else if name.starts_with("/dev/") {
        Classification::plain(HeapCategory::UnknownDev)
    } else if has_suffix(name, ".so") {
        Classification::swappable(HeapCategory::SharedObject)
    } else if has_suffix(name, ".jar") {
        Classification::swappable(HeapCategory::Jar)
    } else if has_suffix(name, ".apk") {
        Classification::swappable(HeapCategory::Apk)
    } else if has_suffix(name, ".ttf") {
        Classification::swappable(HeapCategory::Font)
    } else if has_suffix(name, ".dex") || has_suffix(name, ".odex") {
        Classification::swappable(HeapCategory::Dex)
    } else if has_suffix(name, ".oat") {
        Classification::swappable(HeapCategory::Oat)
    } else if has_suffix(name, ".art") {
        Classification::swappable(HeapCategory::ArtImage)
    } else if name.starts_with("[anon:") {
        Classification::plain(HeapCategory::Unknown)
    } else if !name.is_empty() {
        Classification::plain(HeapCategory::UnknownMap)
    } else if start == prev_end && prev_category == HeapCategory::SharedObject {
        // bss section of a shared library.
        Classification::plain(HeapCategory::SharedObject)
    } else {
        Classification::plain(HeapCategory::Unknown)
    }
}
