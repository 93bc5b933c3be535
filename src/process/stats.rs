//! Per-category heap statistics accumulation.
//!
//! This module holds the running six-field totals the smaps parser feeds,
//! and finalizes them into a `MemoryProfile`: the three core categories
//! exposed individually (with every non-core category folded into
//! `Unknown`), the remaining categories as an ordered list, and the five
//! managed-runtime sub-category totals.

use serde::Serialize;

use crate::process::classifier::{HeapCategory, RuntimeSub};

/// Six running sums for one heap category, all in kB.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub pss: u64,
    pub swappable_pss: u64,
    pub private_dirty: u64,
    pub shared_dirty: u64,
    pub private_clean: u64,
    pub shared_clean: u64,
}

impl CategoryStats {
    /// Adds another set of totals into this one.
    pub fn add(&mut self, other: &CategoryStats) {
        self.pss += other.pss;
        self.swappable_pss += other.swappable_pss;
        self.private_dirty += other.private_dirty;
        self.shared_dirty += other.shared_dirty;
        self.private_clean += other.private_clean;
        self.shared_clean += other.shared_clean;
    }
}

/// Running totals for one collection pass.
///
/// One pass owns its `HeapStats` exclusively; totals only grow while the
/// parser runs and are read once through [`HeapStats::finalize`].
#[derive(Debug, Default)]
pub struct HeapStats {
    categories: [CategoryStats; HeapCategory::ALL.len()],
    runtime_subs: [CategoryStats; RuntimeSub::ALL.len()],
}

impl HeapStats {
    pub fn new() -> Self {
        HeapStats::default()
    }

    /// Adds one mapping's metrics under its category and, when given,
    /// its runtime sub-category. The parser passes a sub-category only
    /// for `RuntimeHeap` and `RuntimeOther` mappings.
    pub fn accumulate(
        &mut self,
        category: HeapCategory,
        sub: Option<RuntimeSub>,
        metrics: &CategoryStats,
    ) {
        self.categories[category as usize].add(metrics);
        if let Some(sub) = sub {
            self.runtime_subs[sub as usize].add(metrics);
        }
    }

    /// Totals recorded so far for one category. Used by tests and the
    /// finalize step; not meant to be polled mid-pass.
    pub fn category(&self, category: HeapCategory) -> &CategoryStats {
        &self.categories[category as usize]
    }

    /// Totals recorded so far for one runtime sub-category.
    pub fn runtime_sub(&self, sub: RuntimeSub) -> &CategoryStats {
        &self.runtime_subs[sub as usize]
    }

    /// Consumes the pass and produces the finalized profile.
    ///
    /// Every non-core category is folded additively into `Unknown`, so
    /// the three core entries alone account for the whole process in a
    /// summary view. The `other` list keeps the un-folded per-category
    /// values in declaration order.
    pub fn finalize(self) -> MemoryProfile {
        let mut unknown = self.categories[HeapCategory::Unknown as usize];
        for category in &HeapCategory::ALL[HeapCategory::NUM_CORE..] {
            unknown.add(&self.categories[*category as usize]);
        }

        let other = HeapCategory::ALL[HeapCategory::NUM_CORE..]
            .iter()
            .map(|c| CategoryEntry {
                name: c.label(),
                stats: self.categories[*c as usize],
            })
            .collect();

        let runtime_subs = RuntimeSub::ALL
            .iter()
            .map(|s| CategoryEntry {
                name: s.label(),
                stats: self.runtime_subs[*s as usize],
            })
            .collect();

        MemoryProfile {
            unknown,
            runtime: self.categories[HeapCategory::RuntimeHeap as usize],
            native: self.categories[HeapCategory::Native as usize],
            other,
            runtime_subs,
        }
    }
}

/// One named entry in the finalized profile's ordered lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryEntry {
    pub name: &'static str,
    #[serde(flatten)]
    pub stats: CategoryStats,
}

/// Finalized per-category totals for one process, in kB.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryProfile {
    /// Unclassified memory, with every non-core category folded in.
    pub unknown: CategoryStats,
    /// The managed runtime heap.
    pub runtime: CategoryStats,
    /// The native allocator heap.
    pub native: CategoryStats,
    /// Non-core categories in declaration order, un-folded.
    pub other: Vec<CategoryEntry>,
    /// Runtime sub-categories: normal, large, linear-alloc, accounting,
    /// code-cache.
    pub runtime_subs: Vec<CategoryEntry>,
}

impl MemoryProfile {
    /// Total pss across the whole process, from the summary view.
    pub fn total_pss(&self) -> u64 {
        self.unknown.pss + self.runtime.pss + self.native.pss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pss: u64) -> CategoryStats {
        CategoryStats {
            pss,
            swappable_pss: pss / 2,
            private_dirty: 1,
            shared_dirty: 2,
            private_clean: 3,
            shared_clean: 4,
        }
    }

    #[test]
    fn test_accumulate_core_category() {
        let mut stats = HeapStats::new();
        stats.accumulate(HeapCategory::Native, None, &metrics(10));
        stats.accumulate(HeapCategory::Native, None, &metrics(5));

        let native = stats.category(HeapCategory::Native);
        assert_eq!(native.pss, 15);
        assert_eq!(native.private_dirty, 2);
        assert_eq!(native.shared_clean, 8);
    }

    #[test]
    fn test_accumulate_with_runtime_sub() {
        let mut stats = HeapStats::new();
        stats.accumulate(
            HeapCategory::RuntimeHeap,
            Some(RuntimeSub::Large),
            &metrics(20),
        );

        assert_eq!(stats.category(HeapCategory::RuntimeHeap).pss, 20);
        assert_eq!(stats.runtime_sub(RuntimeSub::Large).pss, 20);
        assert_eq!(stats.runtime_sub(RuntimeSub::Normal).pss, 0);
    }

    #[test]
    fn test_finalize_folds_other_into_unknown() {
        let mut stats = HeapStats::new();
        stats.accumulate(HeapCategory::Unknown, None, &metrics(1));
        stats.accumulate(HeapCategory::SharedObject, None, &metrics(10));
        stats.accumulate(HeapCategory::Stack, None, &metrics(100));

        let profile = stats.finalize();
        assert_eq!(profile.unknown.pss, 111);

        // The other list keeps the un-folded values.
        let so = profile
            .other
            .iter()
            .find(|e| e.name == "so")
            .expect("so entry");
        assert_eq!(so.stats.pss, 10);
    }

    #[test]
    fn test_finalize_order_is_stable() {
        let profile = HeapStats::new().finalize();
        let names: Vec<&str> = profile.other.iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            [
                "runtime-other",
                "stack",
                "cursor",
                "ashmem",
                "unknown-dev",
                "so",
                "jar",
                "apk",
                "ttf",
                "dex",
                "oat",
                "art",
                "unknown-map",
            ]
        );

        let subs: Vec<&str> = profile.runtime_subs.iter().map(|e| e.name).collect();
        assert_eq!(
            subs,
            ["normal", "large", "linear-alloc", "accounting", "code-cache"]
        );
    }

    #[test]
    fn test_json_keeps_category_order() {
        let profile = HeapStats::new().finalize();
        let value = serde_json::to_value(&profile).expect("profile serializes");

        let names: Vec<&str> = value["other"]
            .as_array()
            .expect("other is an array")
            .iter()
            .map(|e| e["name"].as_str().expect("name field"))
            .collect();
        assert_eq!(names.first(), Some(&"runtime-other"));
        assert_eq!(names.last(), Some(&"unknown-map"));

        // Flattened stats sit beside the name, not nested under it.
        assert!(value["other"][0]["pss"].is_u64());
    }

    #[test]
    fn test_total_pss_matches_summary_view() {
        let mut stats = HeapStats::new();
        stats.accumulate(HeapCategory::Native, None, &metrics(7));
        stats.accumulate(HeapCategory::Jar, None, &metrics(3));

        let profile = stats.finalize();
        assert_eq!(profile.total_pss(), 10);
    }
}
