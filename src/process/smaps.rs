//! Streaming parser for `/proc/<pid>/smaps`.
//!
//! The listing is a sequence of blocks: one mapping header line of the
//! shape `<start>-<end> <perms> <offset> <major>:<minor> <inode> [name]`
//! followed by `Key: <value> kB` statistic lines. Blocks are not
//! separated by blank lines, so the line that ends one block is the
//! header of the next; the parser keeps exactly one line of lookahead at
//! each block boundary.
//!
//! Per completed block the mapping name is classified (see
//! [`crate::process::classifier`]) and six metrics are accumulated into
//! a [`HeapStats`] pass. Malformed headers skip their whole block while
//! the statistic lines are still consumed so the stream stays aligned.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::{debug, trace};

use crate::process::classifier::{classify_mapping, HeapCategory};
use crate::process::memory::parse_kb_value;
use crate::process::stats::{CategoryStats, HeapStats, MemoryProfile};

/// Statistics of one mapping block, in kB. Transient: built while the
/// block's lines are consumed, converted into [`CategoryStats`] and
/// dropped.
#[derive(Debug, Default)]
struct MappingRecord {
    size: u64,
    rss: u64,
    pss: u64,
    shared_clean: u64,
    shared_dirty: u64,
    private_clean: u64,
    private_dirty: u64,
    referenced: u64,
}

impl MappingRecord {
    /// Records one statistic line. Returns false when the line is not a
    /// recognized `Key: <integer> kB` statistic, so the caller can test
    /// it against the next-header heuristic instead.
    fn scan_line(&mut self, line: &str) -> bool {
        let Some((key, rest)) = line.split_once(':') else {
            return false;
        };
        let Some(kb) = parse_kb_value(rest) else {
            return false;
        };
        match key {
            "Size" => self.size = kb,
            "Rss" => self.rss = kb,
            "Pss" => self.pss = kb,
            "Shared_Clean" => self.shared_clean = kb,
            "Shared_Dirty" => self.shared_dirty = kb,
            "Private_Clean" => self.private_clean = kb,
            "Private_Dirty" => self.private_dirty = kb,
            "Referenced" => self.referenced = kb,
            _ => return false,
        }
        true
    }

    /// Estimated swappable portion of this mapping's pss: shared backing
    /// cost is apportioned by how much of the observed pss is not already
    /// accounted for by private pages. The sharing proportion is a whole
    /// number of shares (integer division), so a mapping whose unshared
    /// pss does not cover the full shared backing contributes only its
    /// private clean pages.
    fn swappable_pss(&self) -> u64 {
        let shared = self.shared_clean + self.shared_dirty;
        let sharing = if shared > 0 {
            self.pss
                .saturating_sub(self.private_clean)
                .saturating_sub(self.private_dirty)
                / shared
        } else {
            0
        };
        sharing * self.shared_clean + self.private_clean
    }

    /// The six aggregated metrics for this block. Swappable-pss applies
    /// only to swappable-typed mappings with a nonzero pss.
    fn metrics(&self, swappable: bool) -> CategoryStats {
        let swappable_pss = if swappable && self.pss > 0 {
            self.swappable_pss()
        } else {
            0
        };
        CategoryStats {
            pss: self.pss,
            swappable_pss,
            private_dirty: self.private_dirty,
            shared_dirty: self.shared_dirty,
            private_clean: self.private_clean,
            shared_clean: self.shared_clean,
        }
    }
}

/// Whitespace-token walker that keeps the untouched remainder available,
/// so the mapping name can retain interior spaces.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a str) -> Self {
        Tokens { rest: line }
    }

    fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let (token, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn remainder(&self) -> &'a str {
        self.rest
    }
}

/// Parses a mapping header line into (start, end, name).
///
/// The fixed prefix is `<hex>-<hex> <perms> <hex offset>
/// <hex major>:<hex minor> <decimal inode>`; the name is whatever
/// follows after skipping leading whitespace, possibly empty. Returns
/// `None` when the prefix does not match, which marks the block as
/// skipped.
fn parse_header(line: &str) -> Option<(u64, u64, &str)> {
    let mut tokens = Tokens::new(line);

    let range = tokens.next()?;
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    tokens.next()?; // permission flags, any token

    let offset = tokens.next()?;
    u64::from_str_radix(offset, 16).ok()?;

    let dev = tokens.next()?;
    let (major, minor) = dev.split_once(':')?;
    u64::from_str_radix(major, 16).ok()?;
    u64::from_str_radix(minor, 16).ok()?;

    let inode = tokens.next()?;
    inode.parse::<u64>().ok()?;

    Some((start, end, tokens.remainder().trim_start()))
}

/// Positional heuristic for a line that opens the next mapping block:
/// longer than 30 bytes, a dash where an 8-hex-digit start address would
/// end, and a space after an 8-hex-digit end address. Example:
/// `10000000-10001000 ---p 10000000 00:00 0`.
fn looks_like_header(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() > 30 && bytes[8] == b'-' && bytes[17] == b' '
}

/// Consumes a full smaps stream, classifying every mapping block and
/// accumulating its metrics into `stats`.
///
/// Parsing irregularities never abort the pass: a malformed header
/// skips its block's contribution entirely while keeping the stream
/// aligned. Only read errors from the underlying source surface here.
pub fn parse_smaps<R: BufRead>(reader: R, stats: &mut HeapStats) -> io::Result<()> {
    let mut lines = reader.lines();
    let mut pending = match lines.next() {
        Some(line) => line?,
        None => return Ok(()),
    };

    let mut prev_end: u64 = 0;
    let mut prev_category = HeapCategory::Unknown;

    loop {
        let header = parse_header(&pending);
        if header.is_none() {
            debug!(line = %pending, "skipping mapping block with malformed header");
        }

        let mut record = MappingRecord::default();
        let mut next_header = None;
        for line in lines.by_ref() {
            let line = line?;
            if !record.scan_line(&line) && looks_like_header(&line) {
                next_header = Some(line);
                break;
            }
        }

        match header {
            Some((start, end, name)) => {
                let c = classify_mapping(name, start, prev_end, prev_category);
                trace!(
                    name,
                    start,
                    end,
                    size_kb = record.size,
                    rss_kb = record.rss,
                    referenced_kb = record.referenced,
                    category = c.category.label(),
                    "classified mapping"
                );
                stats.accumulate(c.category, c.runtime_sub, &record.metrics(c.swappable));
                prev_end = end;
                prev_category = c.category;
            }
            None => {
                // A skipped block breaks the bss adjacency chain but keeps
                // the last valid end address.
                prev_category = HeapCategory::Unknown;
            }
        }

        match next_header {
            Some(line) => pending = line,
            None => return Ok(()),
        }
    }
}

/// Profiles a process by pid from `/proc/<pid>/smaps`.
///
/// An unreadable source is not an error: querying a process whose
/// privileges or lifecycle make the listing unavailable yields a zeroed
/// profile.
pub fn profile_pid(pid: u32) -> MemoryProfile {
    let path = format!("/proc/{pid}/smaps");
    profile_path(Path::new(&path))
}

/// Profiles a process from an already-materialized smaps file.
pub fn profile_path(path: &Path) -> MemoryProfile {
    let mut stats = HeapStats::new();
    match fs::File::open(path) {
        Ok(file) => {
            if let Err(e) = parse_smaps(BufReader::new(file), &mut stats) {
                debug!("read error while parsing {}: {e}", path.display());
            }
        }
        Err(e) => {
            debug!("cannot open {}: {e}", path.display());
        }
    }
    stats.finalize()
}
