//! Whole-process PSS/USS totals from a single forward pass over smaps.
//!
//! This is the cheap companion to the full classifying parser: it never
//! looks at mapping headers, only at the `P`-prefixed statistic lines,
//! and produces two numbers for callers that want "how big is this
//! process" without a category breakdown.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::debug;

/// Parses the numeric part of a `Key: <value> kB` statistic line tail.
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// First run of ASCII digits found at or after `offset`, or 0 when there
/// is none. Mirrors a skip-to-digit-then-atoi scan.
fn number_at(line: &str, offset: usize) -> u64 {
    let bytes = line.as_bytes();
    let mut i = offset.min(bytes.len());
    while i < bytes.len() && !bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut value: u64 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add(u64::from(bytes[i] - b'0'));
        i += 1;
    }
    value
}

/// Sums pss and uss (in kB) over every mapping in an smaps stream.
///
/// Lines starting with `Pss:` feed the pss total. Every OTHER line
/// starting with `P` feeds the uss total with the first integer at or
/// after byte 14, not just `Private_Clean:`/`Private_Dirty:`. On
/// kernels that emit `Pss_Dirty:` or `Private_Hugetlb:` those values
/// count toward uss too; callers compare these totals across tools, so
/// keep this prefix test as is.
pub fn read_pss_uss<R: BufRead>(reader: R) -> io::Result<(u64, u64)> {
    let mut pss: u64 = 0;
    let mut uss: u64 = 0;

    for line in reader.lines() {
        let line = line?;
        if !line.starts_with('P') {
            continue;
        }
        if line.starts_with("Pss:") {
            pss += number_at(&line, 4);
        } else {
            uss += number_at(&line, 14);
        }
    }

    Ok((pss, uss))
}

/// Whole-process (pss, uss) in kB for a pid, from `/proc/<pid>/smaps`.
/// An unreadable source yields zeros, never an error.
pub fn pss_pid(pid: u32) -> (u64, u64) {
    let path = format!("/proc/{pid}/smaps");
    pss_path(Path::new(&path))
}

/// Whole-process (pss, uss) from an already-materialized smaps file.
pub fn pss_path(path: &Path) -> (u64, u64) {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("cannot open {}: {e}", path.display());
            return (0, 0);
        }
    };
    match read_pss_uss(BufReader::new(file)) {
        Ok(totals) => totals,
        Err(e) => {
            debug!("read error while scanning {}: {e}", path.display());
            (0, 0)
        }
    }
}
