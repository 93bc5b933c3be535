//! Native allocator leak-record decoding, ordering and report rendering.
//!
//! The allocator instrumentation hands over an opaque buffer of
//! fixed-stride records: a size word, an allocation-count word, and a
//! fixed-length zero-terminated backtrace array. This module decodes
//! that buffer field by field (never aliasing it onto a struct), sorts
//! the records into a deterministic diff-friendly order, and writes a
//! human-readable dump followed by a verbatim copy of the process's
//! mapping listing.

use std::cmp::Ordering;
use std::io::{self, Read, Write};

/// Fixed backtrace capacity the report format was designed around.
pub const BACKTRACE_CAPACITY: usize = 32;

/// High bit of the size word: the allocation was inherited from the
/// forked process template rather than made by this process. Cleared
/// for numeric comparison and size display, shown as its own 0/1 column.
pub const SECONDARY_ORIGIN_FLAG: u64 = 1 << 63;

/// Bytes per record word. Records are little-endian u64 words:
/// `size`, `count`, then `backtrace[capacity]`.
const RECORD_WORD: usize = 8;

/// Record length in bytes for a given backtrace capacity.
pub const fn record_stride(backtrace_capacity: usize) -> usize {
    (2 + backtrace_capacity) * RECORD_WORD
}

/// Errors produced while decoding a leak-record buffer.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record stride {stride} does not fit backtrace capacity {capacity} (expected {expected})")]
    StrideMismatch {
        stride: usize,
        capacity: usize,
        expected: usize,
    },

    #[error("buffer length {len} is not a multiple of record stride {stride}")]
    TruncatedBuffer { len: usize, stride: usize },
}

/// One decoded allocation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Raw size word, secondary-origin flag preserved.
    pub size: u64,
    /// Number of allocations sharing this size and backtrace.
    pub count: u64,
    /// Return addresses, zero-terminated; zero is never a valid address.
    pub backtrace: Vec<u64>,
}

impl AllocationRecord {
    /// Allocation size with the secondary-origin flag cleared.
    pub fn net_size(&self) -> u64 {
        self.size & !SECONDARY_ORIGIN_FLAG
    }

    /// Whether this allocation was inherited from the process template.
    pub fn secondary_origin(&self) -> bool {
        self.size & SECONDARY_ORIGIN_FLAG != 0
    }
}

/// A decoded leak-record buffer plus the allocator's summary figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakInfo {
    /// Total memory the allocator reports as tracked, in bytes.
    pub total_memory: u64,
    /// Backtrace slots per record as reported by the allocator; may
    /// differ from [`BACKTRACE_CAPACITY`], which the report warns about.
    pub backtrace_capacity: usize,
    pub records: Vec<AllocationRecord>,
}

impl LeakInfo {
    /// Decodes a raw record buffer.
    ///
    /// `stride` is the reported record length in bytes and must equal
    /// `(2 + backtrace_capacity) * 8`; the buffer must hold a whole
    /// number of records.
    pub fn decode(
        buf: &[u8],
        stride: usize,
        backtrace_capacity: usize,
        total_memory: u64,
    ) -> Result<Self, DecodeError> {
        let expected = record_stride(backtrace_capacity);
        if stride != expected {
            return Err(DecodeError::StrideMismatch {
                stride,
                capacity: backtrace_capacity,
                expected,
            });
        }
        if buf.len() % stride != 0 {
            return Err(DecodeError::TruncatedBuffer {
                len: buf.len(),
                stride,
            });
        }

        let records = buf
            .chunks_exact(stride)
            .map(|chunk| {
                let mut words = chunk
                    .chunks_exact(RECORD_WORD)
                    .map(|w| u64::from_le_bytes(w.try_into().expect("exact 8-byte chunk")));
                let size = words.next().expect("size word");
                let count = words.next().expect("count word");
                AllocationRecord {
                    size,
                    count,
                    backtrace: words.collect(),
                }
            })
            .collect();

        Ok(LeakInfo {
            total_memory,
            backtrace_capacity,
            records,
        })
    }

    /// Sum of net size times count over all records, in bytes.
    /// Saturates at `u64::MAX` instead of overflowing on hostile size
    /// words, since record buffers arrive from outside the process.
    pub fn net_total(&self) -> u64 {
        self.records.iter().fold(0u64, |acc, r| {
            acc.saturating_add(r.net_size().saturating_mul(r.count))
        })
    }

    /// Sorts the records into the canonical report order. Equal keys
    /// have no defined relative order.
    pub fn sort(&mut self) {
        self.records.sort_unstable_by(compare_records);
    }
}

/// Total order for the report: descending by flag-cleared size, ties
/// broken by ascending lexicographic backtrace comparison that stops at
/// the first zero entry on either side.
pub fn compare_records(a: &AllocationRecord, b: &AllocationRecord) -> Ordering {
    match b.net_size().cmp(&a.net_size()) {
        Ordering::Equal => {}
        unequal => return unequal,
    }

    for (x, y) in a.backtrace.iter().zip(b.backtrace.iter()) {
        if x == y {
            if *x == 0 {
                break;
            }
            continue;
        }
        return x.cmp(y);
    }

    Ordering::Equal
}

/// Guidance written when no leak-record data is available.
const TRACKING_DISABLED_HELP: &str = "\
Native heap dump not available. To enable, run these commands (requires root):
$ adb shell setprop libc.debug.malloc 1
$ adb shell stop
$ adb shell start
";

/// Writes the full heap dump report to `sink`.
///
/// `info` is `None` when allocation tracking is disabled upstream; the
/// report then consists solely of guidance on enabling it. Records are
/// written in the order given — call [`LeakInfo::sort`] first for the
/// canonical order. `maps` supplies the process's mapping listing,
/// copied verbatim after the record section; when it is unavailable the
/// report says so in place of the listing.
///
/// Sink failures are the one hard error here: a caller handing over an
/// unusable destination is a contract violation, not a data problem.
pub fn write_report<W: Write, R: Read>(
    sink: &mut W,
    info: Option<&LeakInfo>,
    maps: Option<R>,
) -> io::Result<()> {
    let Some(info) = info else {
        sink.write_all(TRACKING_DISABLED_HELP.as_bytes())?;
        return Ok(());
    };

    writeln!(sink, "Native Heap Dump v1.0")?;
    writeln!(sink)?;
    writeln!(sink, "Total memory: {}", info.total_memory)?;
    writeln!(sink, "Allocation records: {}", info.records.len())?;
    if info.backtrace_capacity != BACKTRACE_CAPACITY {
        writeln!(
            sink,
            "WARNING: mismatched backtrace sizes ({} vs. {})",
            info.backtrace_capacity, BACKTRACE_CAPACITY
        )?;
    }
    writeln!(sink)?;

    for record in &info.records {
        write!(
            sink,
            "z {}  sz {:8}  num {:4}  bt",
            u8::from(record.secondary_origin()),
            record.net_size(),
            record.count
        )?;
        for addr in &record.backtrace {
            if *addr == 0 {
                break;
            }
            write!(sink, " {addr:08x}")?;
        }
        writeln!(sink)?;
    }

    writeln!(sink, "MAPS")?;
    let Some(mut maps) = maps else {
        writeln!(sink, "Could not open maps listing")?;
        return Ok(());
    };
    io::copy(&mut maps, sink)?;

    writeln!(sink, "END")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(size: u64, count: u64, backtrace: &[u64]) -> AllocationRecord {
        let mut bt = backtrace.to_vec();
        bt.resize(BACKTRACE_CAPACITY, 0);
        AllocationRecord {
            size,
            count,
            backtrace: bt,
        }
    }

    fn encode(records: &[AllocationRecord], capacity: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        for r in records {
            buf.extend_from_slice(&r.size.to_le_bytes());
            buf.extend_from_slice(&r.count.to_le_bytes());
            for i in 0..capacity {
                let addr = r.backtrace.get(i).copied().unwrap_or(0);
                buf.extend_from_slice(&addr.to_le_bytes());
            }
        }
        buf
    }

    fn render(info: Option<&LeakInfo>, maps: Option<&str>) -> String {
        let mut out = Vec::new();
        write_report(&mut out, info, maps.map(str::as_bytes)).expect("write to Vec");
        String::from_utf8(out).expect("report is utf-8")
    }

    // -------------------------------------------------------------------------
    // Tests for decode
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_roundtrip() {
        let records = vec![
            record(100, 2, &[0x1000, 0x2000]),
            record(SECONDARY_ORIGIN_FLAG | 50, 1, &[0x3000]),
        ];
        let buf = encode(&records, BACKTRACE_CAPACITY);
        let stride = record_stride(BACKTRACE_CAPACITY);

        let info = LeakInfo::decode(&buf, stride, BACKTRACE_CAPACITY, 250).expect("decode");
        assert_eq!(info.records, records);
        assert_eq!(info.total_memory, 250);
        assert!(info.records[1].secondary_origin());
        assert_eq!(info.records[1].net_size(), 50);
    }

    #[test]
    fn test_decode_smaller_capacity() {
        let records = vec![record(8, 1, &[0xabc])];
        let buf = encode(&records, 16);

        let info = LeakInfo::decode(&buf, record_stride(16), 16, 8).expect("decode");
        assert_eq!(info.records[0].backtrace.len(), 16);
        assert_eq!(info.records[0].backtrace[0], 0xabc);
    }

    #[test]
    fn test_decode_rejects_stride_mismatch() {
        let buf = vec![0u8; 272];
        let err = LeakInfo::decode(&buf, 272, 16, 0).unwrap_err();
        assert!(matches!(err, DecodeError::StrideMismatch { expected: 144, .. }));
    }

    #[test]
    fn test_decode_rejects_truncated_buffer() {
        let stride = record_stride(BACKTRACE_CAPACITY);
        let buf = vec![0u8; stride + 1];
        let err = LeakInfo::decode(&buf, stride, BACKTRACE_CAPACITY, 0).unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedBuffer { .. }));
    }

    // -------------------------------------------------------------------------
    // Tests for the comparator
    // -------------------------------------------------------------------------

    #[test]
    fn test_larger_sizes_sort_first() {
        let a = record(100, 1, &[5]);
        let b = record(50, 2, &[1]);
        assert_eq!(compare_records(&a, &b), Ordering::Less);
        assert_eq!(compare_records(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_flag_bit_is_ignored_for_size_ordering() {
        // Flagged 50 is numerically huge raw, but compares as 50.
        let flagged = record(SECONDARY_ORIGIN_FLAG | 50, 1, &[1]);
        let plain = record(100, 1, &[1]);
        assert_eq!(compare_records(&plain, &flagged), Ordering::Less);
    }

    #[test]
    fn test_backtrace_breaks_size_ties() {
        let a = record(64, 1, &[1, 2]);
        let b = record(64, 1, &[1, 3]);
        assert_eq!(compare_records(&a, &b), Ordering::Less);
        assert_eq!(compare_records(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_shorter_backtrace_sorts_first_on_tie() {
        let a = record(64, 1, &[1]);
        let b = record(64, 1, &[1, 2]);
        // a's terminating zero compares below b's second address.
        assert_eq!(compare_records(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_net_total_sums_and_saturates() {
        let mut info = LeakInfo {
            total_memory: 0,
            backtrace_capacity: BACKTRACE_CAPACITY,
            records: vec![record(100, 2, &[1]), record(50, 1, &[2])],
        };
        assert_eq!(info.net_total(), 250);

        // A hostile size word must clamp, not panic.
        info.records.push(record(u64::MAX >> 1, 3, &[3]));
        assert_eq!(info.net_total(), u64::MAX);
    }

    #[test]
    fn test_identical_records_compare_equal() {
        let a = record(64, 3, &[1, 2, 3]);
        assert_eq!(compare_records(&a, &a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_sort_orders_whole_buffer() {
        let mut info = LeakInfo {
            total_memory: 0,
            backtrace_capacity: BACKTRACE_CAPACITY,
            records: vec![
                record(50, 2, &[1]),
                record(100, 1, &[5]),
                record(100, 1, &[1, 3]),
                record(100, 1, &[1, 2]),
            ],
        };
        info.sort();
        let keys: Vec<(u64, u64)> = info
            .records
            .iter()
            .map(|r| (r.net_size(), r.backtrace[0]))
            .collect();
        assert_eq!(keys, [(100, 1), (100, 1), (100, 5), (50, 1)]);
        assert_eq!(info.records[0].backtrace[1], 2);
        assert_eq!(info.records[1].backtrace[1], 3);
    }

    // -------------------------------------------------------------------------
    // Tests for the report
    // -------------------------------------------------------------------------

    #[test]
    fn test_report_without_data_prints_guidance() {
        let out = render(None, Some("unused"));
        assert!(out.contains("Native heap dump not available"));
        assert!(!out.contains("Total memory"));
        assert!(!out.contains("MAPS"));
        assert!(!out.contains("END"));
    }

    #[test]
    fn test_report_full_output() {
        let info = LeakInfo {
            total_memory: 4096,
            backtrace_capacity: BACKTRACE_CAPACITY,
            records: vec![
                record(100, 2, &[0x1000, 0x2000]),
                record(SECONDARY_ORIGIN_FLAG | 50, 1, &[0x3000]),
            ],
        };
        let out = render(Some(&info), Some("maps line one\nmaps line two\n"));

        assert!(out.starts_with("Native Heap Dump v1.0\n"));
        assert!(out.contains("Total memory: 4096\n"));
        assert!(out.contains("Allocation records: 2\n"));
        assert!(!out.contains("WARNING"));
        assert!(out.contains("z 0  sz      100  num    2  bt 00001000 00002000\n"));
        assert!(out.contains("z 1  sz       50  num    1  bt 00003000\n"));
        assert!(out.contains("MAPS\nmaps line one\nmaps line two\nEND\n"));
    }

    #[test]
    fn test_report_warns_on_capacity_mismatch() {
        let info = LeakInfo {
            total_memory: 0,
            backtrace_capacity: 16,
            records: vec![],
        };
        let out = render(Some(&info), Some(""));
        assert!(out.contains("WARNING: mismatched backtrace sizes (16 vs. 32)"));
    }

    #[test]
    fn test_report_without_maps_listing() {
        let info = LeakInfo {
            total_memory: 0,
            backtrace_capacity: BACKTRACE_CAPACITY,
            records: vec![],
        };
        let out = render(Some(&info), None);
        assert!(out.contains("MAPS\nCould not open maps listing\n"));
        // The end marker only follows a complete listing.
        assert!(!out.contains("END"));
    }
}
