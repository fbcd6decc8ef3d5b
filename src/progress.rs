//! Aggregate progress counters.
//!
//! Workers increment these concurrently while a presentation layer reads
//! them; plain atomic counters are enough because no cross-asset ordering is
//! required.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Run-wide counters shared between workers and the presentation layer.
#[derive(Debug, Default)]
pub struct ProgressTotals {
    files: AtomicU64,
    bytes_expected: AtomicU64,
    bytes_done: AtomicU64,
    unknown_sizes: AtomicBool,
}

impl ProgressTotals {
    /// Accounts for one asset entering the run.
    pub fn record_asset(&self, size: Option<u64>) {
        self.files.fetch_add(1, Ordering::Relaxed);
        match size {
            Some(size) => {
                self.bytes_expected.fetch_add(size, Ordering::Relaxed);
            }
            None => self.unknown_sizes.store(true, Ordering::Relaxed),
        }
    }

    /// Accounts for `n` more bytes being present locally.
    pub fn add_done(&self, n: u64) {
        self.bytes_done.fetch_add(n, Ordering::Relaxed);
    }

    /// A consistent-enough snapshot for display purposes.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files: self.files.load(Ordering::Relaxed),
            bytes_expected: self.bytes_expected.load(Ordering::Relaxed),
            bytes_done: self.bytes_done.load(Ordering::Relaxed),
            unknown_sizes: self.unknown_sizes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ProgressTotals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Assets seen so far.
    pub files: u64,
    /// Sum of the known sizes of the assets seen so far.
    pub bytes_expected: u64,
    /// Bytes present locally for the assets processed so far.
    pub bytes_done: u64,
    /// Whether any asset had no declared size.
    pub unknown_sizes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let totals = ProgressTotals::default();
        totals.record_asset(Some(10));
        totals.record_asset(None);
        totals.add_done(4);
        totals.add_done(6);
        let snap = totals.snapshot();
        assert_eq!(snap.files, 2);
        assert_eq!(snap.bytes_expected, 10);
        assert_eq!(snap.bytes_done, 10);
        assert!(snap.unknown_sizes);
    }
}
