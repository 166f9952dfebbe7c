// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The merge pipeline only ever talks to these two traits:
//
//   RecordSource  → anything that yields aligned IQ records
//                   (an HDF5 file, one .npz recording, a store)
//   RecordSink    → anything that accepts them in order
//                   (the growable HDF5 store)
//
// The application layer streams chunks from a source, remaps
// labels, optionally normalizes, and appends to a sink. It never
// sees HDF5 or NumPy types.

use std::ops::Range;

use anyhow::Result;

use crate::domain::record::RecordBatch;

// ─── RecordSource ─────────────────────────────────────────────────────────────
pub trait RecordSource {
    /// Human-readable origin, used in logs and the manifest.
    fn name(&self) -> &str;

    /// Number of records available.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples per record (L).
    fn record_len(&self) -> usize;

    /// Number of classes the label array can express, when the source
    /// knows it (one-hot width, or a stored class count).
    fn label_width(&self) -> Option<usize>;

    /// Read records `range`. Labels come back as indices into the
    /// source's own taxonomy.
    fn read(&self, range: Range<usize>) -> Result<RecordBatch>;
}

// ─── RecordSink ───────────────────────────────────────────────────────────────
pub trait RecordSink {
    /// Append every record of `batch` after the current end.
    fn append(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Records written so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Yields `0..len` in consecutive ranges of at most `chunk` records.
pub fn chunk_ranges(len: usize, chunk: usize) -> impl Iterator<Item = Range<usize>> {
    let chunk = chunk.max(1);
    (0..len)
        .step_by(chunk)
        .map(move |start| start..(start + chunk).min(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges_cover_everything() {
        let r: Vec<_> = chunk_ranges(10, 4).collect();
        assert_eq!(r, vec![0..4, 4..8, 8..10]);
        assert_eq!(chunk_ranges(0, 4).count(), 0);
        // zero chunk size is treated as one
        assert_eq!(chunk_ranges(3, 0).count(), 3);
    }
}
