// ============================================================
// Layer 4 — IQ Segmenter
// ============================================================
// Re-slices long IQ records into shorter ones so a model that
// expects L = 256 can train on recordings captured at L = 1024.
//
// Each record of length L yields
//
//   count = (L - segment_len) / stride + 1      (0 if L < segment_len)
//
// segments, every one inheriting the parent's label and SNR.
// With stride == segment_len the segments do not overlap; any
// samples left after the last full segment are dropped.
//
// Example with L = 10, segment_len = 4:
//   stride 4:  [0..4] [4..8]              (8..10 cut off)
//   stride 3:  [0..4] [3..7] [6..10]
//
// Reference: O'Shea, Roy & Clancy (2018), "Over-the-Air Deep
//            Learning Based Radio Signal Classification"

use anyhow::{ensure, Result};
use ndarray::{s, Array3};

use crate::domain::record::RecordBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    segment_len: usize,
    stride: usize,
}

impl Segmenter {
    /// # Arguments
    /// * `segment_len` - Samples per output record
    /// * `stride`      - Offset between segment starts; equal to
    ///                   `segment_len` for no overlap
    pub fn new(segment_len: usize, stride: usize) -> Result<Self> {
        ensure!(segment_len > 0, "segment length must be positive");
        ensure!(stride > 0, "stride must be positive");
        Ok(Self { segment_len, stride })
    }

    /// Back-to-back segments with no overlap.
    pub fn non_overlapping(segment_len: usize) -> Result<Self> {
        Self::new(segment_len, segment_len)
    }

    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    /// Segments produced from one record of `record_len` samples.
    pub fn count(&self, record_len: usize) -> usize {
        if record_len < self.segment_len {
            return 0;
        }
        (record_len - self.segment_len) / self.stride + 1
    }

    /// Split every record of `batch`; segments of record r come before
    /// those of record r + 1.
    pub fn split(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let record_len = batch.record_len();
        let per_record = self.count(record_len);
        ensure!(
            per_record > 0,
            "records of length {record_len} are shorter than segment length {}",
            self.segment_len
        );

        let n = batch.len();
        let mut iq = Array3::<f32>::zeros((n * per_record, self.segment_len, 2));
        let mut labels = Vec::with_capacity(n * per_record);
        let mut snrs = Vec::with_capacity(n * per_record);

        for r in 0..n {
            for k in 0..per_record {
                let start = k * self.stride;
                iq.slice_mut(s![r * per_record + k, .., ..]).assign(
                    &batch.iq().slice(s![r, start..start + self.segment_len, ..]),
                );
                labels.push(batch.labels()[r]);
                snrs.push(batch.snrs()[r]);
            }
        }

        Ok(RecordBatch::new(iq, labels, snrs)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, len: usize) -> RecordBatch {
        let iq = Array3::from_shape_fn((n, len, 2), |(r, s, c)| (r * 1000 + s * 10 + c) as f32);
        RecordBatch::new(iq, (0..n).collect(), (0..n).map(|i| i as i8 * 5).collect()).unwrap()
    }

    #[test]
    fn test_counts() {
        let seg = Segmenter::non_overlapping(256).unwrap();
        assert_eq!(seg.count(1024), 4);
        assert_eq!(seg.count(1000), 3);
        assert_eq!(seg.count(255), 0);

        let overlapping = Segmenter::new(4, 3).unwrap();
        assert_eq!(overlapping.count(10), 3);
    }

    #[test]
    fn test_split_replicates_labels_and_snrs() {
        let seg = Segmenter::non_overlapping(4).unwrap();
        let out = seg.split(&ramp(2, 10)).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out.record_len(), 4);
        assert_eq!(out.labels(), &[0, 0, 1, 1]);
        assert_eq!(out.snrs(), &[0, 0, 5, 5]);
        // second segment of record 1 starts at sample 4
        assert_eq!(out.iq()[[3, 0, 0]], 1040.0);
        assert_eq!(out.iq()[[3, 3, 1]], 1071.0);
    }

    #[test]
    fn test_overlapping_windows() {
        let seg = Segmenter::new(4, 3).unwrap();
        let out = seg.split(&ramp(1, 10)).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.iq()[[1, 0, 0]], 30.0);
        assert_eq!(out.iq()[[2, 3, 0]], 90.0);
    }

    #[test]
    fn test_record_shorter_than_segment_is_error() {
        let seg = Segmenter::non_overlapping(16).unwrap();
        assert!(seg.split(&ramp(1, 8)).is_err());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(Segmenter::new(0, 1).is_err());
        assert!(Segmenter::new(4, 0).is_err());
    }
}
