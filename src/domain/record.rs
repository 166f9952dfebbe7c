// ============================================================
// Layer 3 — IQ Records
// ============================================================
// A RecordBatch is a contiguous run of records held in memory,
// mirroring the three on-disk arrays:
//
//   iq      [n, L, 2]   f32   (I, Q) columns per sample
//   labels  [n]         class index in the batch's taxonomy
//   snrs    [n]         dB
//
// Row i of each field always describes the same recording.
// The constructor refuses anything else, so every batch that
// reaches a sink is already aligned.

use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::taxonomy::{LabelError, LabelMap};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("misaligned batch: {iq} iq records, {labels} labels, {snrs} snrs")]
    Misaligned { iq: usize, labels: usize, snrs: usize },

    #[error("iq records must have 2 columns (I, Q), got {0}")]
    NotIq(usize),

    #[error(transparent)]
    Label(#[from] LabelError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    iq: Array3<f32>,
    labels: Vec<usize>,
    snrs: Vec<i8>,
}

impl RecordBatch {
    pub fn new(iq: Array3<f32>, labels: Vec<usize>, snrs: Vec<i8>) -> Result<Self, BatchError> {
        let n = iq.len_of(Axis(0));
        if n != labels.len() || n != snrs.len() {
            return Err(BatchError::Misaligned {
                iq: n,
                labels: labels.len(),
                snrs: snrs.len(),
            });
        }
        if iq.len_of(Axis(2)) != 2 {
            return Err(BatchError::NotIq(iq.len_of(Axis(2))));
        }
        Ok(Self { iq, labels, snrs })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Samples per record (L).
    pub fn record_len(&self) -> usize {
        self.iq.len_of(Axis(1))
    }

    pub fn iq(&self) -> &Array3<f32> {
        &self.iq
    }

    pub fn iq_mut(&mut self) -> &mut Array3<f32> {
        &mut self.iq
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn snrs(&self) -> &[i8] {
        &self.snrs
    }

    /// Contiguous rows `range`. Panics if the range is out of bounds,
    /// like slice indexing.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            iq: self.iq.slice(s![range.clone(), .., ..]).to_owned(),
            labels: self.labels[range.clone()].to_vec(),
            snrs: self.snrs[range].to_vec(),
        }
    }

    /// Rows at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            iq: self.iq.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            snrs: indices.iter().map(|&i| self.snrs[i]).collect(),
        }
    }

    /// Rewrite labels through `map`, dropping rows it does not keep.
    /// Returns the remapped batch and the number of rows dropped.
    pub fn retain_labels(&self, map: &LabelMap) -> Result<(Self, usize), BatchError> {
        let mut keep = Vec::with_capacity(self.len());
        let mut labels = Vec::with_capacity(self.len());
        for (row, &label) in self.labels.iter().enumerate() {
            if let Some(target) = map.get(label)? {
                keep.push(row);
                labels.push(target);
            }
        }
        let dropped = self.len() - keep.len();
        let mut out = self.select(&keep);
        out.labels = labels;
        Ok((out, dropped))
    }

    pub fn item(&self, index: usize) -> Option<IqItem> {
        if index >= self.len() {
            return None;
        }
        let iq = self
            .iq
            .index_axis(Axis(0), index)
            .rows()
            .into_iter()
            .map(|r| [r[0], r[1]])
            .collect();
        Some(IqItem {
            iq,
            label: self.labels[index],
            snr: self.snrs[index],
        })
    }
}

/// One sample as handed to the data loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IqItem {
    pub iq: Vec<[f32; 2]>,
    pub label: usize,
    pub snr: i8,
}

impl IqItem {
    pub fn record_len(&self) -> usize {
        self.iq.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::taxonomy::{ClassList, RemapRules};

    fn batch(n: usize, len: usize) -> RecordBatch {
        let iq = Array3::from_shape_fn((n, len, 2), |(r, s, c)| (r * 100 + s * 2 + c) as f32);
        RecordBatch::new(iq, (0..n).map(|i| i % 3).collect(), (0..n).map(|i| i as i8).collect())
            .unwrap()
    }

    #[test]
    fn test_misaligned_rejected() {
        let iq = Array3::<f32>::zeros((3, 4, 2));
        let err = RecordBatch::new(iq, vec![0, 1], vec![0, 0, 0]).unwrap_err();
        assert_eq!(err, BatchError::Misaligned { iq: 3, labels: 2, snrs: 3 });
    }

    #[test]
    fn test_non_iq_columns_rejected() {
        let iq = Array3::<f32>::zeros((1, 4, 3));
        assert_eq!(RecordBatch::new(iq, vec![0], vec![0]).unwrap_err(), BatchError::NotIq(3));
    }

    #[test]
    fn test_select_keeps_rows_together() {
        let b = batch(5, 4);
        let s = b.select(&[4, 1]);
        assert_eq!(s.labels(), &[1, 1]);
        assert_eq!(s.snrs(), &[4, 1]);
        assert_eq!(s.iq()[[0, 0, 0]], 400.0);
        assert_eq!(s.iq()[[1, 3, 1]], 107.0);
    }

    #[test]
    fn test_remap_drops_unmapped_rows() {
        let b = batch(6, 2);
        let src = ClassList::new(["a", "b", "c"]).unwrap();
        let uni = ClassList::new(["c", "a"]).unwrap();
        let map = LabelMap::build(&src, &uni, &RemapRules::default()).unwrap();
        let (out, dropped) = b.retain_labels(&map).unwrap();
        assert_eq!(dropped, 2);
        // labels were 0,1,2,0,1,2 → a,b,c,a,b,c → 1,-,0,1,-,0
        assert_eq!(out.labels(), &[1, 0, 1, 0]);
        assert_eq!(out.snrs(), &[0, 2, 3, 5]);
    }

    #[test]
    fn test_item_unpacks_pairs() {
        let b = batch(2, 3);
        let item = b.item(1).unwrap();
        assert_eq!(item.iq, vec![[100.0, 101.0], [102.0, 103.0], [104.0, 105.0]]);
        assert_eq!(item.label, 1);
        assert_eq!(item.snr, 1);
        assert!(b.item(2).is_none());
    }
}
