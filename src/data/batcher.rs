// ============================================================
// Layer 4 — IQ Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<IqItem> into
// tensors.
//
//   Input:  N IqItems, each with L (I, Q) pairs
//   Output: IqBatch with iq [N, L, 2], labels [N], snrs [N]
//
// All IQ samples are flattened into one Vec in record order,
// then reshaped:
//   [r1_s1_i, r1_s1_q, ..., r1_sL_q, r2_s1_i, ..., rN_sL_q] → [N, L, 2]
//
// Every record in a store has the same L. Items from elsewhere
// (a CSV, a hand-built Vec) may not; shorter records are
// zero-padded to the longest one in the batch.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::domain::record::IqItem;

// ─── IqBatch ──────────────────────────────────────────────────────────────────
/// A batch of IQ records. All tensors have batch_size as their
/// first dimension.
#[derive(Debug, Clone)]
pub struct IqBatch<B: Backend> {
    /// Samples — shape: [batch_size, record_len, 2]
    pub iq: Tensor<B, 3>,

    /// Class indices — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,

    /// SNR in dB — shape: [batch_size]
    pub snrs: Tensor<B, 1, Int>,
}

// ─── IqBatcher ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct IqBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> IqBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<IqItem, IqBatch<B>> for IqBatcher<B> {
    fn batch(&self, items: Vec<IqItem>) -> IqBatch<B> {
        let batch_size = items.len();
        let record_len = items.iter().map(IqItem::record_len).max().unwrap_or(0);

        // ── Flatten, padding each record to record_len ───────────────────────
        let mut iq_flat: Vec<f32> = Vec::with_capacity(batch_size * record_len * 2);
        for item in &items {
            iq_flat.extend(item.iq.iter().flat_map(|&[i, q]| [i, q]));
            iq_flat.resize(iq_flat.len() + (record_len - item.record_len()) * 2, 0.0);
        }

        let labels: Vec<i32> = items.iter().map(|item| item.label as i32).collect();
        let snrs: Vec<i32> = items.iter().map(|item| i32::from(item.snr)).collect();

        let iq = Tensor::<B, 1>::from_floats(iq_flat.as_slice(), &self.device)
            .reshape([batch_size, record_len, 2]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);
        let snrs = Tensor::<B, 1, Int>::from_ints(snrs.as_slice(), &self.device);

        IqBatch { iq, labels, snrs }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn item(label: usize, snr: i8, offset: f32) -> IqItem {
        IqItem {
            iq: vec![[offset, offset + 0.5], [offset + 1.0, offset + 1.5]],
            label,
            snr,
        }
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = IqBatcher::<B>::new(Default::default());
        let batch = batcher.batch(vec![item(3, -10, 0.0), item(1, 18, 10.0), item(0, 0, 20.0)]);
        assert_eq!(batch.iq.dims(), [3, 2, 2]);
        assert_eq!(batch.labels.dims(), [3]);
        assert_eq!(batch.snrs.dims(), [3]);
    }

    #[test]
    fn test_batch_values_keep_record_order() {
        let batcher = IqBatcher::<B>::new(Default::default());
        let batch = batcher.batch(vec![item(3, -10, 0.0), item(1, 18, 10.0)]);

        let iq: Vec<f32> = batch.iq.into_data().to_vec().unwrap();
        assert_eq!(iq, vec![0.0, 0.5, 1.0, 1.5, 10.0, 10.5, 11.0, 11.5]);

        let labels: Vec<i64> = batch.labels.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(labels, vec![3, 1]);
        let snrs: Vec<i64> = batch.snrs.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(snrs, vec![-10, 18]);
    }

    #[test]
    fn test_empty_batch_has_zero_rows() {
        let batcher = IqBatcher::<B>::new(Default::default());
        let batch = batcher.batch(vec![]);
        assert_eq!(batch.iq.dims(), [0, 0, 2]);
        assert_eq!(batch.labels.dims(), [0]);
    }

    #[test]
    fn test_short_records_are_zero_padded() {
        let batcher = IqBatcher::<B>::new(Default::default());
        let short = IqItem {
            iq: vec![[7.0, 8.0]],
            label: 2,
            snr: 4,
        };
        let batch = batcher.batch(vec![short, item(1, 0, 0.0)]);
        assert_eq!(batch.iq.dims(), [2, 2, 2]);

        let iq: Vec<f32> = batch.iq.into_data().to_vec().unwrap();
        assert_eq!(iq, vec![7.0, 8.0, 0.0, 0.0, 0.0, 0.5, 1.0, 1.5]);
    }
}
