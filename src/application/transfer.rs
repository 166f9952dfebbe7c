// ============================================================
// Layer 2 — Record Transfer
// ============================================================
// The inner loop shared by merge, subset and resegment:
//
//   source.read(chunk)
//       → retain_labels (re-index, drop unmapped)
//       → normalize     (optional)
//       → segment       (optional)
//       → sink.append
//
// One chunk is in memory at a time.

use anyhow::{Context, Result};

use crate::data::preprocessor::Normalizer;
use crate::data::segmenter::Segmenter;
use crate::domain::taxonomy::LabelMap;
use crate::domain::traits::{chunk_ranges, RecordSink, RecordSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferCounts {
    pub read: usize,
    pub appended: usize,
    pub dropped: usize,
}

impl TransferCounts {
    pub fn add(&mut self, other: TransferCounts) {
        self.read += other.read;
        self.appended += other.appended;
        self.dropped += other.dropped;
    }
}

pub struct Transfer<'a> {
    pub map: &'a LabelMap,
    pub normalizer: Option<Normalizer>,
    pub segmenter: Option<Segmenter>,
    pub chunk_records: usize,
    /// Read at most this many records
    pub limit: Option<usize>,
}

impl<'a> Transfer<'a> {
    pub fn new(map: &'a LabelMap, chunk_records: usize) -> Self {
        Self {
            map,
            normalizer: None,
            segmenter: None,
            chunk_records,
            limit: None,
        }
    }

    pub fn run(&self, source: &dyn RecordSource, sink: &mut dyn RecordSink) -> Result<TransferCounts> {
        let total = self.limit.map_or(source.len(), |l| l.min(source.len()));
        let mut counts = TransferCounts::default();

        for range in chunk_ranges(total, self.chunk_records) {
            let batch = source
                .read(range.clone())
                .with_context(|| format!("reading records {:?} of '{}'", range, source.name()))?;
            counts.read += batch.len();

            let (mut kept, dropped) = batch
                .retain_labels(self.map)
                .with_context(|| format!("labels of records {:?} in '{}'", range, source.name()))?;
            counts.dropped += dropped;

            if kept.is_empty() {
                continue;
            }
            if let Some(normalizer) = &self.normalizer {
                normalizer.scale_records(kept.iq_mut());
            }
            let out = match &self.segmenter {
                Some(segmenter) => segmenter.split(&kept)?,
                None => kept,
            };

            sink.append(&out)?;
            counts.appended += out.len();
            tracing::debug!(
                "'{}' {:?}: {} appended, {} dropped",
                source.name(),
                range,
                out.len(),
                dropped
            );
        }

        Ok(counts)
    }
}
