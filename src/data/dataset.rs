// ============================================================
// Layer 4 — Indexed Datasets
// ============================================================
// burn's DataLoader pulls items one index at a time, possibly
// from several worker threads. IqDataset keeps only the store
// path and its length; every `get` opens the file and reads one
// slice of each array, so memory use stays flat no matter how
// large the store is and nothing file-backed is shared between
// threads.
//
// SubsetDataset restricts any dataset to an index list, which
// is how the train / valid / test partitions are served.
//
// CsvDataset is the small-data path: an exported store read
// fully into memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::store::{IqStore, StoreError, StoreSchema};
use crate::domain::record::IqItem;

// ─── IqDataset ────────────────────────────────────────────────────────────────
pub struct IqDataset {
    path: PathBuf,
    len: usize,
    schema: StoreSchema,
}

impl IqDataset {
    /// Opens the store once to learn its length and schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = IqStore::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            len: store.len(),
            schema: store.schema(),
        })
    }

    pub fn schema(&self) -> StoreSchema {
        self.schema
    }
}

impl Dataset<IqItem> for IqDataset {
    fn get(&self, index: usize) -> Option<IqItem> {
        if index >= self.len {
            return None;
        }
        match IqStore::open(&self.path).and_then(|store| store.read_item(index)) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Cannot read record {} of '{}': {}", index, self.path.display(), e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.len
    }
}

// ─── SubsetDataset ────────────────────────────────────────────────────────────
/// The items of `inner` at `indices`, in that order.
pub struct SubsetDataset<D> {
    inner: Arc<D>,
    indices: Vec<usize>,
}

impl<D> SubsetDataset<D> {
    pub fn new(inner: Arc<D>, indices: Vec<usize>) -> Self {
        Self { inner, indices }
    }
}

impl<D, I> Dataset<I> for SubsetDataset<D>
where
    D: Dataset<I>,
{
    fn get(&self, index: usize) -> Option<I> {
        self.indices.get(index).and_then(|&i| self.inner.get(i))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

// ─── CsvDataset ───────────────────────────────────────────────────────────────
/// One CSV row: `iq` is a JSON array of `[i, q]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvRecord {
    pub iq: String,
    pub label: usize,
    pub snr: i8,
}

impl CsvRecord {
    pub fn from_item(item: &IqItem) -> Result<Self> {
        Ok(Self {
            iq: serde_json::to_string(&item.iq)?,
            label: item.label,
            snr: item.snr,
        })
    }

    pub fn into_item(self) -> Result<IqItem> {
        let iq: Vec<[f32; 2]> =
            serde_json::from_str(&self.iq).context("iq column is not a list of [i, q] pairs")?;
        Ok(IqItem {
            iq,
            label: self.label,
            snr: self.snr,
        })
    }
}

pub struct CsvDataset {
    items: Vec<IqItem>,
}

impl CsvDataset {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Cannot open CSV '{}'", path.display()))?;

        let mut items: Vec<IqItem> = Vec::new();
        for (row, record) in reader.deserialize::<CsvRecord>().enumerate() {
            let item = record
                .map_err(anyhow::Error::from)
                .and_then(CsvRecord::into_item)
                .with_context(|| format!("'{}' row {}", path.display(), row + 1))?;
            if let Some(first) = items.first() {
                ensure!(
                    item.record_len() == first.record_len(),
                    "'{}' row {}: {} IQ samples, but row 1 has {}",
                    path.display(),
                    row + 1,
                    item.record_len(),
                    first.record_len()
                );
            }
            items.push(item);
        }

        tracing::info!("Loaded {} records from '{}'", items.len(), path.display());
        Ok(Self { items })
    }
}

impl Dataset<IqItem> for CsvDataset {
    fn get(&self, index: usize) -> Option<IqItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
