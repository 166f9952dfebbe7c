// ============================================================
// Layer 2 — InspectUseCase / RepairUseCase
// ============================================================
// Inspect summarises a file without loading it:
//   - array shapes and, for stores, the schema
//   - record count per class (named from the manifest if any)
//   - record count per SNR
//
// A store is read through IqStore, which only touches the
// label and SNR arrays. Any other HDF5 file falls back to
// H5Source (first three members) and is streamed in chunks.
//
// Repair truncates a store whose arrays disagree in length,
// which is what an interrupted append leaves behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::data::h5_source::H5Source;
use crate::data::store::{IqStore, RepairReport, StoreError, StoreSchema};
use crate::domain::traits::{chunk_ranges, RecordSource};
use crate::infra::manifest::DatasetManifest;

const INSPECT_CHUNK: usize = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct ClassCount {
    pub index: usize,
    pub name: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub records: usize,
    pub record_len: usize,
    /// Set when the file is a store
    pub schema: Option<StoreSchema>,
    pub label_width: Option<usize>,
    pub classes: Vec<ClassCount>,
    pub snrs: BTreeMap<i8, usize>,
    pub manifest: Option<DatasetManifest>,
}

pub struct InspectUseCase {
    path: PathBuf,
}

impl InspectUseCase {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn execute(&self) -> Result<InspectReport> {
        let manifest = DatasetManifest::load_optional(&self.path)?;

        let mut class_counts: Vec<usize> = Vec::new();
        let mut snrs: BTreeMap<i8, usize> = BTreeMap::new();
        let mut tally = |labels: &[usize], batch_snrs: &[i8]| {
            for &l in labels {
                if l >= class_counts.len() {
                    class_counts.resize(l + 1, 0);
                }
                class_counts[l] += 1;
            }
            for &s in batch_snrs {
                *snrs.entry(s).or_default() += 1;
            }
        };

        let (records, record_len, schema, label_width) = match IqStore::open(&self.path) {
            Ok(store) => {
                tracing::info!("'{}' is a store: {:?}", self.path.display(), store.schema());
                for range in chunk_ranges(store.len(), INSPECT_CHUNK) {
                    let labels = store.read_labels(range.clone())?;
                    let s = store.read_snrs(range)?;
                    tally(&labels, &s);
                }
                let schema = store.schema();
                (store.len(), schema.record_len, Some(schema), Some(schema.num_classes))
            }
            Err(e @ StoreError::MisalignedStore { .. }) => return Err(e.into()),
            Err(e) => {
                tracing::debug!("Not a store ({e}), reading as a plain HDF5 file");
                let source = H5Source::open(&self.path, None)?;
                for range in chunk_ranges(source.len(), INSPECT_CHUNK) {
                    let batch = source.read(range)?;
                    tally(batch.labels(), batch.snrs());
                }
                (source.len(), source.record_len(), None, source.label_width())
            }
        };

        if let Some(width) = label_width {
            if class_counts.len() < width {
                class_counts.resize(width, 0);
            }
        }
        let names = manifest.as_ref().map(|m| &m.classes);
        let classes = class_counts
            .into_iter()
            .enumerate()
            .map(|(index, count)| ClassCount {
                index,
                name: names.and_then(|c| c.name(index)).map(str::to_string),
                count,
            })
            .collect();

        Ok(InspectReport {
            path: self.path.clone(),
            records,
            record_len,
            schema,
            label_width,
            classes,
            snrs,
            manifest,
        })
    }
}

pub struct RepairUseCase {
    path: PathBuf,
}

impl RepairUseCase {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn execute(&self) -> Result<RepairReport> {
        let report = IqStore::repair(&self.path)
            .with_context(|| format!("Cannot repair '{}'", self.path.display()))?;
        if report.rows_dropped() > 0 {
            fix_manifest_total(&self.path, report.len)?;
        }
        Ok(report)
    }
}

fn fix_manifest_total(store: &Path, len: usize) -> Result<()> {
    if let Some(mut manifest) = DatasetManifest::load_optional(store)? {
        manifest.total_records = len;
        manifest.save(store)?;
    }
    Ok(())
}
