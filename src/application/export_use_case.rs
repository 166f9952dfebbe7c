// ============================================================
// Layer 2 — ExportUseCase
// ============================================================
// Writes a store as CSV for CsvDataset and for tools that
// cannot read HDF5:
//
//   iq,label,snr
//   "[[0.12,-0.4],[0.3,0.9],...]",3,-10
//
// Classes can be filtered by index or by name (names need the
// manifest). The store is read in chunks; only the CSV writer
// buffers rows.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::data::dataset::CsvRecord;
use crate::data::store::IqStore;
use crate::domain::traits::chunk_ranges;
use crate::infra::manifest::DatasetManifest;

const EXPORT_CHUNK: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Class names or indices to keep; empty keeps everything
    pub classes: Vec<String>,
    pub limit: Option<usize>,
}

pub struct ExportUseCase {
    config: ExportConfig,
}

impl ExportUseCase {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Returns the number of rows written.
    pub fn execute(&self) -> Result<usize> {
        let cfg = &self.config;
        let store = IqStore::open(&cfg.input)?;
        let keep = self.resolve_filter(store.schema().num_classes)?;

        let mut writer = csv::Writer::from_path(&cfg.output)
            .with_context(|| format!("Cannot create '{}'", cfg.output.display()))?;
        let limit = cfg.limit.unwrap_or(usize::MAX);
        let mut written = 0usize;

        'chunks: for range in chunk_ranges(store.len(), EXPORT_CHUNK) {
            let batch = store.read_records(range)?;
            for i in 0..batch.len() {
                if written >= limit {
                    break 'chunks;
                }
                if let Some(keep) = &keep {
                    if !keep.get(batch.labels()[i]).copied().unwrap_or(false) {
                        continue;
                    }
                }
                if let Some(item) = batch.item(i) {
                    writer.serialize(CsvRecord::from_item(&item)?)?;
                    written += 1;
                }
            }
        }
        writer.flush()?;

        tracing::info!(
            "Exported {} of {} records to '{}'",
            written,
            store.len(),
            cfg.output.display()
        );
        Ok(written)
    }

    /// Per-class keep flags, `None` for no filter.
    fn resolve_filter(&self, num_classes: usize) -> Result<Option<Vec<bool>>> {
        let cfg = &self.config;
        if cfg.classes.is_empty() {
            return Ok(None);
        }
        let manifest = DatasetManifest::load_optional(&cfg.input)?;

        let mut keep = vec![false; num_classes];
        for class in &cfg.classes {
            let index = match class.parse::<usize>() {
                Ok(i) => i,
                Err(_) => match manifest.as_ref() {
                    Some(m) => m
                        .classes
                        .position(class)
                        .with_context(|| format!("unknown class '{class}'"))?,
                    None => bail!(
                        "class '{class}' given by name but '{}' has no manifest",
                        cfg.input.display()
                    ),
                },
            };
            match keep.get_mut(index) {
                Some(flag) => *flag = true,
                None => bail!("class index {index} out of range for {num_classes} classes"),
            }
        }
        Ok(Some(keep))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::CsvDataset;
    use crate::data::store::{StoreOptions, StoreSchema};
    use crate::domain::record::RecordBatch;
    use crate::domain::taxonomy::{ClassList, LabelEncoding};
    use burn::data::dataset::Dataset;
    use ndarray::Array3;
    use std::path::Path;

    fn write_store(path: &Path) {
        let schema = StoreSchema {
            record_len: 2,
            num_classes: 3,
            label_encoding: LabelEncoding::Index,
        };
        let mut store = IqStore::create(path, schema, &StoreOptions::default(), false).unwrap();
        let iq = Array3::from_shape_fn((6, 2, 2), |(r, s, c)| (r * 4 + s * 2 + c) as f32);
        let batch = RecordBatch::new(iq, vec![0, 1, 2, 0, 1, 2], vec![0, 2, 4, 6, 8, 10]).unwrap();
        store.append_records(&batch).unwrap();
        DatasetManifest::new(ClassList::new(["BPSK", "QPSK", "FM"]).unwrap(), LabelEncoding::Index, 2)
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_export_everything_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("s.h5");
        write_store(&input);
        let output = dir.path().join("s.csv");

        let n = ExportUseCase::new(ExportConfig {
            input,
            output: output.clone(),
            ..ExportConfig::default()
        })
        .execute()
        .unwrap();
        assert_eq!(n, 6);

        let ds = CsvDataset::load(&output).unwrap();
        assert_eq!(ds.len(), 6);
        let item = ds.get(5).unwrap();
        assert_eq!(item.label, 2);
        assert_eq!(item.snr, 10);
        assert_eq!(item.iq, vec![[20.0, 21.0], [22.0, 23.0]]);
    }

    #[test]
    fn test_filter_by_name_and_index_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("s.h5");
        write_store(&input);
        let output = dir.path().join("f.csv");

        let n = ExportUseCase::new(ExportConfig {
            input: input.clone(),
            output: output.clone(),
            classes: vec!["FM".into(), "0".into()],
            limit: Some(3),
        })
        .execute()
        .unwrap();
        assert_eq!(n, 3);
        let labels: Vec<usize> = CsvDataset::load(&output)
            .unwrap()
            .iter()
            .map(|item| item.label)
            .collect();
        assert_eq!(labels, vec![0, 2, 0]);

        let bad = ExportUseCase::new(ExportConfig {
            input,
            output,
            classes: vec!["GMSK".into()],
            limit: None,
        });
        assert!(bad.execute().is_err());
    }
}
