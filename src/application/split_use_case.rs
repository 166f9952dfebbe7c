// ============================================================
// Layer 2 — SplitUseCase
// ============================================================
// Partitions a store into train / valid / test and checks that
// every part can actually be served:
//
//   Step 1: Open the store as a lazily-read IqDataset, or load a
//           CSV export into a CsvDataset
//   Step 2: Compute the seeded partition
//   Step 3: Save the partition as JSON next to the store
//   Step 4: Drive each part through a burn DataLoader
//           (SubsetDataset + IqBatcher) and count classes / SNRs
//
// A training run loads the same partition file, so the held-out
// records stay held out across runs.
//
// burn's loader stops a part at the first index whose `get`
// returns None, so a part that serves fewer records than it holds
// is an error, not a short part.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use burn::{
    backend::NdArray,
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::IqBatcher;
use crate::data::dataset::{CsvDataset, IqDataset, SubsetDataset};
use crate::data::splitter::{partition, Partition, SplitConfig};
use crate::domain::record::IqItem;

type SplitBackend = NdArray;

#[derive(Debug, Clone)]
pub struct SplitUseCaseConfig {
    pub input: PathBuf,
    /// Defaults to `<input>.split.json`
    pub output: Option<PathBuf>,
    pub split: SplitConfig,
    pub batch_size: usize,
    pub num_workers: usize,
}

impl Default for SplitUseCaseConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/merged.h5"),
            output: None,
            split: SplitConfig::default(),
            batch_size: 256,
            num_workers: 1,
        }
    }
}

/// Saved partition, with the settings that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionFile {
    pub store: PathBuf,
    pub records: usize,
    pub config: SplitConfig,
    pub partition: Partition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartSummary {
    pub name: String,
    pub records: usize,
    pub batches: usize,
    pub class_counts: Vec<usize>,
    pub snr_counts: BTreeMap<i64, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub partition_file: PathBuf,
    pub parts: Vec<PartSummary>,
}

pub struct SplitUseCase {
    config: SplitUseCaseConfig,
}

impl SplitUseCase {
    pub fn new(config: SplitUseCaseConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<SplitSummary> {
        let cfg = &self.config;

        // ── Step 1: Dataset ───────────────────────────────────────────────────
        let is_csv = cfg
            .input
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            // Class count is not recorded in a CSV; histograms grow as needed.
            self.split(Arc::new(CsvDataset::load(&cfg.input)?), 0)
        } else {
            let dataset = IqDataset::open(&cfg.input)
                .with_context(|| format!("Cannot open store '{}'", cfg.input.display()))?;
            let num_classes = dataset.schema().num_classes;
            self.split(Arc::new(dataset), num_classes)
        }
    }

    fn split<D>(&self, dataset: Arc<D>, num_classes: usize) -> Result<SplitSummary>
    where
        D: Dataset<IqItem> + 'static,
    {
        let cfg = &self.config;
        let n = dataset.len();

        // ── Step 2: Partition ─────────────────────────────────────────────────
        let part = partition(n, &cfg.split)?;
        tracing::info!(
            "Split {} records: {} train, {} valid, {} test (seed {})",
            part.total(),
            part.train.len(),
            part.valid.len(),
            part.test.len(),
            cfg.split.seed
        );

        // ── Step 3: Save ──────────────────────────────────────────────────────
        let path = cfg.output.clone().unwrap_or_else(|| {
            let mut name = cfg.input.as_os_str().to_owned();
            name.push(".split.json");
            PathBuf::from(name)
        });
        let file = PartitionFile {
            store: cfg.input.clone(),
            records: n,
            config: cfg.split.clone(),
            partition: part.clone(),
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?)
            .with_context(|| format!("Cannot write partition to '{}'", path.display()))?;

        // ── Step 4: Serve each part ───────────────────────────────────────────
        let parts = [("train", part.train), ("valid", part.valid), ("test", part.test)]
            .into_iter()
            .map(|(name, indices)| self.serve(name, Arc::clone(&dataset), indices, num_classes))
            .collect::<Result<Vec<_>>>()?;

        Ok(SplitSummary {
            partition_file: path,
            parts,
        })
    }

    fn serve<D>(
        &self,
        name: &str,
        dataset: Arc<D>,
        indices: Vec<usize>,
        num_classes: usize,
    ) -> Result<PartSummary>
    where
        D: Dataset<IqItem> + 'static,
    {
        let cfg = &self.config;
        let records = indices.len();
        let subset = SubsetDataset::new(dataset, indices);

        let batcher = IqBatcher::<SplitBackend>::new(Default::default());
        let mut builder = DataLoaderBuilder::new(batcher)
            .batch_size(cfg.batch_size.max(1))
            .num_workers(cfg.num_workers.max(1));
        if name == "train" && cfg.split.shuffle {
            builder = builder.shuffle(cfg.split.seed);
        }
        let loader = builder.build(subset);

        let mut summary = PartSummary {
            name: name.to_string(),
            records,
            batches: 0,
            class_counts: vec![0; num_classes],
            snr_counts: BTreeMap::new(),
        };
        let mut served = 0usize;

        for batch in loader.iter() {
            summary.batches += 1;
            let labels: Vec<i64> = batch
                .labels
                .into_data()
                .convert::<i64>()
                .to_vec()
                .map_err(|e| anyhow::anyhow!("label tensor: {e:?}"))?;
            let snrs: Vec<i64> = batch
                .snrs
                .into_data()
                .convert::<i64>()
                .to_vec()
                .map_err(|e| anyhow::anyhow!("snr tensor: {e:?}"))?;
            served += labels.len();

            for l in labels {
                let l = l as usize;
                if l >= summary.class_counts.len() {
                    summary.class_counts.resize(l + 1, 0);
                }
                summary.class_counts[l] += 1;
            }
            for s in snrs {
                *summary.snr_counts.entry(s).or_default() += 1;
            }
        }

        ensure!(
            served == records,
            "{}: only {} of {} records could be read from '{}'",
            name,
            served,
            records,
            cfg.input.display()
        );
        tracing::info!("{}: {} records in {} batches", name, served, summary.batches);
        Ok(summary)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::{IqStore, StoreOptions, StoreSchema};
    use crate::domain::record::RecordBatch;
    use crate::domain::taxonomy::LabelEncoding;
    use ndarray::Array3;

    fn write_store(path: &std::path::Path, n: usize) {
        let schema = StoreSchema {
            record_len: 4,
            num_classes: 2,
            label_encoding: LabelEncoding::OneHot,
        };
        let mut store = IqStore::create(path, schema, &StoreOptions::default(), false).unwrap();
        let batch = RecordBatch::new(
            Array3::ones((n, 4, 2)),
            (0..n).map(|i| i % 2).collect(),
            (0..n).map(|i| if i < n / 2 { -4 } else { 8 }).collect(),
        )
        .unwrap();
        store.append_records(&batch).unwrap();
    }

    #[test]
    fn test_split_serves_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("set.h5");
        write_store(&input, 40);

        let cfg = SplitUseCaseConfig {
            input: input.clone(),
            batch_size: 8,
            ..SplitUseCaseConfig::default()
        };
        let summary = SplitUseCase::new(cfg).execute().unwrap();

        let sizes: Vec<usize> = summary.parts.iter().map(|p| p.records).collect();
        assert_eq!(sizes, vec![30, 2, 8]);
        let train = &summary.parts[0];
        assert_eq!(train.batches, 4);
        assert_eq!(train.class_counts.iter().sum::<usize>(), 30);

        let total_classes: usize = summary
            .parts
            .iter()
            .map(|p| p.class_counts.iter().sum::<usize>())
            .sum();
        assert_eq!(total_classes, 40);
        let total_snr: usize = summary
            .parts
            .iter()
            .map(|p| p.snr_counts.values().sum::<usize>())
            .sum();
        assert_eq!(total_snr, 40);

        let saved: PartitionFile =
            serde_json::from_str(&fs::read_to_string(&summary.partition_file).unwrap()).unwrap();
        assert_eq!(saved.records, 40);
        assert_eq!(saved.partition, partition(40, &SplitConfig::default()).unwrap());
    }

    #[test]
    fn test_unreadable_records_fail_the_part() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("set.h5");
        write_store(&input, 10);

        let dataset = Arc::new(IqDataset::open(&input).unwrap());
        // The store disappears after the dataset learned its length.
        fs::remove_file(&input).unwrap();

        let use_case = SplitUseCase::new(SplitUseCaseConfig {
            input,
            batch_size: 4,
            ..SplitUseCaseConfig::default()
        });
        let err = use_case.serve("test", dataset, vec![7, 2, 9], 2).err().unwrap();
        assert!(err.to_string().contains("only 0 of 3"), "{err:#}");
    }

    #[test]
    fn test_split_csv_export() {
        use crate::data::dataset::CsvRecord;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("set.csv");
        {
            let mut writer = csv::Writer::from_path(&input).unwrap();
            for i in 0..20 {
                let item = IqItem {
                    iq: vec![[i as f32, 0.0], [0.0, 1.0]],
                    label: i % 3,
                    snr: 10,
                };
                writer.serialize(CsvRecord::from_item(&item).unwrap()).unwrap();
            }
            writer.flush().unwrap();
        }

        let summary = SplitUseCase::new(SplitUseCaseConfig {
            input: input.clone(),
            batch_size: 8,
            ..SplitUseCaseConfig::default()
        })
        .execute()
        .unwrap();

        let sizes: Vec<usize> = summary.parts.iter().map(|p| p.records).collect();
        assert_eq!(sizes, vec![15, 1, 4]);
        let counted: usize = summary
            .parts
            .iter()
            .map(|p| p.class_counts.iter().sum::<usize>())
            .sum();
        assert_eq!(counted, 20);
        assert_eq!(summary.partition_file, dir.path().join("set.csv.split.json"));
    }
}
