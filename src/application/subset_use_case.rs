// ============================================================
// Layer 2 — SubsetUseCase
// ============================================================
// Extracts a few classes from a larger set, e.g. the four
// digital modulations BPSK / QPSK / 16QAM / 64QAM out of the
// 24-class DeepSig file, and re-indexes them 0..k in the order
// given. Everything else is dropped.
//
// This is a one-source merge with name matching on and no
// default class, so it reuses MergeUseCase end to end.

use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};

use crate::application::merge_use_case::MergeUseCase;
use crate::application::plan::{MergePlan, SourceOptions, SourceSpec};
use crate::data::h5_source::DatasetNames;
use crate::domain::taxonomy::{ClassSpec, LabelEncoding};
use crate::infra::manifest::DatasetManifest;

#[derive(Debug, Clone)]
pub struct SubsetConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Classes to keep, in their new index order
    pub keep: Vec<String>,
    /// Taxonomy of the input; taken from its manifest when absent
    pub source_classes: Option<ClassSpec>,
    pub datasets: Option<DatasetNames>,
    pub label_encoding: LabelEncoding,
    pub normalize: bool,
    pub chunk_records: usize,
    pub overwrite: bool,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/GOLD_XYZ_OSC.0001_1024.hdf5"),
            output: PathBuf::from("data/subset.h5"),
            keep: ["BPSK", "QPSK", "16QAM", "64QAM"].map(String::from).to_vec(),
            source_classes: None,
            datasets: None,
            label_encoding: LabelEncoding::OneHot,
            normalize: false,
            chunk_records: 1024,
            overwrite: false,
        }
    }
}

pub struct SubsetUseCase {
    config: SubsetConfig,
}

impl SubsetUseCase {
    pub fn new(config: SubsetConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<DatasetManifest> {
        let cfg = &self.config;
        ensure!(!cfg.keep.is_empty(), "no classes to keep");

        let source_classes = match &cfg.source_classes {
            Some(spec) => spec.clone(),
            None => match DatasetManifest::load_optional(&cfg.input)? {
                Some(m) => ClassSpec::List(m.classes.names().to_vec()),
                None => bail!(
                    "'{}' has no manifest; name its classes with --source-classes",
                    cfg.input.display()
                ),
            },
        };
        // Every kept class must exist in the input.
        let kept = source_classes
            .resolve()?
            .subset(&cfg.keep)
            .with_context(|| format!("classes of '{}'", cfg.input.display()))?;
        tracing::info!(
            "Extracting {:?} from '{}' into '{}'",
            cfg.keep,
            cfg.input.display(),
            cfg.output.display()
        );

        let source = SourceSpec::H5 {
            path: cfg.input.clone(),
            datasets: cfg.datasets.clone(),
            options: SourceOptions {
                classes: Some(source_classes),
                normalize: cfg.normalize,
                ..SourceOptions::default()
            },
        };
        let mut plan = MergePlan::new(
            cfg.output.clone(),
            ClassSpec::List(kept.names().to_vec()),
            vec![source],
        );
        plan.label_encoding = cfg.label_encoding;
        plan.chunk_records = cfg.chunk_records;
        plan.overwrite = cfg.overwrite;

        MergeUseCase::new(plan).execute()
    }
}
