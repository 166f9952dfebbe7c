// ============================================================
// Layer 2 — ResegmentUseCase
// ============================================================
// Re-slices every record of an existing file into shorter ones:
//
//   input   [N, L, 2]
//   output  [N * count, segment_len, 2]
//
//   count = (L - segment_len) / stride + 1
//
// Labels and SNRs are copied onto every segment. The input is
// read `chunk_records` records at a time, so memory stays at
// chunk_records * L samples regardless of N.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::transfer::Transfer;
use crate::data::h5_source::{DatasetNames, H5Source};
use crate::data::preprocessor::Normalizer;
use crate::data::segmenter::Segmenter;
use crate::data::store::{IqStore, StoreOptions, StoreSchema};
use crate::domain::taxonomy::{ClassList, ClassSpec, LabelEncoding, LabelMap};
use crate::domain::traits::RecordSource;
use crate::infra::manifest::{DatasetManifest, SourceReport};

#[derive(Debug, Clone)]
pub struct ResegmentConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub segment_len: usize,
    /// Defaults to `segment_len` (no overlap)
    pub stride: Option<usize>,
    pub datasets: Option<DatasetNames>,
    /// Taxonomy of the input; from its manifest, or anonymous
    pub classes: Option<ClassSpec>,
    pub label_encoding: LabelEncoding,
    pub normalize: bool,
    pub chunk_records: usize,
    pub compression: Option<u8>,
    pub overwrite: bool,
}

impl Default for ResegmentConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/merged.h5"),
            output: PathBuf::from("data/resegmented.h5"),
            segment_len: 1024,
            stride: None,
            datasets: None,
            classes: None,
            label_encoding: LabelEncoding::OneHot,
            normalize: false,
            chunk_records: 256,
            compression: Some(4),
            overwrite: false,
        }
    }
}

pub struct ResegmentUseCase {
    config: ResegmentConfig,
}

impl ResegmentUseCase {
    pub fn new(config: ResegmentConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<DatasetManifest> {
        let cfg = &self.config;
        let segmenter = Segmenter::new(cfg.segment_len, cfg.stride.unwrap_or(cfg.segment_len))?;
        let segment_len = segmenter.segment_len();

        let source = H5Source::open(&cfg.input, cfg.datasets.as_ref())?;
        let per_record = segmenter.count(source.record_len());
        anyhow::ensure!(
            per_record > 0,
            "records in '{}' have length {}, shorter than segment length {}",
            cfg.input.display(),
            source.record_len(),
            segment_len
        );

        let classes = self.resolve_classes(&source)?;
        let map = LabelMap::identity(classes.len());
        tracing::info!(
            "Resegmenting {} records of length {} into {} segments of {}",
            source.len(),
            source.record_len(),
            source.len() * per_record,
            segment_len
        );

        let schema = StoreSchema {
            record_len: segment_len,
            num_classes: classes.len(),
            label_encoding: cfg.label_encoding,
        };
        let options = StoreOptions {
            chunk_records: cfg.chunk_records * per_record,
            compression: cfg.compression,
        };
        let mut store = IqStore::create(&cfg.output, schema, &options, cfg.overwrite)?;

        let mut transfer = Transfer::new(&map, cfg.chunk_records);
        transfer.segmenter = Some(segmenter);
        if cfg.normalize {
            transfer.normalizer = Some(Normalizer::new());
        }
        let counts = transfer.run(&source, &mut store)?;

        let mut manifest = DatasetManifest::new(classes, cfg.label_encoding, segment_len);
        manifest.push(SourceReport {
            name: source.name().to_string(),
            read: counts.read,
            appended: counts.appended,
            dropped: counts.dropped,
            normalized: cfg.normalize,
        });
        manifest.save(&cfg.output)?;

        tracing::info!(
            "Wrote {} segments to '{}'",
            store.len(),
            cfg.output.display()
        );
        Ok(manifest)
    }

    fn resolve_classes(&self, source: &H5Source) -> Result<ClassList> {
        let cfg = &self.config;
        let classes = match &cfg.classes {
            Some(spec) => spec.resolve()?,
            None => match DatasetManifest::load_optional(&cfg.input)? {
                Some(m) => m.classes,
                None => {
                    let width = source.label_width().with_context(|| {
                        format!(
                            "'{}' has index labels and no manifest; name its classes with --classes",
                            cfg.input.display()
                        )
                    })?;
                    ClassList::anonymous(width)
                }
            },
        };
        if let Some(width) = source.label_width() {
            anyhow::ensure!(
                width == classes.len(),
                "labels in '{}' are {} wide but {} classes were given",
                cfg.input.display(),
                width,
                classes.len()
            );
        }
        Ok(classes)
    }
}
