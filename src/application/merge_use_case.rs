// ============================================================
// Layer 2 — MergeUseCase
// ============================================================
// Runs a MergePlan:
//
//   Step 1: Validate the plan, resolve the unified classes
//   Step 2: Survey every source file (count, record length)
//   Step 3: Create the output store (or reopen it to append)
//   Step 4: Stream each source through label remap → normalize
//           → append, one chunk at a time
//   Step 5: Write the manifest sidecar
//
// Sources are opened twice: once to survey, once to stream. An
// npz tree may hold thousands of recordings, and only one is in
// memory during either pass.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};

use crate::application::plan::{MergePlan, SourceOptions, SourceSpec};
use crate::application::transfer::{Transfer, TransferCounts};
use crate::data::h5_source::{DatasetNames, H5Source};
use crate::data::npz_source::{discover, NpzSource};
use crate::data::preprocessor::Normalizer;
use crate::data::store::{IqStore, StoreSchema};
use crate::domain::taxonomy::ClassList;
use crate::domain::traits::RecordSource;
use crate::infra::manifest::{DatasetManifest, SourceReport};

// ─── Source files ─────────────────────────────────────────────────────────────
/// One openable file behind a SourceSpec.
enum SourceFile<'a> {
    H5 {
        path: &'a Path,
        datasets: Option<&'a DatasetNames>,
    },
    Npz(PathBuf),
}

impl SourceFile<'_> {
    fn open(&self) -> Result<Box<dyn RecordSource>> {
        Ok(match self {
            SourceFile::H5 { path, datasets } => Box::new(H5Source::open(path, *datasets)?),
            SourceFile::Npz(path) => Box::new(NpzSource::open(path)?),
        })
    }
}

fn expand(spec: &SourceSpec) -> Result<Vec<SourceFile<'_>>> {
    Ok(match spec {
        SourceSpec::H5 { path, datasets, .. } => vec![SourceFile::H5 {
            path,
            datasets: datasets.as_ref(),
        }],
        SourceSpec::NpzTree { root, dir_name, .. } => discover(root, dir_name)?
            .into_iter()
            .map(SourceFile::Npz)
            .collect(),
    })
}

// ─── MergeUseCase ─────────────────────────────────────────────────────────────
pub struct MergeUseCase {
    plan: MergePlan,
}

impl MergeUseCase {
    pub fn new(plan: MergePlan) -> Self {
        Self { plan }
    }

    pub fn execute(&self) -> Result<DatasetManifest> {
        let plan = &self.plan;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        let unified = plan.validate()?;
        tracing::info!(
            "Merging {} sources into '{}' ({} classes)",
            plan.sources.len(),
            plan.output.display(),
            unified.len()
        );

        // ── Step 2: Survey ────────────────────────────────────────────────────
        let files = plan
            .sources
            .iter()
            .map(expand)
            .collect::<Result<Vec<_>>>()?;

        let mut record_len: Option<(usize, String)> = None;
        let mut total = 0usize;
        for (spec, spec_files) in plan.sources.iter().zip(&files) {
            let mut spec_total = 0usize;
            for file in spec_files {
                let source = file.open()?;
                if let Some((expected, first)) = &record_len {
                    ensure!(
                        source.record_len() == *expected,
                        "'{}' has records of length {} but '{}' has {}",
                        source.name(),
                        source.record_len(),
                        first,
                        expected
                    );
                } else {
                    record_len = Some((source.record_len(), source.name().to_string()));
                }
                // Fail on label problems before anything is written.
                let map = spec
                    .options()
                    .label_map(&unified, source.label_width())
                    .with_context(|| format!("labels of '{}'", source.name()))?;
                tracing::debug!(
                    "'{}': {} records, {} of its classes kept",
                    source.name(),
                    source.len(),
                    map.kept_classes()
                );
                spec_total += source.len();
            }
            let spec_total = spec.options().limit.map_or(spec_total, |l| l.min(spec_total));
            tracing::info!("{}: {} files, {} records", spec.describe(), spec_files.len(), spec_total);
            total += spec_total;
        }
        let (record_len, _) = record_len.context("sources contain no files")?;
        tracing::info!("Total records to read: {} (L = {})", total, record_len);

        // ── Step 3: Output store ──────────────────────────────────────────────
        let schema = StoreSchema {
            record_len,
            num_classes: unified.len(),
            label_encoding: plan.label_encoding,
        };
        let (mut store, mut manifest) = self.open_output(schema, &unified)?;

        // ── Step 4: Stream ────────────────────────────────────────────────────
        for (spec, spec_files) in plan.sources.iter().zip(&files) {
            let counts = self.stream_source(spec.options(), spec_files, &unified, &mut store)?;
            if counts.dropped > 0 {
                tracing::warn!(
                    "{}: dropped {} records with no output class",
                    spec.describe(),
                    counts.dropped
                );
            }
            tracing::info!(
                "{}: appended {} of {} records (store now {})",
                spec.describe(),
                counts.appended,
                counts.read,
                store.len()
            );
            manifest.push(SourceReport {
                name: spec.describe(),
                read: counts.read,
                appended: counts.appended,
                dropped: counts.dropped,
                normalized: spec.options().normalize,
            });
        }

        // ── Step 5: Manifest ──────────────────────────────────────────────────
        manifest.total_records = store.len();
        let path = manifest.save(&plan.output)?;
        tracing::info!(
            "Merge complete: {} records in '{}', manifest '{}'",
            store.len(),
            plan.output.display(),
            path.display()
        );
        Ok(manifest)
    }

    fn open_output(
        &self,
        schema: StoreSchema,
        unified: &ClassList,
    ) -> Result<(IqStore, DatasetManifest)> {
        let plan = &self.plan;
        if !plan.append {
            let store =
                IqStore::create(&plan.output, schema, &plan.store_options(), plan.overwrite)?;
            let manifest =
                DatasetManifest::new(unified.clone(), schema.label_encoding, schema.record_len);
            return Ok((store, manifest));
        }

        let store = IqStore::open_append(&plan.output)?;
        store.check_schema(&schema)?;
        let manifest = match DatasetManifest::load_optional(&plan.output)? {
            Some(existing) => {
                ensure!(
                    existing.classes == *unified,
                    "'{}' was built with classes {:?}",
                    plan.output.display(),
                    existing.classes.names()
                );
                existing
            }
            None => DatasetManifest::new(unified.clone(), schema.label_encoding, schema.record_len),
        };
        tracing::info!(
            "Appending to '{}' ({} records)",
            plan.output.display(),
            store.len()
        );
        Ok((store, manifest))
    }

    fn stream_source(
        &self,
        options: &SourceOptions,
        files: &[SourceFile<'_>],
        unified: &ClassList,
        store: &mut IqStore,
    ) -> Result<TransferCounts> {
        let mut counts = TransferCounts::default();
        let mut remaining = options.limit;

        for file in files {
            if remaining == Some(0) {
                break;
            }
            let source = file.open()?;
            let map = options.label_map(unified, source.label_width())?;

            let mut transfer = Transfer::new(&map, self.plan.chunk_records);
            transfer.limit = remaining;
            if options.normalize {
                transfer.normalizer = Some(Normalizer::new());
            }

            let file_counts = transfer.run(source.as_ref(), store)?;
            if let Some(r) = remaining.as_mut() {
                *r -= file_counts.read;
            }
            counts.add(file_counts);
        }
        Ok(counts)
    }
}
