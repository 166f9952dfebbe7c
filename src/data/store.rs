// ============================================================
// Layer 4 — Growable HDF5 Store
// ============================================================
// One HDF5 file holding three index-aligned arrays:
//
//   iq      [N, L, 2]   f32   chunked, deflate
//   labels  [N, C]      f32   one-hot          (LabelEncoding::OneHot)
//           [N]         u16   class index      (LabelEncoding::Index)
//   snrs    [N]         i8
//
// The leading dimension of every array is unlimited. Appending
// resizes all three to N + n and writes the new rows into the
// tail, so a merge of many sources never holds more than one
// chunk in memory.
//
// A failed append shrinks all three arrays back to N before the
// error is returned. A file whose arrays still disagree on N
// (e.g. the process was killed mid-append) refuses to open until
// `repair` truncates it to the shortest array.
//
// Why an attribute for the class count?
//   With index labels the shape is just [N], so nothing in the
//   array says how many classes exist. The `num_classes`
//   attribute on the labels array lets `open` rebuild the
//   schema without the manifest.
//
// Reference: HDF5 User Guide, "Chunking in HDF5";
//            hdf5-metno crate documentation

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use hdf5::{Dataset, File};
use ndarray::{arr1, s, Array1, Array2, Ix1, Ix2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::h5_source::read_iq;
use crate::domain::record::{BatchError, IqItem, RecordBatch};
use crate::domain::taxonomy::{argmax, one_hot, LabelEncoding, LabelError};
use crate::domain::traits::{RecordSink, RecordSource};

pub const IQ: &str = "iq";
pub const LABELS: &str = "labels";
pub const SNRS: &str = "snrs";
const NUM_CLASSES_ATTR: &str = "num_classes";

// ─── Schema & options ─────────────────────────────────────────────────────────

/// What every append must agree with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub record_len: usize,
    pub num_classes: usize,
    pub label_encoding: LabelEncoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Records per HDF5 chunk along the leading axis.
    pub chunk_records: usize,
    /// Deflate level 0-9, `None` for uncompressed.
    pub compression: Option<u8>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            chunk_records: 64,
            compression: Some(4),
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' already exists (use --overwrite to replace it)")]
    AlreadyExists(PathBuf),

    #[error("schema mismatch: store is {store:?}, requested {requested:?}")]
    SchemaMismatch {
        store: StoreSchema,
        requested: StoreSchema,
    },

    #[error("misaligned store: iq={iq}, labels={labels}, snrs={snrs} (run `iqset repair`)")]
    MisalignedStore { iq: usize, labels: usize, snrs: usize },

    #[error("record length {found} does not match the store's {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("invalid store layout: {0}")]
    Layout(String),

    #[error("records {start}..{end} out of bounds for {len} records")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    #[error("store was opened read-only")]
    ReadOnly,

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Lengths before and after a repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub iq: usize,
    pub labels: usize,
    pub snrs: usize,
    pub len: usize,
}

impl RepairReport {
    pub fn rows_dropped(&self) -> usize {
        (self.iq - self.len) + (self.labels - self.len) + (self.snrs - self.len)
    }
}

// ─── IqStore ──────────────────────────────────────────────────────────────────

pub struct IqStore {
    name: String,
    file: File,
    iq: Dataset,
    labels: Dataset,
    snrs: Dataset,
    schema: StoreSchema,
    len: usize,
    writable: bool,
}

impl IqStore {
    /// New empty store.
    ///
    /// # Arguments
    /// * `path`      - File to create
    /// * `schema`    - Record length, class count and label encoding
    /// * `options`   - Records per HDF5 chunk and deflate level
    /// * `overwrite` - Replace an existing file instead of failing
    ///
    /// # Errors
    /// `AlreadyExists` if `path` exists and `overwrite` is false.
    pub fn create(
        path: &Path,
        schema: StoreSchema,
        options: &StoreOptions,
        overwrite: bool,
    ) -> Result<Self, StoreError> {
        if path.exists() && !overwrite {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }
        if schema.record_len == 0 || schema.num_classes == 0 {
            return Err(StoreError::Layout(format!(
                "record length and class count must be positive, got {schema:?}"
            )));
        }
        if schema.label_encoding == LabelEncoding::Index
            && schema.num_classes > usize::from(u16::MAX) + 1
        {
            return Err(StoreError::Layout(format!(
                "{} classes do not fit u16 index labels",
                schema.num_classes
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = if overwrite {
            File::create(path)?
        } else {
            File::create_excl(path)?
        };

        let chunk = options.chunk_records.max(1);
        let l = schema.record_len;

        let mut iq = file
            .new_dataset::<f32>()
            .chunk((chunk, l, 2))
            .shape((0_usize.., l, 2_usize));
        if let Some(level) = options.compression {
            iq = iq.deflate(level);
        }
        let iq = iq.create(IQ)?;

        let labels = match schema.label_encoding {
            LabelEncoding::OneHot => {
                let mut b = file
                    .new_dataset::<f32>()
                    .chunk((chunk, schema.num_classes))
                    .shape((0_usize.., schema.num_classes));
                if let Some(level) = options.compression {
                    b = b.deflate(level);
                }
                b.create(LABELS)?
            }
            LabelEncoding::Index => {
                let mut b = file.new_dataset::<u16>().chunk(chunk).shape(0_usize..);
                if let Some(level) = options.compression {
                    b = b.deflate(level);
                }
                let ds = b.create(LABELS)?;
                ds.new_attr_builder()
                    .with_data(&arr1(&[schema.num_classes as u64]))
                    .create(NUM_CLASSES_ATTR)?;
                ds
            }
        };

        let mut snrs = file.new_dataset::<i8>().chunk(chunk).shape(0_usize..);
        if let Some(level) = options.compression {
            snrs = snrs.deflate(level);
        }
        let snrs = snrs.create(SNRS)?;

        tracing::info!(
            "Created store '{}' (L={}, {} classes, {:?} labels)",
            path.display(),
            schema.record_len,
            schema.num_classes,
            schema.label_encoding
        );

        Ok(Self {
            name: path.display().to_string(),
            file,
            iq,
            labels,
            snrs,
            schema,
            len: 0,
            writable: true,
        })
    }

    /// Read-only handle.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Self::from_file(path, file, false)
    }

    /// Read-write handle for appending to an existing store.
    pub fn open_append(path: &Path) -> Result<Self, StoreError> {
        let file = File::open_rw(path)?;
        Self::from_file(path, file, true)
    }

    fn from_file(path: &Path, file: File, writable: bool) -> Result<Self, StoreError> {
        let layout = Layout::read(&file)?;
        let [iq_len, label_len, snr_len] = layout.lengths;
        if iq_len != label_len || iq_len != snr_len {
            return Err(StoreError::MisalignedStore {
                iq: iq_len,
                labels: label_len,
                snrs: snr_len,
            });
        }
        tracing::debug!(
            "Opened store '{}': {} records, {:?}",
            path.display(),
            iq_len,
            layout.schema
        );

        Ok(Self {
            name: path.display().to_string(),
            file,
            iq: layout.iq,
            labels: layout.labels,
            snrs: layout.snrs,
            schema: layout.schema,
            len: iq_len,
            writable,
        })
    }

    /// Truncate every array to the shortest one.
    pub fn repair(path: &Path) -> Result<RepairReport, StoreError> {
        let file = File::open_rw(path)?;
        let layout = Layout::read(&file)?;
        let [iq, labels, snrs] = layout.lengths;
        let len = iq.min(labels).min(snrs);

        let report = RepairReport {
            iq,
            labels,
            snrs,
            len,
        };
        if report.rows_dropped() == 0 {
            tracing::info!("'{}' is aligned at {} records", path.display(), len);
            return Ok(report);
        }

        resize_all(&layout.iq, &layout.labels, &layout.snrs, &layout.schema, len)?;
        file.flush()?;
        tracing::warn!(
            "Truncated '{}' to {} records (iq={}, labels={}, snrs={})",
            path.display(),
            len,
            iq,
            labels,
            snrs
        );
        Ok(report)
    }

    pub fn schema(&self) -> StoreSchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reject a store whose schema differs from `requested`.
    pub fn check_schema(&self, requested: &StoreSchema) -> Result<(), StoreError> {
        if self.schema != *requested {
            return Err(StoreError::SchemaMismatch {
                store: self.schema,
                requested: *requested,
            });
        }
        Ok(())
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), StoreError> {
        if range.start > range.end || range.end > self.len {
            return Err(StoreError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: self.len,
            });
        }
        Ok(())
    }

    pub fn read_records(&self, range: Range<usize>) -> Result<RecordBatch, StoreError> {
        self.check_range(&range)?;
        let iq = read_iq(&self.iq, range.clone())?;
        let labels = self.read_labels(range.clone())?;
        let snrs = self.read_snrs(range)?;
        Ok(RecordBatch::new(iq, labels, snrs)?)
    }

    /// Class indices only, without touching the IQ array.
    pub fn read_labels(&self, range: Range<usize>) -> Result<Vec<usize>, StoreError> {
        self.check_range(&range)?;
        match self.schema.label_encoding {
            LabelEncoding::OneHot => {
                let raw = self
                    .labels
                    .read_slice::<f32, _, Ix2>(s![range.start..range.end, ..])?;
                raw.rows()
                    .into_iter()
                    .enumerate()
                    .map(|(i, row)| {
                        argmax(&row.to_vec()).ok_or(StoreError::Label(LabelError::EmptyRow {
                            row: range.start + i,
                        }))
                    })
                    .collect()
            }
            LabelEncoding::Index => Ok(self
                .labels
                .read_slice::<u16, _, Ix1>(s![range.start..range.end])?
                .iter()
                .map(|&v| usize::from(v))
                .collect()),
        }
    }

    pub fn read_snrs(&self, range: Range<usize>) -> Result<Vec<i8>, StoreError> {
        self.check_range(&range)?;
        Ok(self
            .snrs
            .read_slice::<i8, _, Ix1>(s![range.start..range.end])?
            .to_vec())
    }

    pub fn read_item(&self, index: usize) -> Result<IqItem, StoreError> {
        let batch = self.read_records(index..index + 1)?;
        batch.item(0).ok_or(StoreError::OutOfBounds {
            start: index,
            end: index + 1,
            len: self.len,
        })
    }

    /// Append every record of `batch`. Nothing is written unless the
    /// batch matches the schema; a failed write is rolled back.
    pub fn append_records(&mut self, batch: &RecordBatch) -> Result<(), StoreError> {
        self.append_with(batch, Self::write_tail)
    }

    /// `append_records` with the grow-and-write step supplied by the
    /// caller. On error all three arrays are cut back to their old
    /// length.
    fn append_with<W>(&mut self, batch: &RecordBatch, write: W) -> Result<(), StoreError>
    where
        W: FnOnce(&Self, &RecordBatch, &LabelRows, &Array1<i8>, Range<usize>) -> Result<(), StoreError>,
    {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        if batch.record_len() != self.schema.record_len {
            return Err(StoreError::ShapeMismatch {
                expected: self.schema.record_len,
                found: batch.record_len(),
            });
        }
        if let Some(&label) = batch
            .labels()
            .iter()
            .find(|&&l| l >= self.schema.num_classes)
        {
            return Err(StoreError::LabelOutOfRange {
                label,
                num_classes: self.schema.num_classes,
            });
        }
        if batch.is_empty() {
            return Ok(());
        }

        let labels = LabelRows::encode(batch.labels(), &self.schema)?;
        let snrs = Array1::from(batch.snrs().to_vec());

        let start = self.len;
        let end = start + batch.len();

        if let Err(e) = write(&*self, batch, &labels, &snrs, start..end) {
            tracing::warn!(
                "Append to '{}' failed, rolling back to {} records: {}",
                self.name,
                start,
                e
            );
            if let Err(rollback) =
                resize_all(&self.iq, &self.labels, &self.snrs, &self.schema, start)
            {
                tracing::error!("Rollback of '{}' failed: {}", self.name, rollback);
            }
            return Err(e);
        }

        self.len = end;
        self.file.flush()?;
        tracing::debug!("Appended {} records to '{}' (now {})", batch.len(), self.name, end);
        Ok(())
    }

    fn write_tail(
        &self,
        batch: &RecordBatch,
        labels: &LabelRows,
        snrs: &Array1<i8>,
        rows: Range<usize>,
    ) -> Result<(), StoreError> {
        let Range { start, end } = rows;
        resize_all(&self.iq, &self.labels, &self.snrs, &self.schema, end)?;
        self.iq.write_slice(batch.iq(), s![start..end, .., ..])?;
        match labels {
            LabelRows::OneHot(rows) => self.labels.write_slice(rows, s![start..end, ..])?,
            LabelRows::Index(idx) => self.labels.write_slice(idx, s![start..end])?,
        }
        self.snrs.write_slice(snrs, s![start..end])?;
        Ok(())
    }
}

impl RecordSource for IqStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.len
    }

    fn record_len(&self) -> usize {
        self.schema.record_len
    }

    fn label_width(&self) -> Option<usize> {
        Some(self.schema.num_classes)
    }

    fn read(&self, range: Range<usize>) -> anyhow::Result<RecordBatch> {
        Ok(self.read_records(range)?)
    }
}

impl RecordSink for IqStore {
    fn append(&mut self, batch: &RecordBatch) -> anyhow::Result<()> {
        Ok(self.append_records(batch)?)
    }

    fn len(&self) -> usize {
        self.len
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// The three arrays of a store, before alignment is checked.
struct Layout {
    iq: Dataset,
    labels: Dataset,
    snrs: Dataset,
    schema: StoreSchema,
    lengths: [usize; 3],
}

impl Layout {
    fn read(file: &File) -> Result<Self, StoreError> {
        let iq = file.dataset(IQ)?;
        let labels = file.dataset(LABELS)?;
        let snrs = file.dataset(SNRS)?;

        let iq_shape = iq.shape();
        let record_len = match iq_shape.as_slice() {
            [_, l, 2] => *l,
            other => {
                return Err(StoreError::Layout(format!(
                    "iq has shape {other:?}, expected [N, L, 2]"
                )))
            }
        };

        let label_shape = labels.shape();
        let (label_encoding, num_classes) = match label_shape.as_slice() {
            [_, c] => (LabelEncoding::OneHot, *c),
            [_] => {
                let stored = labels.attr(NUM_CLASSES_ATTR)?.read_1d::<u64>()?;
                let c = stored.first().copied().ok_or_else(|| {
                    StoreError::Layout(format!("empty '{NUM_CLASSES_ATTR}' attribute"))
                })?;
                (LabelEncoding::Index, c as usize)
            }
            other => {
                return Err(StoreError::Layout(format!(
                    "labels have shape {other:?}, expected [N, C] or [N]"
                )))
            }
        };

        let snr_shape = snrs.shape();
        if snr_shape.len() != 1 {
            return Err(StoreError::Layout(format!(
                "snrs have shape {snr_shape:?}, expected [N]"
            )));
        }

        Ok(Self {
            lengths: [iq_shape[0], label_shape[0], snr_shape[0]],
            iq,
            labels,
            snrs,
            schema: StoreSchema {
                record_len,
                num_classes,
                label_encoding,
            },
        })
    }
}

enum LabelRows {
    OneHot(Array2<f32>),
    Index(Array1<u16>),
}

impl LabelRows {
    fn encode(labels: &[usize], schema: &StoreSchema) -> Result<Self, StoreError> {
        match schema.label_encoding {
            LabelEncoding::OneHot => {
                let mut flat = Vec::with_capacity(labels.len() * schema.num_classes);
                for &label in labels {
                    flat.extend(one_hot(label, schema.num_classes)?);
                }
                let rows = Array2::from_shape_vec((labels.len(), schema.num_classes), flat)
                    .map_err(|e| StoreError::Layout(e.to_string()))?;
                Ok(LabelRows::OneHot(rows))
            }
            LabelEncoding::Index => {
                let idx = labels
                    .iter()
                    .map(|&l| {
                        u16::try_from(l).map_err(|_| StoreError::LabelOutOfRange {
                            label: l,
                            num_classes: schema.num_classes,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(LabelRows::Index(Array1::from(idx)))
            }
        }
    }
}

fn resize_all(
    iq: &Dataset,
    labels: &Dataset,
    snrs: &Dataset,
    schema: &StoreSchema,
    len: usize,
) -> Result<(), StoreError> {
    iq.resize((len, schema.record_len, 2_usize))?;
    match schema.label_encoding {
        LabelEncoding::OneHot => labels.resize((len, schema.num_classes))?,
        LabelEncoding::Index => labels.resize(len)?,
    }
    snrs.resize(len)?;
    Ok(())
}
