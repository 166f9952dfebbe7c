// ============================================================
// Layer 4 — HDF5 Record Source
// ============================================================
// Reads aligned IQ / label / SNR arrays out of an HDF5 file.
//
// Layouts seen in practice:
//
//   DeepSig 2018      X [N, 1024, 2] f32   Y [N, 24] one-hot   Z [N, 1] i64
//   merged store      iq [N, L, 2]  f32    labels [N, C]        snrs [N]  i8
//   index labels      ...                  labels [N]  u16      ...
//
// Unless names are given, the first three members in the file's
// (alphabetical) member order are taken as iq, labels and snrs.
// That matches both layouts above.
//
// Records are read by range, so a merge streams the file in
// chunks instead of pulling it into memory at once.

use std::ops::Range;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use hdf5::Dataset;
use ndarray::{s, Array3, Ix1, Ix2, Ix3};
use serde::{Deserialize, Serialize};

use crate::domain::record::RecordBatch;
use crate::domain::taxonomy::{argmax, LabelError};
use crate::domain::traits::RecordSource;

/// Explicit member names for the three arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetNames {
    pub iq: String,
    pub labels: String,
    pub snrs: String,
}

impl Default for DatasetNames {
    fn default() -> Self {
        Self {
            iq: "iq".to_string(),
            labels: "labels".to_string(),
            snrs: "snrs".to_string(),
        }
    }
}

pub struct H5Source {
    name: String,
    _file: hdf5::File,
    iq: Dataset,
    labels: Dataset,
    snrs: Dataset,
    len: usize,
    record_len: usize,
    label_width: Option<usize>,
}

impl H5Source {
    pub fn open(path: &Path, names: Option<&DatasetNames>) -> Result<Self> {
        let file = hdf5::File::open(path)
            .with_context(|| format!("Cannot open HDF5 file '{}'", path.display()))?;

        let names = match names {
            Some(n) => n.clone(),
            None => {
                let members = file.member_names()?;
                if members.len() < 3 {
                    bail!(
                        "'{}' has {} members, expected iq, labels and snrs",
                        path.display(),
                        members.len()
                    );
                }
                DatasetNames {
                    iq: members[0].clone(),
                    labels: members[1].clone(),
                    snrs: members[2].clone(),
                }
            }
        };
        tracing::debug!("Opening '{}' with members {:?}", path.display(), names);

        let open = |member: &str| {
            file.dataset(member)
                .with_context(|| format!("'{}' has no dataset '{member}'", path.display()))
        };
        let iq = open(&names.iq)?;
        let labels = open(&names.labels)?;
        let snrs = open(&names.snrs)?;

        let iq_shape = iq.shape();
        ensure!(
            iq_shape.len() == 3 && iq_shape[2] == 2,
            "'{}': iq dataset '{}' has shape {:?}, expected [N, L, 2]",
            path.display(),
            names.iq,
            iq_shape
        );
        let len = iq_shape[0];
        let record_len = iq_shape[1];

        let label_shape = labels.shape();
        let label_width = match label_shape.as_slice() {
            [_] => None,
            [_, width] => Some(*width),
            other => bail!(
                "'{}': label dataset has shape {:?}, expected [N] or [N, C]",
                path.display(),
                other
            ),
        };

        let snr_shape = snrs.shape();
        ensure!(
            matches!(snr_shape.as_slice(), [_] | [_, 1]),
            "'{}': snr dataset has shape {:?}, expected [N] or [N, 1]",
            path.display(),
            snr_shape
        );

        ensure!(
            label_shape[0] == len && snr_shape[0] == len,
            "'{}': misaligned arrays (iq={}, labels={}, snrs={})",
            path.display(),
            len,
            label_shape[0],
            snr_shape[0]
        );

        Ok(Self {
            name: path.display().to_string(),
            _file: file,
            iq,
            labels,
            snrs,
            len,
            record_len,
            label_width,
        })
    }
}

impl RecordSource for H5Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.len
    }

    fn record_len(&self) -> usize {
        self.record_len
    }

    fn label_width(&self) -> Option<usize> {
        self.label_width
    }

    fn read(&self, range: Range<usize>) -> Result<RecordBatch> {
        ensure!(
            range.start <= range.end && range.end <= self.len,
            "range {:?} out of bounds for {} records in '{}'",
            range,
            self.len,
            self.name
        );
        let iq = read_iq(&self.iq, range.clone())?;
        let labels = read_label_indices(&self.labels, range.clone())?;
        let snrs = read_snrs(&self.snrs, range)?;
        Ok(RecordBatch::new(iq, labels, snrs)?)
    }
}

// ─── Shared slab readers ──────────────────────────────────────────────────────
// Used by both H5Source and IqStore. HDF5 converts the stored
// numeric type on read, so f64 IQ or i64 SNR files come through
// the same path.

pub(crate) fn read_iq(ds: &Dataset, range: Range<usize>) -> hdf5::Result<Array3<f32>> {
    ds.read_slice::<f32, _, Ix3>(s![range.start..range.end, .., ..])
}

/// Labels as class indices, whatever the on-disk encoding.
pub(crate) fn read_label_indices(ds: &Dataset, range: Range<usize>) -> Result<Vec<usize>> {
    match ds.ndim() {
        1 => {
            let raw = ds.read_slice::<f64, _, Ix1>(s![range.start..range.end])?;
            raw.iter()
                .enumerate()
                .map(|(i, &v)| {
                    ensure!(
                        v >= 0.0 && v.fract() == 0.0,
                        "label {v} at record {} is not a class index",
                        range.start + i
                    );
                    Ok(v as usize)
                })
                .collect()
        }
        2 => {
            let raw = ds.read_slice::<f32, _, Ix2>(s![range.start..range.end, ..])?;
            raw.rows()
                .into_iter()
                .enumerate()
                .map(|(i, row)| {
                    let row = row.to_vec();
                    argmax(&row).ok_or_else(|| {
                        anyhow::Error::from(LabelError::EmptyRow {
                            row: range.start + i,
                        })
                    })
                })
                .collect()
        }
        n => bail!("label dataset has {n} dimensions"),
    }
}

pub(crate) fn read_snrs(ds: &Dataset, range: Range<usize>) -> Result<Vec<i8>> {
    let raw: Vec<f64> = match ds.ndim() {
        1 => ds
            .read_slice::<f64, _, Ix1>(s![range.start..range.end])?
            .to_vec(),
        2 => ds
            .read_slice::<f64, _, Ix2>(s![range.start..range.end, 0..1])?
            .iter()
            .copied()
            .collect(),
        n => bail!("snr dataset has {n} dimensions"),
    };
    raw.into_iter()
        .enumerate()
        .map(|(i, v)| snr_to_i8(v).with_context(|| format!("record {}", range.start + i)))
        .collect()
}

/// Round an SNR value to whole dB; it must fit in an i8.
pub(crate) fn snr_to_i8(v: f64) -> Result<i8> {
    let rounded = v.round();
    ensure!(
        rounded.is_finite() && rounded >= f64::from(i8::MIN) && rounded <= f64::from(i8::MAX),
        "SNR {v} does not fit in an i8"
    );
    Ok(rounded as i8)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    /// Writes a DeepSig-style file: X f32, Y one-hot, Z [N, 1] i64.
    fn write_deepsig_like(path: &Path, n: usize, len: usize, width: usize) {
        let file = hdf5::File::create(path).unwrap();
        let x = Array3::from_shape_fn((n, len, 2), |(r, s, c)| (r * 10 + s + c) as f32);
        let y = Array2::from_shape_fn((n, width), |(r, c)| if c == r % width { 1.0_f32 } else { 0.0 });
        let z = Array2::from_shape_fn((n, 1), |(r, _)| r as i64 * 2 - 4);
        file.new_dataset_builder().with_data(&x).create("X").unwrap();
        file.new_dataset_builder().with_data(&y).create("Y").unwrap();
        file.new_dataset_builder().with_data(&z).create("Z").unwrap();
    }

    #[test]
    fn test_reads_first_three_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.h5");
        write_deepsig_like(&path, 6, 8, 4);

        let src = H5Source::open(&path, None).unwrap();
        assert_eq!(src.len(), 6);
        assert_eq!(src.record_len(), 8);
        assert_eq!(src.label_width(), Some(4));

        let batch = src.read(2..5).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.labels(), &[2, 3, 0]);
        assert_eq!(batch.snrs(), &[0, 2, 4]);
        assert_eq!(batch.iq()[[0, 1, 1]], 22.0);
    }

    #[test]
    fn test_explicit_names_and_index_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.h5");
        {
            let file = hdf5::File::create(&path).unwrap();
            let iq = Array3::<f64>::zeros((3, 4, 2));
            let labels = Array1::from(vec![2_u16, 0, 1]);
            let snrs = Array1::from(vec![10.0_f32, -2.4, 30.0]);
            file.new_dataset_builder().with_data(&iq).create("signal").unwrap();
            file.new_dataset_builder().with_data(&labels).create("mod").unwrap();
            file.new_dataset_builder().with_data(&snrs).create("snr").unwrap();
        }
        let names = DatasetNames {
            iq: "signal".into(),
            labels: "mod".into(),
            snrs: "snr".into(),
        };
        let src = H5Source::open(&path, Some(&names)).unwrap();
        assert_eq!(src.label_width(), None);
        let batch = src.read(0..3).unwrap();
        assert_eq!(batch.labels(), &[2, 0, 1]);
        assert_eq!(batch.snrs(), &[10, -2, 30]);
    }

    #[test]
    fn test_out_of_bounds_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.h5");
        write_deepsig_like(&path, 2, 4, 2);
        let src = H5Source::open(&path, None).unwrap();
        assert!(src.read(1..3).is_err());
    }

    #[test]
    fn test_misaligned_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.h5");
        {
            let file = hdf5::File::create(&path).unwrap();
            let iq = Array3::<f32>::zeros((3, 4, 2));
            let labels = Array1::from(vec![0_u16, 1]);
            let snrs = Array1::from(vec![0_i8, 0, 0]);
            file.new_dataset_builder().with_data(&iq).create("iq").unwrap();
            file.new_dataset_builder().with_data(&labels).create("labels").unwrap();
            file.new_dataset_builder().with_data(&snrs).create("snrs").unwrap();
        }
        let err = H5Source::open(&path, None).err().unwrap();
        assert!(err.to_string().contains("misaligned"));
    }

    #[test]
    fn test_snr_range_check() {
        assert_eq!(snr_to_i8(-20.0).unwrap(), -20);
        assert_eq!(snr_to_i8(4.6).unwrap(), 5);
        assert!(snr_to_i8(300.0).is_err());
        assert!(snr_to_i8(f64::NAN).is_err());
    }
}
