// ============================================================
// Layer 4 — NumPy .npz Record Source
// ============================================================
// Over-the-air captures are saved one file per capture run as
// NumPy archives with three members:
//
//   matrix   complex [N, L]  or  real [N, L, 2]
//   labels   integer class index per record
//   snrs     integer dB per record
//
// Complex matrices are unpacked into (I, Q) columns so every
// source hands the merge pipeline the same [N, L, 2] layout.
// A recording is small enough to load whole; the merge opens
// one file at a time.
//
// Captures live in directories named `npz` scattered across a
// tree organised by impairment/receiver/transmitter, so
// `discover` walks the tree and collects them in sorted order.

use std::fs::{self, File};
use std::io::{Read, Seek};
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use ndarray::{Array3, ArrayD, Axis, Ix2, IxDyn, OwnedRepr};
use ndarray_npy::NpzReader;
use num_complex::Complex;

use crate::data::h5_source::snr_to_i8;
use crate::domain::record::RecordBatch;
use crate::domain::taxonomy::argmax;
use crate::domain::traits::RecordSource;

/// Try each element type in turn and widen whatever matches to f64.
macro_rules! read_as_f64 {
    ($npz:expr, $idx:expr; $($t:ty),+ $(,)?) => {{
        let mut out: Option<ArrayD<f64>> = None;
        $(
            if out.is_none() {
                if let Ok(a) = $npz.by_index::<OwnedRepr<$t>, IxDyn>($idx) {
                    out = Some(a.mapv(|v| v as f64));
                }
            }
        )+
        out
    }};
}

pub struct NpzSource {
    name: String,
    batch: RecordBatch,
    label_width: Option<usize>,
}

impl NpzSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;
        let mut npz = NpzReader::new(file)
            .with_context(|| format!("'{}' is not an npz archive", path.display()))?;

        let iq = read_matrix(&mut npz).with_context(|| format!("'{}': matrix", path.display()))?;
        let (labels, label_width) =
            read_labels(&mut npz).with_context(|| format!("'{}': labels", path.display()))?;
        let snrs = read_snrs(&mut npz).with_context(|| format!("'{}': snrs", path.display()))?;

        let batch = RecordBatch::new(iq, labels, snrs)
            .with_context(|| format!("'{}'", path.display()))?;
        tracing::debug!(
            "Loaded '{}': {} records of length {}",
            path.display(),
            batch.len(),
            batch.record_len()
        );

        Ok(Self {
            name: path.display().to_string(),
            batch,
            label_width,
        })
    }
}

impl RecordSource for NpzSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.batch.len()
    }

    fn record_len(&self) -> usize {
        self.batch.record_len()
    }

    fn label_width(&self) -> Option<usize> {
        self.label_width
    }

    fn read(&self, range: Range<usize>) -> Result<RecordBatch> {
        ensure!(
            range.start <= range.end && range.end <= self.batch.len(),
            "range {:?} out of bounds for {} records in '{}'",
            range,
            self.batch.len(),
            self.name
        );
        Ok(self.batch.slice(range))
    }
}

/// Every `*.npz` directly inside a directory called `dir_name`
/// somewhere below `root`, sorted.
///
/// # Arguments
/// * `root`     - Top of the capture tree
/// * `dir_name` - Name of the directories holding captures, usually `npz`
///
/// Symlinked directories are not entered.
pub fn discover(root: &Path, dir_name: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("'{}' is not a directory", root.display());
    }

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let in_named_dir =
            dir != root && dir.file_name().and_then(|n| n.to_str()) == Some(dir_name);

        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            // Symlinked directories are not followed.
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if in_named_dir && path.extension().and_then(|e| e.to_str()) == Some("npz") {
                found.push(path);
            }
        }
    }

    found.sort();
    tracing::info!("Found {} npz files under '{}'", found.len(), root.display());
    Ok(found)
}

// ─── Member readers ───────────────────────────────────────────────────────────

fn member_index<R: Read + Seek>(npz: &mut NpzReader<R>, member: &str) -> Result<usize> {
    let names = npz.names()?;
    names
        .iter()
        .position(|n| n.trim_end_matches(".npy") == member)
        .ok_or_else(|| anyhow!("no member '{member}' (found {names:?})"))
}

fn read_matrix<R: Read + Seek>(npz: &mut NpzReader<R>) -> Result<Array3<f32>> {
    let idx = member_index(npz, "matrix")?;

    if let Ok(m) = npz.by_index::<OwnedRepr<Complex<f32>>, IxDyn>(idx) {
        return complex_to_iq(m.mapv(|z| Complex::new(f64::from(z.re), f64::from(z.im))));
    }
    if let Ok(m) = npz.by_index::<OwnedRepr<Complex<f64>>, IxDyn>(idx) {
        return complex_to_iq(m);
    }

    let real = read_as_f64!(npz, idx; f32, f64, i16, i32, i8)
        .ok_or_else(|| anyhow!("unsupported element type"))?;
    let shape = real.shape().to_vec();
    ensure!(
        shape.len() == 3 && shape[2] == 2,
        "real matrix has shape {shape:?}, expected [N, L, 2]"
    );
    Ok(Array3::from_shape_fn((shape[0], shape[1], 2), |(r, s, c)| {
        real[[r, s, c]] as f32
    }))
}

fn complex_to_iq(m: ArrayD<Complex<f64>>) -> Result<Array3<f32>> {
    let shape = m.shape().to_vec();
    let m = m
        .into_dimensionality::<Ix2>()
        .map_err(|_| anyhow!("complex matrix has shape {shape:?}, expected [N, L]"))?;
    let (n, len) = m.dim();
    Ok(Array3::from_shape_fn((n, len, 2), |(r, s, c)| {
        let z = m[[r, s]];
        (if c == 0 { z.re } else { z.im }) as f32
    }))
}

/// Class indices, plus the row width when the labels were one-hot.
fn read_labels<R: Read + Seek>(npz: &mut NpzReader<R>) -> Result<(Vec<usize>, Option<usize>)> {
    let idx = member_index(npz, "labels")?;
    let raw = read_as_f64!(npz, idx; i64, i32, i16, i8, u8, u16, u32, u64, f32, f64)
        .ok_or_else(|| anyhow!("unsupported element type"))?;

    match raw.ndim() {
        1 => {
            let labels = raw
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    ensure!(v >= 0.0 && v.fract() == 0.0, "label {v} at record {i} is not a class index");
                    Ok(v as usize)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((labels, None))
        }
        2 => {
            let width = raw.len_of(Axis(1));
            let labels = raw
                .outer_iter()
                .enumerate()
                .map(|(i, row)| {
                    let row: Vec<f32> = row.iter().map(|&v| v as f32).collect();
                    argmax(&row).ok_or_else(|| anyhow!("label row {i} has no positive entry"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((labels, Some(width)))
        }
        n => bail!("labels have {n} dimensions"),
    }
}

fn read_snrs<R: Read + Seek>(npz: &mut NpzReader<R>) -> Result<Vec<i8>> {
    let idx = member_index(npz, "snrs")?;
    let raw = read_as_f64!(npz, idx; i64, i32, i16, i8, f32, f64)
        .ok_or_else(|| anyhow!("unsupported element type"))?;
    ensure!(
        raw.ndim() == 1 || (raw.ndim() == 2 && raw.len_of(Axis(1)) == 1),
        "snrs have shape {:?}, expected [N] or [N, 1]",
        raw.shape()
    );
    raw.iter()
        .enumerate()
        .map(|(i, &v)| snr_to_i8(v).with_context(|| format!("record {i}")))
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use ndarray_npy::NpzWriter;

    fn write_complex_npz(path: &Path, n: usize, len: usize) {
        let mut npz = NpzWriter::new(File::create(path).unwrap());
        let matrix = Array2::from_shape_fn((n, len), |(r, s)| {
            Complex::new(r as f32 + s as f32, -(s as f32))
        });
        let labels = Array1::from_shape_fn(n, |r| (r % 8) as i64);
        let snrs = Array1::from_shape_fn(n, |r| r as i64 * 5);
        npz.add_array("matrix", &matrix).unwrap();
        npz.add_array("labels", &labels).unwrap();
        npz.add_array("snrs", &snrs).unwrap();
        npz.finish().unwrap();
    }

    #[test]
    fn test_complex_matrix_is_unpacked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.npz");
        write_complex_npz(&path, 3, 5);

        let src = NpzSource::open(&path).unwrap();
        assert_eq!(src.len(), 3);
        assert_eq!(src.record_len(), 5);
        assert_eq!(src.label_width(), None);

        let b = src.read(1..3).unwrap();
        assert_eq!(b.labels(), &[1, 2]);
        assert_eq!(b.snrs(), &[5, 10]);
        // record 1, sample 4 → (1 + 4) - 4j
        assert_eq!(b.iq()[[0, 4, 0]], 5.0);
        assert_eq!(b.iq()[[0, 4, 1]], -4.0);
    }

    #[test]
    fn test_real_matrix_and_one_hot_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("real.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            let matrix = Array3::<f64>::from_elem((2, 4, 2), 0.5);
            let labels = Array2::from_shape_vec((2, 3), vec![0.0_f32, 0.0, 1.0, 1.0, 0.0, 0.0]).unwrap();
            let snrs = Array2::from_shape_vec((2, 1), vec![-10_i32, 20]).unwrap();
            npz.add_array("matrix", &matrix).unwrap();
            npz.add_array("labels", &labels).unwrap();
            npz.add_array("snrs", &snrs).unwrap();
            npz.finish().unwrap();
        }
        let src = NpzSource::open(&path).unwrap();
        assert_eq!(src.label_width(), Some(3));
        let b = src.read(0..2).unwrap();
        assert_eq!(b.labels(), &[2, 0]);
        assert_eq!(b.snrs(), &[-10, 20]);
        assert_eq!(b.iq()[[1, 3, 1]], 0.5);
    }

    #[test]
    fn test_missing_member_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("matrix", &Array3::<f32>::zeros((1, 2, 2))).unwrap();
            npz.finish().unwrap();
        }
        let err = NpzSource::open(&path).err().unwrap();
        assert!(format!("{err:#}").contains("labels"));
    }

    #[test]
    fn test_discover_only_named_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let a = root.join("snr10/tx_usrp/npz");
        let b = root.join("snr20/npz");
        let other = root.join("snr20/raw");
        for d in [&a, &b, &other] {
            fs::create_dir_all(d).unwrap();
        }
        write_complex_npz(&a.join("0.npz"), 1, 2);
        write_complex_npz(&b.join("1.npz"), 1, 2);
        write_complex_npz(&other.join("2.npz"), 1, 2);
        fs::write(b.join("notes.txt"), "x").unwrap();

        let found = discover(root, "npz").unwrap();
        assert_eq!(found, vec![a.join("0.npz"), b.join("1.npz")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_ignores_symlinked_directory_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let npz = root.join("snr10/npz");
        fs::create_dir_all(&npz).unwrap();
        write_complex_npz(&npz.join("0.npz"), 1, 2);
        std::os::unix::fs::symlink(root, npz.join("loop")).unwrap();

        let found = discover(root, "npz").unwrap();
        assert_eq!(found, vec![npz.join("0.npz")]);
    }

    #[test]
    fn test_discover_missing_root() {
        assert!(discover(Path::new("/definitely/not/here"), "npz").is_err());
    }
}
