// ============================================================
// Layer 6 — Evaluation Metrics
// ============================================================
// A test run of the classifier leaves a prediction CSV with one
// row per test record:
//
//   True_label,Predicted_label,SNR
//   3,3,-10
//   14,12,6
//   ...
//
// From it we derive:
//   - overall accuracy
//   - the confusion matrix (rows = true class, cols = predicted)
//   - recall per class
//   - accuracy per SNR, sorted by SNR
//
// Low-SNR records are expected to be near chance; the per-SNR
// curve is what tells two models apart.
//
// Labels index a square matrix, so a corrupt label must not be
// allowed to size it: with a known class list every label has to
// be below its length, without one the matrix stops at
// MAX_CLASSES.

/// Widest confusion matrix built when the class list is unknown.
pub const MAX_CLASSES: usize = 1024;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::taxonomy::ClassList;

/// One prediction, as written by the test loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(rename = "True_label")]
    pub true_label: usize,

    #[serde(rename = "Predicted_label")]
    pub predicted_label: usize,

    /// SNR in dB. Some writers emit it as a float.
    #[serde(rename = "SNR")]
    pub snr: f64,
}

impl PredictionRow {
    pub fn is_correct(&self) -> bool {
        self.true_label == self.predicted_label
    }

    fn snr_db(&self) -> i32 {
        self.snr.round() as i32
    }
}

/// Read a prediction CSV.
///
/// # Errors
/// A row that does not parse, or whose SNR is NaN or infinite, fails
/// the whole read with its 1-based row number.
pub fn read_predictions(path: &Path) -> Result<Vec<PredictionRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Cannot open predictions '{}'", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<PredictionRow>().enumerate() {
        let row = record
            .with_context(|| format!("Malformed predictions '{}' row {}", path.display(), i + 1))?;
        ensure!(
            row.snr.is_finite(),
            "'{}' row {}: SNR {} is not a finite number",
            path.display(),
            i + 1,
            row.snr
        );
        rows.push(row);
    }
    tracing::debug!("Read {} predictions from '{}'", rows.len(), path.display());
    Ok(rows)
}

#[cfg(test)]
pub fn write_predictions(path: &Path, rows: &[PredictionRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ─── ConfusionMatrix ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn new(width: usize) -> Self {
        Self {
            counts: vec![vec![0; width]; width],
        }
    }

    /// Count every row. The matrix is at least `num_classes` wide and
    /// grows to cover the largest label seen.
    pub fn from_rows(rows: &[PredictionRow], num_classes: usize) -> Result<Self> {
        let mut m = Self::new(num_classes);
        for (i, row) in rows.iter().enumerate() {
            m.record(row.true_label, row.predicted_label)
                .with_context(|| format!("prediction {}", i + 1))?;
        }
        Ok(m)
    }

    /// Count one prediction, widening the matrix up to `MAX_CLASSES`.
    pub fn record(&mut self, actual: usize, predicted: usize) -> Result<()> {
        let needed = actual.max(predicted) + 1;
        if needed > self.width() {
            if needed > MAX_CLASSES {
                bail!(
                    "label {} is beyond the {} classes a report can hold",
                    needed - 1,
                    MAX_CLASSES
                );
            }
            for r in &mut self.counts {
                r.resize(needed, 0);
            }
            self.counts.resize(needed, vec![0; needed]);
        }
        self.counts[actual][predicted] += 1;
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..self.width()).map(|i| self.counts[i][i]).sum()
    }

    /// 0.0 for an empty matrix.
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Recall per true class; `None` for classes with no records.
    pub fn recall(&self) -> Vec<Option<f64>> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let total: u64 = row.iter().sum();
                (total > 0).then(|| ratio(row[i], total))
            })
            .collect()
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

// ─── Per-SNR accuracy ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrAccuracy {
    pub snr: i32,
    pub total: u64,
    pub correct: u64,
    pub accuracy: f64,
}

pub fn per_snr_accuracy(rows: &[PredictionRow]) -> Vec<SnrAccuracy> {
    let mut by_snr: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let entry = by_snr.entry(row.snr_db()).or_default();
        entry.0 += 1;
        if row.is_correct() {
            entry.1 += 1;
        }
    }
    by_snr
        .into_iter()
        .map(|(snr, (total, correct))| SnrAccuracy {
            snr,
            total,
            correct,
            accuracy: ratio(correct, total),
        })
        .collect()
}

// ─── EvaluationReport ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub total: u64,
    pub correct: u64,
    pub accuracy: f64,
    /// Class names, when known, in index order
    pub classes: Option<Vec<String>>,
    pub confusion: Vec<Vec<u64>>,
    pub recall: Vec<Option<f64>>,
    pub per_snr: Vec<SnrAccuracy>,
}

impl EvaluationReport {
    /// With `classes`, every label must name one of them.
    pub fn from_rows(rows: &[PredictionRow], classes: Option<&ClassList>) -> Result<Self> {
        if let Some(classes) = classes {
            for (i, row) in rows.iter().enumerate() {
                let label = row.true_label.max(row.predicted_label);
                ensure!(
                    label < classes.len(),
                    "prediction {}: label {} but only {} classes",
                    i + 1,
                    label,
                    classes.len()
                );
            }
        }
        let matrix = ConfusionMatrix::from_rows(rows, classes.map_or(0, ClassList::len))?;
        Ok(Self {
            total: matrix.total(),
            correct: matrix.correct(),
            accuracy: matrix.accuracy(),
            classes: classes.map(|c| c.names().to_vec()),
            recall: matrix.recall(),
            confusion: matrix.counts().to_vec(),
            per_snr: per_snr_accuracy(rows),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write report to '{}'", path.display()))?;
        Ok(())
    }
}
