// ============================================================
// Layer 2 — ReportUseCase
// ============================================================
// Turns a prediction CSV (True_label, Predicted_label, SNR) into
// an EvaluationReport: accuracy, confusion matrix, per-class
// recall and the accuracy-vs-SNR curve.
//
// Class names come from an explicit taxonomy or from the
// manifest of the store the predictions were made on.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::domain::taxonomy::{ClassList, ClassSpec};
use crate::infra::manifest::DatasetManifest;
use crate::infra::metrics::{read_predictions, EvaluationReport};

#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    pub predictions: PathBuf,
    /// Where to write the JSON report, if anywhere
    pub output: Option<PathBuf>,
    pub classes: Option<ClassSpec>,
    /// Store whose manifest names the classes
    pub store: Option<PathBuf>,
}

pub struct ReportUseCase {
    config: ReportConfig,
}

impl ReportUseCase {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        let cfg = &self.config;
        let rows = read_predictions(&cfg.predictions)?;
        let classes = self.classes()?;

        let report = EvaluationReport::from_rows(&rows, classes.as_ref())
            .with_context(|| format!("Cannot score '{}'", cfg.predictions.display()))?;
        tracing::info!(
            "{} predictions, accuracy {:.2}%",
            report.total,
            report.accuracy * 100.0
        );

        if let Some(path) = &cfg.output {
            report.save(path)?;
            tracing::info!("Saved report to '{}'", path.display());
        }
        Ok(report)
    }

    fn classes(&self) -> Result<Option<ClassList>> {
        let cfg = &self.config;
        if let Some(spec) = &cfg.classes {
            return Ok(Some(spec.resolve()?));
        }
        match &cfg.store {
            Some(store) => Ok(DatasetManifest::load_optional(store)?.map(|m| m.classes)),
            None => Ok(None),
        }
    }
}
