// ============================================================
// Layer 6 — Dataset Manifest
// ============================================================
// Every store written by merge / subset / resegment gets a JSON
// sidecar describing how it was built:
//
//   merged.h5
//   merged.h5.manifest.json
//
//   {
//     "classes": ["OOK", "4ASK", ...],
//     "label_encoding": "one_hot",
//     "record_len": 1024,
//     "total_records": 2555904,
//     "sources": [
//       { "name": "GOLD_XYZ_OSC.0001_1024.hdf5", "read": 2555904,
//         "appended": 2555904, "dropped": 0, "normalized": true }
//     ]
//   }
//
// The store itself only knows the class count; the manifest
// supplies the class names for inspect / split / export.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::taxonomy::{ClassList, LabelEncoding};

/// What happened to one source during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub name: String,
    /// Records read from the source
    pub read: usize,
    /// Records written to the store
    pub appended: usize,
    /// Records whose class had no unified counterpart
    pub dropped: usize,
    pub normalized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub classes: ClassList,
    pub label_encoding: LabelEncoding,
    pub record_len: usize,
    pub total_records: usize,
    pub sources: Vec<SourceReport>,
}

impl DatasetManifest {
    pub fn new(classes: ClassList, label_encoding: LabelEncoding, record_len: usize) -> Self {
        Self {
            classes,
            label_encoding,
            record_len,
            total_records: 0,
            sources: Vec::new(),
        }
    }

    pub fn push(&mut self, report: SourceReport) {
        self.total_records += report.appended;
        self.sources.push(report);
    }

    /// Write `<store>.manifest.json`.
    pub fn save(&self, store: &Path) -> Result<PathBuf> {
        let path = manifest_path(store);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write manifest to '{}'", path.display()))?;
        tracing::debug!("Saved manifest to '{}'", path.display());
        Ok(path)
    }

    pub fn load(store: &Path) -> Result<Self> {
        let path = manifest_path(store);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read manifest '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed manifest '{}'", path.display()))
    }

    /// `None` when the store has no sidecar.
    pub fn load_optional(store: &Path) -> Result<Option<Self>> {
        if !manifest_path(store).exists() {
            return Ok(None);
        }
        Self::load(store).map(Some)
    }
}

pub fn manifest_path(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_owned();
    name.push(".manifest.json");
    PathBuf::from(name)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            manifest_path(Path::new("data/merged.h5")),
            PathBuf::from("data/merged.h5.manifest.json")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("merged.h5");

        let mut m = DatasetManifest::new(
            ClassList::new(["BPSK", "QPSK"]).unwrap(),
            LabelEncoding::OneHot,
            1024,
        );
        m.push(SourceReport {
            name: "a.h5".into(),
            read: 10,
            appended: 8,
            dropped: 2,
            normalized: false,
        });
        m.push(SourceReport {
            name: "b.npz".into(),
            read: 5,
            appended: 5,
            dropped: 0,
            normalized: true,
        });
        assert_eq!(m.total_records, 13);

        m.save(&store).unwrap();
        assert_eq!(DatasetManifest::load(&store).unwrap(), m);
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DatasetManifest::load_optional(&dir.path().join("x.h5")).unwrap().is_none());
        assert!(DatasetManifest::load(&dir.path().join("x.h5")).is_err());
    }
}
