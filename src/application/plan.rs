// ============================================================
// Layer 2 — Merge Plan
// ============================================================
// A merge run is described by a JSON file rather than a wall
// of flags, since each source carries its own label rules:
//
//   {
//     "output": "data/merged.h5",
//     "classes": ["BPSK", "QPSK", "8PSK", "16QAM", "64QAM",
//                 "GFSK", "CPFSK", "PAM4", "other"],
//     "label_encoding": "one_hot",
//     "sources": [
//       { "kind": "npz_tree", "root": "recordings", "normalize": true },
//       { "kind": "h5", "path": "GOLD_XYZ_OSC.0001_1024.hdf5",
//         "classes": "deepsig2018", "normalize": true,
//         "match_names": false, "default_class": "other",
//         "skip": ["16APSK", "32APSK", "AM-SSB-SC", "AM-DSB-WC", "OQPSK"] }
//     ]
//   }
//
// A source without "classes" is read against the first
// `label_width` unified classes, i.e. its index i is unified
// class i.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::h5_source::DatasetNames;
use crate::data::store::StoreOptions;
use crate::domain::taxonomy::{ClassList, ClassSpec, LabelEncoding, LabelMap, RemapRules};

// ─── Defaults ─────────────────────────────────────────────────────────────────
fn default_chunk_records() -> usize {
    1024
}

fn default_compression() -> Option<u8> {
    Some(4)
}

fn default_npz_dir() -> String {
    "npz".to_string()
}

// ─── SourceOptions ────────────────────────────────────────────────────────────
/// Label and preprocessing options shared by every source kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOptions {
    /// The source's own taxonomy
    #[serde(default)]
    pub classes: Option<ClassSpec>,

    /// Scale every record to unit column variance
    #[serde(default)]
    pub normalize: bool,

    /// Read at most this many records from the source
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(flatten)]
    pub remap: RemapRules,
}

impl SourceOptions {
    /// The source taxonomy: explicit, or a prefix of `unified` as wide
    /// as the source's labels.
    pub fn source_classes(
        &self,
        unified: &ClassList,
        label_width: Option<usize>,
    ) -> Result<ClassList> {
        match (&self.classes, label_width) {
            (Some(spec), width) => {
                let classes = spec.resolve()?;
                if let Some(w) = width {
                    ensure!(
                        w == classes.len(),
                        "labels are {w} wide but the source lists {} classes",
                        classes.len()
                    );
                }
                Ok(classes)
            }
            (None, Some(w)) => {
                ensure!(
                    w <= unified.len(),
                    "labels are {w} wide but only {} unified classes exist; \
                     give the source its own \"classes\"",
                    unified.len()
                );
                Ok(ClassList::new(unified.names()[..w].iter().cloned())?)
            }
            (None, None) => Ok(unified.clone()),
        }
    }

    pub fn label_map(&self, unified: &ClassList, label_width: Option<usize>) -> Result<LabelMap> {
        let source = self.source_classes(unified, label_width)?;
        Ok(LabelMap::build(&source, unified, &self.remap)?)
    }
}

// ─── SourceSpec ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// One HDF5 file.
    H5 {
        path: PathBuf,
        #[serde(default)]
        datasets: Option<DatasetNames>,
        #[serde(flatten)]
        options: SourceOptions,
    },
    /// Every .npz inside directories named `dir_name` below `root`.
    NpzTree {
        root: PathBuf,
        #[serde(default = "default_npz_dir")]
        dir_name: String,
        #[serde(flatten)]
        options: SourceOptions,
    },
}

impl SourceSpec {
    pub fn options(&self) -> &SourceOptions {
        match self {
            SourceSpec::H5 { options, .. } | SourceSpec::NpzTree { options, .. } => options,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SourceSpec::H5 { path, .. } => path.display().to_string(),
            SourceSpec::NpzTree { root, dir_name, .. } => {
                format!("{}/**/{}/*.npz", root.display(), dir_name)
            }
        }
    }
}

// ─── MergePlan ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePlan {
    pub output: PathBuf,

    /// The unified taxonomy of the output store
    pub classes: ClassSpec,

    #[serde(default)]
    pub label_encoding: LabelEncoding,

    #[serde(default = "default_chunk_records")]
    pub chunk_records: usize,

    /// Deflate level, `null` for none
    #[serde(default = "default_compression")]
    pub compression: Option<u8>,

    /// Replace an existing output file
    #[serde(default)]
    pub overwrite: bool,

    /// Append to an existing output store instead of creating one
    #[serde(default)]
    pub append: bool,

    pub sources: Vec<SourceSpec>,
}

impl MergePlan {
    pub fn new(output: PathBuf, classes: ClassSpec, sources: Vec<SourceSpec>) -> Self {
        Self {
            output,
            classes,
            label_encoding: LabelEncoding::default(),
            chunk_records: default_chunk_records(),
            compression: default_compression(),
            overwrite: false,
            append: false,
            sources,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read plan '{}'", path.display()))?;
        let plan: Self = serde_json::from_str(&json)
            .with_context(|| format!("Malformed plan '{}'", path.display()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check everything that can be checked without opening a source,
    /// and return the unified class list.
    pub fn validate(&self) -> Result<ClassList> {
        ensure!(!self.sources.is_empty(), "plan has no sources");
        ensure!(self.chunk_records > 0, "chunk_records must be positive");
        if let Some(level) = self.compression {
            ensure!(level <= 9, "compression level {level} is not in 0-9");
        }
        if self.overwrite && self.append {
            bail!("overwrite and append are mutually exclusive");
        }

        let unified = self.classes.resolve().context("output classes")?;
        ensure!(!unified.is_empty(), "output class list is empty");

        for (i, spec) in self.sources.iter().enumerate() {
            let options = spec.options();
            let ctx = || format!("source {} ({})", i + 1, spec.describe());

            if let Some(default) = &options.remap.default_class {
                ensure!(
                    unified.position(default).is_some(),
                    "{}: default class '{default}' is not an output class",
                    ctx()
                );
            }
            for target in options.remap.rename.values() {
                ensure!(
                    unified.position(target).is_some(),
                    "{}: rename target '{target}' is not an output class",
                    ctx()
                );
            }
            // With an explicit taxonomy the whole map can be built now.
            if options.classes.is_some() {
                options.label_map(&unified, None).with_context(ctx)?;
            }
        }
        Ok(unified)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            chunk_records: self.chunk_records,
            compression: self.compression,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{
        "output": "merged.h5",
        "classes": ["BPSK", "QPSK", "other"],
        "sources": [
            { "kind": "npz_tree", "root": "recordings", "normalize": true },
            { "kind": "h5", "path": "gold.h5", "classes": "deepsig2018",
              "match_names": false, "default_class": "other",
              "skip": ["OOK"], "limit": 100 }
        ]
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let plan: MergePlan = serde_json::from_str(PLAN).unwrap();
        assert_eq!(plan.chunk_records, 1024);
        assert_eq!(plan.compression, Some(4));
        assert_eq!(plan.label_encoding, LabelEncoding::OneHot);
        assert!(!plan.overwrite && !plan.append);

        match &plan.sources[0] {
            SourceSpec::NpzTree { dir_name, options, .. } => {
                assert_eq!(dir_name, "npz");
                assert!(options.normalize);
                assert!(options.remap.match_names);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &plan.sources[1] {
            SourceSpec::H5 { options, datasets, .. } => {
                assert!(datasets.is_none());
                assert_eq!(options.limit, Some(100));
                assert!(!options.remap.match_names);
                assert_eq!(options.remap.skip, vec!["OOK".to_string()]);
                assert_eq!(options.remap.default_class.as_deref(), Some("other"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let unified = plan.validate().unwrap();
        assert_eq!(unified.len(), 3);
    }

    #[test]
    fn test_validate_catches_bad_default_class() {
        let mut plan: MergePlan = serde_json::from_str(PLAN).unwrap();
        if let SourceSpec::H5 { options, .. } = &mut plan.sources[1] {
            options.remap.default_class = Some("misc".into());
        }
        let err = plan.validate().unwrap_err();
        assert!(format!("{err:#}").contains("misc"));
    }

    #[test]
    fn test_validate_catches_unknown_skip_name() {
        let mut plan: MergePlan = serde_json::from_str(PLAN).unwrap();
        if let SourceSpec::H5 { options, .. } = &mut plan.sources[1] {
            options.remap.skip.push("NOT-A-MOD".into());
        }
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_and_conflicting() {
        let mut plan: MergePlan = serde_json::from_str(PLAN).unwrap();
        plan.overwrite = true;
        plan.append = true;
        assert!(plan.validate().is_err());

        let empty = MergePlan::new("x.h5".into(), ClassSpec::Builtin("deepsig2018".into()), vec![]);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_source_classes_prefix_of_unified() {
        let unified = ClassList::new(["BPSK", "QPSK", "other"]).unwrap();
        let opts = SourceOptions::default();
        let two = opts.source_classes(&unified, Some(2)).unwrap();
        assert_eq!(two.names(), &["BPSK", "QPSK"]);
        assert!(opts.source_classes(&unified, Some(4)).is_err());
        assert_eq!(opts.source_classes(&unified, None).unwrap(), unified);

        let explicit = SourceOptions {
            classes: Some(ClassSpec::Builtin("deepsig2018".into())),
            ..SourceOptions::default()
        };
        assert!(explicit.source_classes(&unified, Some(8)).is_err());
        assert_eq!(explicit.source_classes(&unified, Some(24)).unwrap().len(), 24);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, PLAN).unwrap();
        let plan: MergePlan = serde_json::from_str(PLAN).unwrap();
        assert_eq!(MergePlan::load(&path).unwrap(), plan);
        assert!(MergePlan::load(&dir.path().join("missing.json")).is_err());
    }
}
