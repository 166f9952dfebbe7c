// ============================================================
// Layer 3 — Class Taxonomies and Label Re-indexing
// ============================================================
// Every source recording set comes with its own class list:
// DeepSig 2018 has 24 modulations, the lab recordings have 8,
// a merged set may add an "other" bucket on top. Before records
// from different sources can share one label array, each
// source index has to be mapped onto the unified list.
//
//   source index ──LabelMap──▶ Some(unified index)  → kept
//                              None                 → dropped
//
// The map is built once per source from a small set of rules
// (rename, name matching, skip list, default class) and then
// applied to every record of that source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// DeepSig RadioML 2018.01 classes, in the dataset's native index order.
pub const DEEPSIG_2018: [&str; 24] = [
    "OOK", "4ASK", "8ASK", "BPSK", "QPSK", "8PSK", "16PSK", "32PSK",
    "16APSK", "32APSK", "64APSK", "128APSK", "16QAM", "32QAM", "64QAM",
    "128QAM", "256QAM", "AM-SSB-WC", "AM-SSB-SC", "AM-DSB-WC", "AM-DSB-SC",
    "FM", "GMSK", "OQPSK",
];

/// Errors raised while resolving class names or decoding label rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("unknown built-in taxonomy '{0}' (known: deepsig2018)")]
    UnknownTaxonomy(String),

    #[error("class '{0}' is listed twice")]
    Duplicate(String),

    #[error("label row {row} has no positive entry")]
    EmptyRow { row: usize },

    #[error("class index {index} out of range for {width} classes")]
    OutOfRange { index: usize, width: usize },
}

// ─── ClassList ────────────────────────────────────────────────────────────────
/// Ordered class names. Position in the list is the class index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ClassList {
    names: Vec<String>,
}

impl ClassList {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self, LabelError> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(LabelError::Duplicate(name.clone()));
            }
        }
        Ok(Self { names })
    }

    /// Look up a built-in taxonomy by name.
    pub fn builtin(name: &str) -> Result<Self, LabelError> {
        match name.to_ascii_lowercase().as_str() {
            "deepsig2018" | "deepsig" => Self::new(DEEPSIG_2018),
            _ => Err(LabelError::UnknownTaxonomy(name.to_string())),
        }
    }

    /// Placeholder names `class_0 .. class_{width-1}` for sources that
    /// carry no taxonomy of their own.
    pub fn anonymous(width: usize) -> Self {
        Self {
            names: (0..width).map(|i| format!("class_{i}")).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// A new list holding only `keep`, in the order given.
    pub fn subset<S: AsRef<str>>(&self, keep: &[S]) -> Result<Self, LabelError> {
        let mut names = Vec::with_capacity(keep.len());
        for k in keep {
            let k = k.as_ref();
            if self.position(k).is_none() {
                return Err(LabelError::UnknownClass(k.to_string()));
            }
            names.push(k.to_string());
        }
        Self::new(names)
    }
}

impl TryFrom<Vec<String>> for ClassList {
    type Error = LabelError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<ClassList> for Vec<String> {
    fn from(list: ClassList) -> Self {
        list.names
    }
}

// ─── ClassSpec ────────────────────────────────────────────────────────────────
/// How a config file names a taxonomy: `"deepsig2018"` or `["BPSK", ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassSpec {
    Builtin(String),
    List(Vec<String>),
}

impl ClassSpec {
    pub fn resolve(&self) -> Result<ClassList, LabelError> {
        match self {
            ClassSpec::Builtin(name) => ClassList::builtin(name),
            ClassSpec::List(names) => ClassList::new(names.iter().cloned()),
        }
    }
}

/// On-disk layout of the label array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelEncoding {
    /// `(N, C)` float rows with a single 1.0.
    #[default]
    OneHot,
    /// `(N,)` integer class indices.
    Index,
}

// ─── RemapRules ───────────────────────────────────────────────────────────────
/// Per-source rules for mapping source classes onto the unified list.
///
/// Precedence for each source class name:
///   1. listed in `skip`            → dropped
///   2. key of `rename`             → the renamed unified class
///   3. `match_names` and same name → that unified class
///   4. `default_class` is set      → the default class
///   5. otherwise                   → dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRules {
    #[serde(default = "default_true")]
    pub match_names: bool,
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub skip: Vec<String>,
    #[serde(default)]
    pub default_class: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for RemapRules {
    fn default() -> Self {
        Self {
            match_names: true,
            rename: BTreeMap::new(),
            skip: Vec::new(),
            default_class: None,
        }
    }
}

// ─── LabelMap ─────────────────────────────────────────────────────────────────
/// Resolved source-index → unified-index table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    targets: Vec<Option<usize>>,
    width: usize,
}

impl LabelMap {
    /// Every index maps to itself.
    pub fn identity(width: usize) -> Self {
        Self {
            targets: (0..width).map(Some).collect(),
            width,
        }
    }

    pub fn build(
        source: &ClassList,
        unified: &ClassList,
        rules: &RemapRules,
    ) -> Result<Self, LabelError> {
        let lookup = |name: &str| {
            unified
                .position(name)
                .ok_or_else(|| LabelError::UnknownClass(name.to_string()))
        };

        let default = rules.default_class.as_deref().map(lookup).transpose()?;

        for name in rules.skip.iter().chain(rules.rename.keys()) {
            if source.position(name).is_none() {
                return Err(LabelError::UnknownClass(name.clone()));
            }
        }

        let mut targets = Vec::with_capacity(source.len());
        for name in source.names() {
            let target = if rules.skip.contains(name) {
                None
            } else if let Some(renamed) = rules.rename.get(name) {
                Some(lookup(renamed)?)
            } else if let Some(pos) = unified.position(name).filter(|_| rules.match_names) {
                Some(pos)
            } else {
                default
            };
            targets.push(target);
        }

        Ok(Self {
            targets,
            width: unified.len(),
        })
    }

    /// Unified index for a source index, `None` when the record is dropped.
    pub fn get(&self, source_index: usize) -> Result<Option<usize>, LabelError> {
        self.targets
            .get(source_index)
            .copied()
            .ok_or(LabelError::OutOfRange {
                index: source_index,
                width: self.targets.len(),
            })
    }

    /// Number of classes in the unified list.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn kept_classes(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }
}

// ─── Row helpers ──────────────────────────────────────────────────────────────

pub fn one_hot(index: usize, width: usize) -> Result<Vec<f32>, LabelError> {
    if index >= width {
        return Err(LabelError::OutOfRange { index, width });
    }
    let mut row = vec![0.0; width];
    row[index] = 1.0;
    Ok(row)
}

/// Index of the first maximum, `None` for empty rows or rows without a
/// positive finite entry.
pub fn argmax(row: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in row.iter().enumerate() {
        if !v.is_finite() {
            return None;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.filter(|&(_, v)| v > 0.0).map(|(i, _)| i)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> ClassList {
        ClassList::new(names.iter().copied()).unwrap()
    }

    #[test]
    fn test_builtin_deepsig_order() {
        let ds = ClassList::builtin("deepsig2018").unwrap();
        assert_eq!(ds.len(), 24);
        assert_eq!(ds.position("BPSK"), Some(3));
        assert_eq!(ds.position("64QAM"), Some(14));
        assert_eq!(ds.name(23), Some("OQPSK"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ClassList::new(["BPSK", "QPSK", "BPSK"]).unwrap_err();
        assert_eq!(err, LabelError::Duplicate("BPSK".into()));
    }

    #[test]
    fn test_subset_keeps_given_order() {
        let ds = ClassList::builtin("deepsig").unwrap();
        let four = ds.subset(&["BPSK", "QPSK", "16QAM", "64QAM"]).unwrap();
        assert_eq!(four.names(), &["BPSK", "QPSK", "16QAM", "64QAM"]);
        assert!(ds.subset(&["NOPE"]).is_err());
    }

    #[test]
    fn test_class_spec_untagged_json() {
        let a: ClassSpec = serde_json::from_str("\"deepsig2018\"").unwrap();
        let b: ClassSpec = serde_json::from_str("[\"BPSK\",\"QPSK\"]").unwrap();
        assert_eq!(a.resolve().unwrap().len(), 24);
        assert_eq!(b.resolve().unwrap().len(), 2);
    }

    #[test]
    fn test_map_by_name() {
        let src = list(&["QPSK", "FM", "BPSK"]);
        let uni = list(&["BPSK", "QPSK"]);
        let map = LabelMap::build(&src, &uni, &RemapRules::default()).unwrap();
        assert_eq!(map.get(0).unwrap(), Some(1));
        assert_eq!(map.get(1).unwrap(), None);
        assert_eq!(map.get(2).unwrap(), Some(0));
        assert_eq!(map.kept_classes(), 2);
        assert!(map.get(3).is_err());
    }

    #[test]
    fn test_skip_then_default_bucket() {
        // Everything not skipped lands in "other", names are not matched.
        let src = list(&["BPSK", "FM", "GMSK"]);
        let uni = list(&["BPSK", "other"]);
        let rules = RemapRules {
            match_names: false,
            skip: vec!["FM".into()],
            default_class: Some("other".into()),
            ..RemapRules::default()
        };
        let map = LabelMap::build(&src, &uni, &rules).unwrap();
        assert_eq!(map.get(0).unwrap(), Some(1));
        assert_eq!(map.get(1).unwrap(), None);
        assert_eq!(map.get(2).unwrap(), Some(1));
    }

    #[test]
    fn test_rename_wins_over_name_match() {
        let src = list(&["SC_BPSK", "QPSK"]);
        let uni = list(&["BPSK", "QPSK"]);
        let mut rules = RemapRules::default();
        rules.rename.insert("SC_BPSK".into(), "BPSK".into());
        let map = LabelMap::build(&src, &uni, &rules).unwrap();
        assert_eq!(map.get(0).unwrap(), Some(0));
        assert_eq!(map.get(1).unwrap(), Some(1));
    }

    #[test]
    fn test_unknown_default_class_is_error() {
        let src = list(&["BPSK"]);
        let uni = list(&["BPSK"]);
        let rules = RemapRules {
            default_class: Some("other".into()),
            ..RemapRules::default()
        };
        assert_eq!(
            LabelMap::build(&src, &uni, &rules).unwrap_err(),
            LabelError::UnknownClass("other".into())
        );
    }

    #[test]
    fn test_one_hot_and_argmax() {
        assert_eq!(one_hot(2, 4).unwrap(), vec![0.0, 0.0, 1.0, 0.0]);
        assert!(one_hot(4, 4).is_err());
        assert_eq!(argmax(&[0.0, 0.0, 1.0, 0.0]), Some(2));
        assert_eq!(argmax(&[0.2, 0.7, 0.7]), Some(1));
        assert_eq!(argmax(&[0.0, 0.0]), None);
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN, 1.0]), None);
    }
}
