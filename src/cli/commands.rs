// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands and their flags. Each Args struct
// converts into the matching application-layer config, so the
// application layer never sees clap types. Conversions that can
// reject input (`--datasets` with the wrong count) are TryFrom.
//
// Reference: clap derive tutorial

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Error, Result};
use clap::{Args, Subcommand, ValueEnum};

use crate::application::export_use_case::ExportConfig;
use crate::application::report_use_case::ReportConfig;
use crate::application::resegment_use_case::ResegmentConfig;
use crate::application::split_use_case::SplitUseCaseConfig;
use crate::application::subset_use_case::SubsetConfig;
use crate::data::h5_source::DatasetNames;
use crate::data::splitter::SplitConfig;
use crate::domain::taxonomy::{ClassSpec, LabelEncoding};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge HDF5 files and npz trees into one store, as described by a JSON plan
    Merge(MergeArgs),

    /// Keep a few classes of a file, re-indexed in the order given
    Subset(SubsetArgs),

    /// Cut every record into shorter segments
    Resegment(ResegmentArgs),

    /// Print shapes, schema and class / SNR histograms
    Inspect(InspectArgs),

    /// Truncate a store whose arrays disagree in length
    Repair(RepairArgs),

    /// Compute and save a seeded train / valid / test partition
    Split(SplitArgs),

    /// Write a store as CSV
    Export(ExportArgs),

    /// Accuracy, confusion matrix and per-SNR accuracy from a prediction CSV
    Report(ReportArgs),
}

/// `--label-encoding` values
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum EncodingArg {
    #[default]
    OneHot,
    Index,
}

impl From<EncodingArg> for LabelEncoding {
    fn from(e: EncodingArg) -> Self {
        match e {
            EncodingArg::OneHot => LabelEncoding::OneHot,
            EncodingArg::Index => LabelEncoding::Index,
        }
    }
}

/// `--classes deepsig2018` or `--classes BPSK,QPSK,...`
fn class_spec(values: Vec<String>) -> Option<ClassSpec> {
    match values.as_slice() {
        [] => None,
        [single] if !single.contains(',') && ClassSpec::Builtin(single.clone()).resolve().is_ok() => {
            Some(ClassSpec::Builtin(single.clone()))
        }
        _ => Some(ClassSpec::List(values)),
    }
}

/// `--datasets iq,labels,snrs`. Absent means "first three members";
/// any other count is a mistake, not a request for the default.
fn dataset_names(values: Vec<String>) -> Result<Option<DatasetNames>> {
    match values.as_slice() {
        [] => Ok(None),
        [iq, labels, snrs] => Ok(Some(DatasetNames {
            iq: iq.clone(),
            labels: labels.clone(),
            snrs: snrs.clone(),
        })),
        other => bail!(
            "--datasets takes three names (iq,labels,snrs), got {}: {:?}",
            other.len(),
            other
        ),
    }
}

/// `--compression`: a deflate level 0-9, or `none` for uncompressed
/// datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deflate(pub Option<u8>);

impl FromStr for Deflate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Deflate(None));
        }
        match s.parse::<u8>() {
            Ok(level) if level <= 9 => Ok(Deflate(Some(level))),
            _ => Err(format!("'{s}' is not a deflate level 0-9 or 'none'")),
        }
    }
}

// ─── merge ────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// JSON merge plan
    pub plan: PathBuf,

    /// Replace the output file if it exists
    #[arg(long, conflicts_with = "append")]
    pub overwrite: bool,

    /// Append to an existing output store
    #[arg(long)]
    pub append: bool,
}

// ─── subset ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct SubsetArgs {
    /// Input HDF5 file
    pub input: PathBuf,

    /// Output store
    pub output: PathBuf,

    /// Classes to keep, in their new index order
    #[arg(long, value_delimiter = ',', default_value = "BPSK,QPSK,16QAM,64QAM")]
    pub keep: Vec<String>,

    /// Classes of the input: a built-in name or a comma-separated list
    /// (default: from the input's manifest)
    #[arg(long, value_delimiter = ',')]
    pub source_classes: Vec<String>,

    /// Member names for iq, labels and snrs (default: first three members)
    #[arg(long, value_delimiter = ',')]
    pub datasets: Vec<String>,

    #[arg(long, value_enum, default_value_t = EncodingArg::OneHot)]
    pub label_encoding: EncodingArg,

    /// Scale each record to unit column variance
    #[arg(long)]
    pub normalize: bool,

    #[arg(long, default_value_t = 1024)]
    pub chunk_records: usize,

    #[arg(long)]
    pub overwrite: bool,
}

impl TryFrom<SubsetArgs> for SubsetConfig {
    type Error = Error;

    fn try_from(a: SubsetArgs) -> Result<Self> {
        Ok(SubsetConfig {
            input: a.input,
            output: a.output,
            keep: a.keep,
            source_classes: class_spec(a.source_classes),
            datasets: dataset_names(a.datasets)?,
            label_encoding: a.label_encoding.into(),
            normalize: a.normalize,
            chunk_records: a.chunk_records,
            overwrite: a.overwrite,
        })
    }
}

// ─── resegment ────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct ResegmentArgs {
    /// Input HDF5 file
    pub input: PathBuf,

    /// Output store
    pub output: PathBuf,

    /// Samples per output record
    #[arg(long, default_value_t = 1024)]
    pub segment_len: usize,

    /// Offset between segment starts (default: segment length)
    #[arg(long)]
    pub stride: Option<usize>,

    /// Member names for iq, labels and snrs (default: first three members)
    #[arg(long, value_delimiter = ',')]
    pub datasets: Vec<String>,

    /// Classes of the input (default: from its manifest)
    #[arg(long, value_delimiter = ',')]
    pub classes: Vec<String>,

    #[arg(long, value_enum, default_value_t = EncodingArg::OneHot)]
    pub label_encoding: EncodingArg,

    #[arg(long)]
    pub normalize: bool,

    /// Input records read per chunk
    #[arg(long, default_value_t = 256)]
    pub chunk_records: usize,

    /// Deflate level 0-9, or `none`
    #[arg(long, default_value = "4")]
    pub compression: Deflate,

    #[arg(long)]
    pub overwrite: bool,
}

impl TryFrom<ResegmentArgs> for ResegmentConfig {
    type Error = Error;

    fn try_from(a: ResegmentArgs) -> Result<Self> {
        Ok(ResegmentConfig {
            input: a.input,
            output: a.output,
            segment_len: a.segment_len,
            stride: a.stride,
            datasets: dataset_names(a.datasets)?,
            classes: class_spec(a.classes),
            label_encoding: a.label_encoding.into(),
            normalize: a.normalize,
            chunk_records: a.chunk_records,
            compression: a.compression.0,
            overwrite: a.overwrite,
        })
    }
}

// ─── inspect / repair ─────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// HDF5 file or store
    pub path: PathBuf,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Store to truncate
    pub path: PathBuf,
}

// ─── split ────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Store, or CSV export, to partition
    pub input: PathBuf,

    /// Partition JSON (default: <input>.split.json)
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = 0.05)]
    pub valid_fraction: f64,

    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,

    #[arg(long, default_value_t = 4)]
    pub seed: u64,

    /// Keep store order instead of shuffling
    #[arg(long)]
    pub no_shuffle: bool,

    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,
}

impl From<SplitArgs> for SplitUseCaseConfig {
    fn from(a: SplitArgs) -> Self {
        SplitUseCaseConfig {
            input: a.input,
            output: a.output,
            split: SplitConfig {
                valid_fraction: a.valid_fraction,
                test_fraction: a.test_fraction,
                seed: a.seed,
                shuffle: !a.no_shuffle,
            },
            batch_size: a.batch_size,
            num_workers: a.num_workers,
        }
    }
}

// ─── export ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Store to export
    pub input: PathBuf,

    /// CSV to write
    pub output: PathBuf,

    /// Only these classes (names or indices)
    #[arg(long, value_delimiter = ',')]
    pub classes: Vec<String>,

    /// Stop after this many rows
    #[arg(long)]
    pub limit: Option<usize>,
}

impl From<ExportArgs> for ExportConfig {
    fn from(a: ExportArgs) -> Self {
        ExportConfig {
            input: a.input,
            output: a.output,
            classes: a.classes,
            limit: a.limit,
        }
    }
}

// ─── report ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Prediction CSV with True_label, Predicted_label, SNR columns
    pub predictions: PathBuf,

    /// Write the report as JSON here
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Class names: a built-in name or a comma-separated list
    #[arg(long, value_delimiter = ',')]
    pub classes: Vec<String>,

    /// Store whose manifest names the classes
    #[arg(long)]
    pub store: Option<PathBuf>,
}

impl From<ReportArgs> for ReportConfig {
    fn from(a: ReportArgs) -> Self {
        ReportConfig {
            predictions: a.predictions,
            output: a.output,
            classes: class_spec(a.classes),
            store: a.store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_spec_from_flags() {
        assert_eq!(class_spec(vec![]), None);
        assert_eq!(
            class_spec(vec!["deepsig2018".into()]),
            Some(ClassSpec::Builtin("deepsig2018".into()))
        );
        assert_eq!(
            class_spec(vec!["BPSK".into(), "QPSK".into()]),
            Some(ClassSpec::List(vec!["BPSK".into(), "QPSK".into()]))
        );
        // a single unknown name is a one-class list
        assert_eq!(class_spec(vec!["BPSK".into()]), Some(ClassSpec::List(vec!["BPSK".into()])));
    }

    #[test]
    fn test_dataset_names_need_three() {
        assert!(dataset_names(vec![]).unwrap().is_none());
        let n = dataset_names(vec!["X".into(), "Y".into(), "Z".into()]).unwrap().unwrap();
        assert_eq!(n.labels, "Y");

        let err = dataset_names(vec!["X".into(), "Y".into()]).err().unwrap();
        assert!(err.to_string().contains("got 2"));
        assert!(dataset_names(vec!["X;Y;Z".into()]).is_err());
    }

    #[test]
    fn test_compression_levels() {
        assert_eq!("none".parse::<Deflate>(), Ok(Deflate(None)));
        assert_eq!("0".parse::<Deflate>(), Ok(Deflate(Some(0))));
        assert_eq!("9".parse::<Deflate>(), Ok(Deflate(Some(9))));
        assert!("10".parse::<Deflate>().is_err());
        assert!("fast".parse::<Deflate>().is_err());
    }

    #[test]
    fn test_resegment_flags_reach_config() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(subcommand)]
            command: Commands,
        }

        let parse = |extra: &[&str]| {
            let mut argv = vec!["iqset", "resegment", "in.h5", "out.h5"];
            argv.extend_from_slice(extra);
            match Wrapper::try_parse_from(argv).map(|w| w.command) {
                Ok(Commands::Resegment(args)) => Ok(args),
                Ok(other) => panic!("parsed {other:?}"),
                Err(e) => Err(e),
            }
        };

        let cfg = ResegmentConfig::try_from(parse(&["--compression", "none"]).unwrap()).unwrap();
        assert_eq!(cfg.compression, None);
        let cfg = ResegmentConfig::try_from(parse(&[]).unwrap()).unwrap();
        assert_eq!(cfg.compression, Some(4));
        assert!(parse(&["--compression", "12"]).is_err());

        let args = parse(&["--datasets", "X,Y"]).unwrap();
        assert!(ResegmentConfig::try_from(args).is_err());
    }
}
