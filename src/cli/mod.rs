// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap, hands a config to the matching
// Layer 2 use case, and prints the result. All work happens in
// the application layer.
//
//   iqset merge plan.json
//   iqset subset gold.h5 four.h5 --source-classes deepsig2018
//   iqset resegment merged.h5 short.h5 --segment-len 256
//   iqset inspect merged.h5
//   iqset repair merged.h5
//   iqset split merged.h5
//   iqset export four.h5 four.csv --classes BPSK,QPSK
//   iqset report output.csv --store merged.h5

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{
    Commands, ExportArgs, InspectArgs, MergeArgs, RepairArgs, ReportArgs, ResegmentArgs,
    SplitArgs, SubsetArgs,
};

use crate::infra::manifest::DatasetManifest;

#[derive(Parser, Debug)]
#[command(
    name = "iqset",
    version = "0.1.0",
    about = "Merge, reshape and serve labeled IQ recordings for modulation classification."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Merge(args) => run_merge(args),
            Commands::Subset(args) => run_subset(args),
            Commands::Resegment(args) => run_resegment(args),
            Commands::Inspect(args) => run_inspect(args),
            Commands::Repair(args) => run_repair(args),
            Commands::Split(args) => run_split(args),
            Commands::Export(args) => run_export(args),
            Commands::Report(args) => run_report(args),
        }
    }
}

fn print_manifest(m: &DatasetManifest) {
    println!(
        "{} records of length {} over {} classes",
        m.total_records,
        m.record_len,
        m.classes.len()
    );
    for s in &m.sources {
        println!(
            "  {:<50} read {:>9}  appended {:>9}  dropped {:>9}",
            s.name, s.read, s.appended, s.dropped
        );
    }
}

fn run_merge(args: MergeArgs) -> Result<()> {
    use crate::application::merge_use_case::MergeUseCase;
    use crate::application::plan::MergePlan;

    let mut plan = MergePlan::load(&args.plan)?;
    plan.overwrite |= args.overwrite;
    plan.append |= args.append;

    let manifest = MergeUseCase::new(plan).execute()?;
    print_manifest(&manifest);
    Ok(())
}

fn run_subset(args: SubsetArgs) -> Result<()> {
    use crate::application::subset_use_case::SubsetUseCase;

    let manifest = SubsetUseCase::new(args.try_into()?).execute()?;
    print_manifest(&manifest);
    Ok(())
}

fn run_resegment(args: ResegmentArgs) -> Result<()> {
    use crate::application::resegment_use_case::ResegmentUseCase;

    let manifest = ResegmentUseCase::new(args.try_into()?).execute()?;
    print_manifest(&manifest);
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    use crate::application::inspect_use_case::InspectUseCase;

    let report = InspectUseCase::new(args.path).execute()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", report.path.display());
    println!("  records     {}", report.records);
    println!("  record_len  {}", report.record_len);
    match &report.schema {
        Some(s) => println!(
            "  labels      {:?}, {} classes",
            s.label_encoding, s.num_classes
        ),
        None => println!("  labels      width {:?} (not a store)", report.label_width),
    }
    println!("  classes:");
    for c in &report.classes {
        println!(
            "    {:>3} {:<12} {:>9}",
            c.index,
            c.name.as_deref().unwrap_or("-"),
            c.count
        );
    }
    println!("  snrs:");
    for (snr, count) in &report.snrs {
        println!("    {:>4} dB {:>9}", snr, count);
    }
    Ok(())
}

fn run_repair(args: RepairArgs) -> Result<()> {
    use crate::application::inspect_use_case::RepairUseCase;

    let report = RepairUseCase::new(args.path.clone()).execute()?;
    if report.rows_dropped() == 0 {
        println!("'{}' is aligned ({} records).", args.path.display(), report.len);
    } else {
        println!(
            "Truncated '{}' to {} records (iq={}, labels={}, snrs={}).",
            args.path.display(),
            report.len,
            report.iq,
            report.labels,
            report.snrs
        );
    }
    Ok(())
}

fn run_split(args: SplitArgs) -> Result<()> {
    use crate::application::split_use_case::SplitUseCase;

    let summary = SplitUseCase::new(args.into()).execute()?;
    for part in &summary.parts {
        println!(
            "{:<6} {:>9} records  {:>6} batches  classes {:?}",
            part.name, part.records, part.batches, part.class_counts
        );
    }
    println!("Partition saved to '{}'.", summary.partition_file.display());
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    use crate::application::export_use_case::ExportUseCase;

    let output = args.output.clone();
    let rows = ExportUseCase::new(args.into()).execute()?;
    println!("Wrote {} rows to '{}'.", rows, output.display());
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    use crate::application::report_use_case::ReportUseCase;

    let report = ReportUseCase::new(args.into()).execute()?;
    println!(
        "Accuracy: {:.2}% ({} / {})",
        report.accuracy * 100.0,
        report.correct,
        report.total
    );
    for s in &report.per_snr {
        println!("  {:>4} dB  {:>6.2}%  ({} records)", s.snr, s.accuracy * 100.0, s.total);
    }
    Ok(())
}
