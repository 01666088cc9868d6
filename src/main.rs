mod cli;
mod dataset;
mod error;
mod extract;
mod feature;
mod object;
mod stats;
mod table;

use anyhow::Context;
use clap::Parser;
use cli::{Args, Command, ExtractArgs, InspectArgs, SplitArgs};
use dataset::Dataset;
use extract::{ExtractConfig, ExtractionScheduler};
use regex::Regex;
use table::FeatureTable;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Invalid arguments: {e}");
        std::process::exit(1);
    }

    println!("bytesift v0.1.0 - byte-level feature extraction");
    println!("{}", "=".repeat(60));
    println!();

    match args.command {
        Command::Extract(extract_args) => run_extract(extract_args).await,
        Command::Inspect(inspect_args) => run_inspect(inspect_args),
        Command::Split(split_args) => run_split(split_args),
    }
}

async fn run_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let features = cli::parse_features(&args.features)
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Configuration:");
    println!("  Source directory:   {}", args.source_dir.display());
    println!("  Output file:        {}", args.output.display());
    println!(
        "  Features:           {}",
        features
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Name filter:        {}", args.filter.as_deref().unwrap_or("(none)"));
    println!("  Segment size:       {}", args.segment_size);
    println!("  Max in flight:      {}", args.max_in_flight);
    println!("  Strict mode:        {}", args.strict);
    println!();

    let filter = args
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid filter pattern")?;

    let mut dataset = Dataset::new();
    let report = dataset
        .load_from_directory(&args.source_dir, filter.as_ref(), args.strict)
        .with_context(|| format!("loading samples from {}", args.source_dir.display()))?;
    info!(
        added = report.added,
        duplicates = report.duplicates,
        failures = report.failures.len(),
        "dataset loaded"
    );
    dataset.label_by_extension();

    let dataset = if args.segment_size > 0 {
        let (segmented, carried_whole) = dataset.segmented(args.segment_size)?;
        info!(
            objects = segmented.len(),
            carried_whole, "dataset segmented"
        );
        segmented
    } else {
        dataset
    };

    let scheduler = ExtractionScheduler::new(ExtractConfig {
        max_in_flight: args.max_in_flight,
        fail_fast: args.strict,
        ..ExtractConfig::default()
    });
    let extraction = scheduler.run(&features, &dataset).await?;
    for failure in &extraction.failures {
        warn!(
            hash = %failure.hash,
            feature = %failure.feature,
            error = %failure.error,
            "feature missing from entry"
        );
    }

    extraction
        .table
        .save(&args.output)
        .with_context(|| format!("saving features to {}", args.output.display()))?;

    println!(
        "Extracted {} feature(s) from {} object(s) in {:.2}s ({} failed task(s)).",
        features.len() * dataset.len(),
        dataset.len(),
        extraction.duration_secs,
        extraction.failures.len()
    );
    println!("Features saved to {}", args.output.display());
    Ok(())
}

fn run_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let table = FeatureTable::load(&args.input)
        .with_context(|| format!("loading features from {}", args.input.display()))?;

    println!("Feature file:         {}", args.input.display());
    println!("Entries:              {}", table.len());

    let mut counts: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
    for (_, entry) in table.iter() {
        for feature in entry.keys() {
            *counts.entry(feature.name()).or_insert(0) += 1;
        }
    }
    println!("Features present:");
    for (name, count) in counts {
        println!("  {name:<20} {count} entry(ies)");
    }
    Ok(())
}

fn run_split(args: SplitArgs) -> anyhow::Result<()> {
    let table = FeatureTable::load(&args.input)
        .with_context(|| format!("loading features from {}", args.input.display()))?;

    let (train, test) = table.split_train_test(args.ratio, args.seed)?;
    train
        .save(&args.train_output)
        .with_context(|| format!("saving training partition to {}", args.train_output.display()))?;
    test.save(&args.test_output)
        .with_context(|| format!("saving test partition to {}", args.test_output.display()))?;

    println!(
        "Split {} entries into {} training / {} test (ratio {}, seed {}).",
        table.len(),
        train.len(),
        test.len(),
        args.ratio,
        args.seed
    );
    println!("Training partition:   {}", args.train_output.display());
    println!("Test partition:       {}", args.test_output.display());
    Ok(())
}
