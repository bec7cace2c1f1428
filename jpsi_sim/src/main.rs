//! J/psi production CLI
//!
//! Generates events on parallel seeded workers, extracts J/psi -> mu mu
//! candidates with their provenance, and merges the per-worker files.

use clap::Parser;
use jpsi_core::AncestryPolicy;
use jpsi_sim::{write_json, DatasetFile, ParallelRunner, RunConfig, RunReport};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Parallel J/psi production with prompt/non-prompt tagging
#[derive(Parser, Debug)]
#[command(name = "jpsi-sim")]
#[command(about = "Generate, tag and merge J/psi -> mu mu candidates", long_about = None)]
struct Args {
    /// Number of parallel workers
    #[arg(short, long, default_value = "20")]
    workers: u32,
    
    /// Events per worker
    #[arg(short, long, default_value = "20000")]
    events: u64,
    
    /// Seed of worker 0
    #[arg(short, long, default_value = "10000")]
    seed: u64,
    
    /// Seed distance between consecutive workers
    #[arg(long, default_value = "100")]
    seed_stride: u64,
    
    /// Directory receiving per-worker and merged files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
    
    /// File name of the merged dataset
    #[arg(long, default_value = "Merged_JpsiToMuMu.jsonl")]
    merged: String,
    
    /// Beam energy preset in GeV (7000 or 13000)
    #[arg(long, default_value = "7000")]
    energy: u32,
    
    /// Extra generator setting, e.g. "Charmonium:meanPerEvent = 1.2" (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    settings: Vec<String>,
    
    /// Ancestry policy (nearest, full-chain)
    #[arg(short, long, default_value = "nearest")]
    ancestry: String,
    
    /// Give up on workers still running after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    
    /// Write the run report as JSON to this file
    #[arg(long)]
    summary: Option<PathBuf>,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn build_config(args: &Args) -> Result<RunConfig, String> {
    let preset = match args.energy {
        7000 => RunConfig::charmonium_7tev(),
        13000 => RunConfig::charmonium_13tev(),
        other => return Err(format!("Unsupported energy preset: {} (use 7000 or 13000)", other)),
    };
    let policy: AncestryPolicy = args.ancestry.parse()?;
    
    let mut config = preset
        .with_workers(args.workers, args.events)
        .with_seeds(args.seed, args.seed_stride)
        .with_output_dir(args.output_dir.clone())
        .with_policy(policy);
    config.merged_output = args.merged.clone();
    
    for setting in &args.settings {
        config = config.with_setting(setting.as_str());
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    
    Ok(config)
}

fn print_summary(report: &RunReport<DatasetFile>) {
    info!("");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    
    for worker in &report.workers {
        info!(
            "✓ {} (seed={}) {} records in {:.2}s",
            worker.worker,
            worker.seed,
            worker.statistics.records_written(),
            worker.elapsed_secs
        );
    }
    
    info!("{}", report.totals);
    info!(
        "Merged {} records into {}",
        report.merged.records,
        report.merged.path.display()
    );
    
    if report.is_success() {
        info!("✅ All {} workers completed", report.workers.len());
    } else {
        error!(
            "❌ {}/{} workers failed",
            report.failures.len(),
            report.failures.len() + report.workers.len()
        );
        for failure in &report.failures {
            error!("  - {}", failure);
        }
    }
}

/// The `--json` report, the only thing written to stdout.
fn render_json(report: &RunReport<DatasetFile>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn main() {
    let args = Args::parse();
    
    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);
    // Keep stdout clean for the JSON report.
    let installed = if args.json {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.expect("Failed to set tracing subscriber");
    
    if !args.json {
        info!("J/psi production v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
    
    let config = build_config(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to start runtime: {}", e);
            std::process::exit(1);
        });
    
    let runner = ParallelRunner::toy(config);
    let result = runtime.block_on(runner.run_to_files());
    // Timed-out workers are not joined.
    runtime.shutdown_background();
    
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    };
    
    if let Some(path) = &args.summary {
        if let Err(e) = write_json(path, &report) {
            error!("Failed to write summary: {}", e);
        } else {
            info!("Summary written to {}", path.display());
        }
    }
    
    if args.json {
        match render_json(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
    } else {
        print_summary(&report);
    }
    
    // Exit with proper code for CI
    if !report.is_success() {
        std::process::exit(1);
    }
}
