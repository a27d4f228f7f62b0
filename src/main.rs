use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use trial_analysis::config::AnalysisConfig;
use trial_analysis::pipeline;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "trial-analysis")]
#[command(version)]
#[command(about = "Run the full study analysis: statistics, results workbook and figures", long_about = None)]
struct Cli {
    /// Root data directory (expects json_logs/ and other/order.xlsx)
    #[arg(short = 'd', long = "directory", default_value = "./data")]
    directory: PathBuf,
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AnalysisConfig::builder(&cli.directory)
        .build()
        .context("invalid analysis configuration")?;
    let summary = pipeline::run(&config)
        .with_context(|| format!("analysis of {} failed", cli.directory.display()))?;

    println!(
        "Valid participants: {}/{}",
        summary.integrity.valid_participants, summary.integrity.total_participants
    );
    if !summary.load_issues.is_empty() {
        println!("Skipped {} malformed trial files", summary.load_issues.len());
    }
    for analysis in &summary.results.analyses {
        match &analysis.friedman {
            Ok(f) => println!(
                "{}: Friedman Q({}) = {:.3}, p = {:.4}, W = {:.3}",
                analysis.measure, f.ddof, f.q, f.p_value, f.kendall_w
            ),
            Err(failure) => println!("{}: {failure}", analysis.measure),
        }
    }
    println!("Results: {}", summary.reports.workbook.display());
    let rendered = summary.plots.iter().filter(|p| p.failure.is_none()).count();
    println!("Figures: {rendered}/{} in {}", summary.plots.len(), config.plots_dir().display());
    Ok(())
}
