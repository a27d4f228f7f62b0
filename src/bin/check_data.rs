use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use trial_analysis::trial::{check_integrity, Condition};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "check-data")]
#[command(version)]
#[command(about = "Check trial log file names, contents and per-participant condition sets", long_about = None)]
struct Cli {
    /// Root data directory (expects json_logs/)
    #[arg(short = 'd', long = "directory", default_value = "./data")]
    directory: PathBuf,

    /// Exit non-zero if any issue is found
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .with_writer(std::io::stderr)
        .init();

    let json_dir = cli.directory.join("json_logs");
    let report = check_integrity(&json_dir, &Condition::ALL)
        .with_context(|| format!("cannot check {}", json_dir.display()))?;

    for issue in &report.issues {
        println!("{issue}");
    }
    if report.is_clean() {
        println!("All JSON files passed integrity checks.");
    }
    println!(
        "Number of valid participants with all {} modes: {}",
        Condition::ALL.len(),
        report.valid_participants
    );

    if cli.strict && !report.is_clean() {
        anyhow::bail!("{} integrity issues found", report.issues.len());
    }
    Ok(())
}
