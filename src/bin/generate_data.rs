use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use trial_analysis::trial::synthetic::{generate_fake_json_files, write_order_table};
use trial_analysis::trial::Condition;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "generate-data")]
#[command(version)]
#[command(about = "Write a synthetic study: json_logs/*.json plus other/order.xlsx", long_about = None)]
struct Cli {
    /// Root data directory to populate
    #[arg(short = 'd', long = "directory", default_value = "./data")]
    directory: PathBuf,

    /// Number of participants
    #[arg(short = 'n', long, default_value_t = 10)]
    participants: usize,

    /// Number of conditions (modes)
    #[arg(short = 'm', long, default_value_t = 3)]
    modes: u8,

    /// Files per participant and mode
    #[arg(long, default_value_t = 1)]
    files_per_participant: usize,

    /// RNG seed for reproducible data
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut rng = cli
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

    let json_dir = cli.directory.join("json_logs");
    let files = generate_fake_json_files(
        &json_dir,
        cli.participants,
        cli.modes,
        cli.files_per_participant,
        &mut rng,
    )
    .with_context(|| format!("cannot write trial files to {}", json_dir.display()))?;

    let participants: Vec<String> = (1..=cli.participants).map(|p| format!("{p:02}")).collect();
    let conditions: Vec<Condition> = (0..cli.modes).map(Condition::new).collect();
    let order_path = cli.directory.join("other").join("order.xlsx");
    write_order_table(&order_path, &participants, &conditions)
        .with_context(|| format!("cannot write {}", order_path.display()))?;

    println!("Wrote {} trial files to {}", files.len(), json_dir.display());
    println!("Wrote order table to {}", order_path.display());
    Ok(())
}
