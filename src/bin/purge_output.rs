//! Operator helper that returns docsift's on-disk state to idle.
//!
//! Overwrites the output file with `[]`, deletes temporary siblings left by interrupted writes
//! and, with `--sweep`, removes every request directory under the staging root. Useful after a
//! crash left a populated output file behind.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use docsift::{
    config,
    sink::ResultSink,
    staging::{StagingArea, age_from_minutes},
};

#[derive(Parser)]
#[command(
    name = "purge-output",
    about = "Erase docsift's transient output and leftover staged uploads"
)]
struct Cli {
    /// Output file to reset (defaults to `OUTPUT_PATH` or `output.json`).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Staging root to sweep (defaults to `STAGING_DIR` or `uploads`).
    #[arg(long)]
    staging: Option<PathBuf>,
    /// Also remove request directories left under the staging root.
    #[arg(long)]
    sweep: bool,
    /// Only sweep directories at least this many minutes old.
    #[arg(long, default_value_t = 0)]
    min_age_minutes: u64,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load().context("failed to read configuration")?;

    let sink = ResultSink::new(cli.output.unwrap_or(config.output_path));
    sink.erase().await?;
    println!("cleared {}", sink.path().display());

    if cli.sweep {
        let staging = StagingArea::new(cli.staging.unwrap_or(config.staging_dir));
        let removed = staging
            .sweep_stale(age_from_minutes(cli.min_age_minutes))
            .with_context(|| format!("failed to sweep {}", staging.root().display()))?;
        println!(
            "removed {removed} staging director{} under {}",
            if removed == 1 { "y" } else { "ies" },
            staging.root().display()
        );
    }

    Ok(())
}
