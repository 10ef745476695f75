// src/main.rs
//! scf-report: compute the survey report tables for the configured waves
//!
//! Usage: scf-report [--config <TOML>] [--data-dir <DIR>] [--out-dir <DIR>]

mod config;
mod pipeline;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::config::{Config, Layout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the wave files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory the tables are written to
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Read the full public and summary tables and harmonize them
    #[arg(long)]
    raw: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data.dir = dir;
    }
    if let Some(dir) = cli.out_dir {
        config.output.dir = dir;
    }
    if cli.raw {
        config.data.layout = Layout::Raw;
    }

    info!(
        "waves {:?}, bins {:?}, data in {}",
        config.waves,
        config.bin_counts,
        config.data.dir.display()
    );
    let mut report = pipeline::run(&config)?;
    pipeline::write(&mut report, &config.output.dir)?;

    if !report.skipped.is_empty() {
        info!("skipped tables: {}", report.skipped.join(", "));
    }
    Ok(())
}
