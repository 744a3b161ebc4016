mod assembler;
mod classify;
mod config;
mod idgen;
mod loader;
mod models;
mod pipeline;
mod report;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::pipeline::{Pipeline, RunOptions};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "cb-etl", about = "Convertible bond market data ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape (or re-read today's cached page), classify, and write reports
    Run {
        /// Fetch the live page even when today's cache exists
        #[arg(long)]
        refresh: bool,

        /// Also upsert the record table into DuckDB
        #[arg(long)]
        store: bool,

        /// Skip the CSV report sheets
        #[arg(long)]
        no_report: bool,
    },

    /// Show database statistics
    Stats,

    /// List all stored bonds
    Bonds,

    /// Apply schema migrations without loading data
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "cb_etl=info,warn",
        1 => "cb_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run { refresh, store, no_report } => {
            let _t = utils::Timer::start("Quote ingest");
            let stats = Pipeline::new(config)
                .run(RunOptions {
                    refresh,
                    report: !no_report,
                    store,
                })
                .await?;
            info!(
                "Done: {} rows seen, {} records, {} skipped",
                stats.rows_seen, stats.records_extracted, stats.rows_skipped
            );
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let bonds = repo.bond_count()?;
            let runs = repo.run_count()?;
            let latest = repo.latest_scraped_at().unwrap_or(None);
            println!("─────────────────────────────────");
            println!("  CB ETL — Database Stats");
            println!("─────────────────────────────────");
            println!("  Bonds    : {}", utils::fmt_number(bonds));
            println!("  Runs     : {}", utils::fmt_number(runs));
            println!("  Latest   : {}", latest.map(|t| t.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }

        Command::Bonds => {
            let repo = Repository::open(&config.storage.db_path)?;
            let bonds = repo.list_bonds()?;
            if bonds.is_empty() {
                println!("No bonds — run `cb-etl run --store` first.");
            } else {
                println!("{} bonds:", bonds.len());
                for (code, name) in &bonds {
                    println!("  {}  {}", code, name);
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
