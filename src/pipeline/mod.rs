//! Pipeline orchestrator: acquisition → extraction → assembly →
//! classification → sinks.
//!
//! ## Flow
//!
//! `run()`:
//!   1. Get the quote document — today's cached HTML if present, else a live
//!      fetch (written back to the cache).
//!   2. Parse every table row into raw captures, clean them into records,
//!      attach ids. Malformed rows are skipped and collected, never fatal;
//!      they are logged and dumped as JSON for manual inspection.
//!   3. Classify the record table into strategy subsets.
//!   4. Report (CSV sheet per subset + "All") and, when requested, upsert
//!      into DuckDB keyed on (cb_id, cb_code). Idempotent: re-running the
//!      same day updates rows instead of duplicating them.

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::assembler::{self, AssembleOutcome};
use crate::classify;
use crate::config::AppConfig;
use crate::idgen::{IdSourceError, IdWorker};
use crate::loader;
use crate::report::ReportWriter;
use crate::scraper::{NinwinScraper, QuoteTableSource, parsers};
use crate::storage::Repository;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Nothing extracted — there is nothing to classify or report.
    #[error("no rows produced a valid record ({rows_seen} raw rows seen)")]
    ExtractionExhausted { rows_seen: usize },
    /// Fatal: partially-id'd output would break the natural-key contract.
    #[error("id issuance failed: {0}")]
    IdSource(#[from] IdSourceError),
}

#[derive(Debug, Default)]
pub struct RunOptions {
    /// Fetch the live page even when today's cache exists.
    pub refresh: bool,
    pub report: bool,
    pub store: bool,
}

#[derive(Debug)]
pub struct PipelineStats {
    pub rows_seen: usize,
    pub records_extracted: usize,
    pub rows_skipped: usize,
    pub subset_counts: Vec<(&'static str, usize)>,
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, opts: RunOptions) -> Result<PipelineStats> {
        let now = Local::now().naive_local();
        let today = now.date();

        // ── 1. Acquire the quote document ─────────────────────────────────────
        let cache = loader::cache_path(&self.config.scraper.html_dir, today);
        let html = match (opts.refresh, loader::load_cached(&cache)?) {
            (false, Some(html)) => {
                info!("Using cached document {:?}", cache);
                html
            }
            _ => {
                let scraper = NinwinScraper::new(&self.config.scraper)
                    .context("Failed to build scraper")?;
                let html = scraper.fetch_table_html().await?;
                loader::save_cache(&cache, &html)?;
                html
            }
        };

        // ── 2. Extract and assemble ───────────────────────────────────────────
        let rows = parsers::parse_quote_table(&html)?;
        info!("quote table: {} raw rows", rows.len());

        let mut ids = IdWorker::new(self.config.pipeline.worker_id)
            .map_err(PipelineError::IdSource)?;
        let outcome = assembler::assemble(&rows, &mut ids, now)
            .map_err(PipelineError::IdSource)?;

        if !outcome.failures.is_empty() {
            self.dump_failures(&outcome, today)?;
        }
        if outcome.records.is_empty() {
            return Err(PipelineError::ExtractionExhausted {
                rows_seen: outcome.rows_seen,
            }
            .into());
        }

        // ── 3. Classify ───────────────────────────────────────────────────────
        let subsets = classify::classify(&outcome.records);

        // ── 4. Sinks ──────────────────────────────────────────────────────────
        if opts.report {
            let writer = ReportWriter::new(&self.config.report.out_dir, today);
            writer.write_table(&outcome.records, "All")?;
            for subset in &subsets {
                writer.write_table(&subset.records, subset.sheet_name)?;
            }
        }

        if opts.store {
            let repo = Repository::open(&self.config.storage.db_path)
                .context("Failed to open DuckDB")?;
            if self.config.storage.run_migrations {
                repo.run_migrations()?;
            }
            let run_id = repo.begin_ingest_run().unwrap_or(0);
            repo.upsert_bonds(&outcome.records)?;
            let finish_err = if outcome.failures.is_empty() {
                None
            } else {
                Some(format!("{} rows skipped", outcome.failures.len()))
            };
            repo.finish_ingest_run(
                run_id,
                outcome.rows_seen,
                outcome.records.len(),
                finish_err.as_deref(),
            )
            .ok();
        }

        let stats = PipelineStats {
            rows_seen: outcome.rows_seen,
            records_extracted: outcome.records.len(),
            rows_skipped: outcome.failures.len(),
            subset_counts: subsets
                .iter()
                .map(|s| (s.sheet_name, s.records.len()))
                .collect(),
        };

        info!(
            "=== Done: {} rows | {} records | {} skipped | subsets: {:?} ===",
            stats.rows_seen, stats.records_extracted, stats.rows_skipped, stats.subset_counts,
        );
        Ok(stats)
    }

    /// Dump skipped rows next to the reports so they can be inspected by hand.
    fn dump_failures(&self, outcome: &AssembleOutcome, today: chrono::NaiveDate) -> Result<()> {
        for failure in &outcome.failures {
            warn!("row {}: {}", failure.index, failure.error);
        }

        let entries: Vec<serde_json::Value> = outcome
            .failures
            .iter()
            .map(|f| {
                json!({
                    "row": f.index,
                    "error": f.error.to_string(),
                    "source": f.source,
                })
            })
            .collect();

        let dir = &self.config.report.out_dir;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Could not create dir {:?}", dir))?;
        let path = dir.join(format!("{}_skipped_rows.json", today.format("%Y-%m-%d")));
        std::fs::write(&path, serde_json::to_string_pretty(&entries)?)
            .with_context(|| format!("Could not write {:?}", path))?;
        info!("{} skipped rows dumped to {:?}", entries.len(), path);
        Ok(())
    }
}
