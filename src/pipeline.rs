//! Orchestrator: runs the phases strictly in sequence and assembles the
//! run summary.
//!
//! Fatal errors (fetch exhausted, table unrecognizable) abort the run
//! before load. Everything else (an empty page, validation findings, a
//! single failed sink) completes the run and is surfaced in the summary.
//! Both sinks failing leaves no durable output, so that counts as a failed
//! run even though the phases upstream completed.

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::fetch::Fetcher;
use crate::load::Loader;
use crate::renderer::PageRenderer;
use crate::types::{Phase, PipelineRun, RunStatus};
use crate::validate::Validator;
use crate::{parse, transform};

pub struct Pipeline {
    fetcher: Fetcher,
    validator: Validator,
    loader: Loader,
}

impl Pipeline {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: &Config) -> Self {
        Self {
            fetcher: Fetcher::new(renderer, config.scraper.clone()),
            validator: Validator::default(),
            loader: Loader::new(&config.storage),
        }
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// One full extract-transform-validate-load run for `season`.
    ///
    /// The summary is built up as phases complete; no state outlives the
    /// returned `PipelineRun`, so repeated runs in one process never
    /// interfere.
    pub async fn run(&self, season: u16) -> PipelineRun {
        let mut run = PipelineRun::new(season);
        info!(season, "starting pipeline run");

        // EXTRACT
        let timer = Instant::now();
        let html = match self.fetcher.fetch_season_totals(season).await {
            Ok(html) => html,
            Err(e) => return self.abort(run, Phase::Fetch, timer, e),
        };
        run.record_phase(Phase::Fetch, timer.elapsed());

        // PARSE
        let timer = Instant::now();
        let (records, skipped) = match parse::parse_season_totals(&html, season) {
            Ok(parsed) => parsed,
            Err(e) => return self.abort(run, Phase::Parse, timer, e),
        };
        run.record_phase(Phase::Parse, timer.elapsed());
        run.records_in = records.len();
        run.rows_skipped = skipped;

        // TRANSFORM
        let timer = Instant::now();
        let (stats, report) = transform::transform(records);
        run.record_phase(Phase::Transform, timer.elapsed());
        run.records_out = stats.len();
        run.transform = report;

        // VALIDATE (advisory; records pass through unchanged)
        let timer = Instant::now();
        run.findings = self.validator.validate(&stats);
        run.record_phase(Phase::Validate, timer.elapsed());

        // LOAD
        let timer = Instant::now();
        let outcome = self.loader.load(&stats, season, run.started_at);
        run.record_phase(Phase::Load, timer.elapsed());
        run.csv_path = outcome.csv_path;
        run.table_name = outcome
            .table_rows
            .map(|_| self.loader.table_name().to_string());
        run.load_errors = outcome.errors.iter().map(|e| e.to_string()).collect();

        let no_sink_written = run.csv_path.is_none() && run.table_name.is_none();
        run.status = if no_sink_written && !run.load_errors.is_empty() {
            run.error = Some("all load sinks failed".to_string());
            RunStatus::Failed
        } else if run.findings.is_empty() && run.load_errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        };
        run.finished_at = Some(Local::now());
        info!(status = %run.status, records = run.records_out, "pipeline run finished");
        run
    }

    fn abort(
        &self,
        mut run: PipelineRun,
        phase: Phase,
        timer: Instant,
        e: PipelineError,
    ) -> PipelineRun {
        error!(%phase, error = %e, "fatal pipeline error");
        run.record_phase(phase, timer.elapsed());
        run.status = RunStatus::Failed;
        run.error = Some(e.to_string());
        run.finished_at = Some(Local::now());
        run
    }
}

/// Human-readable end-of-run summary. Always printed, success or not.
pub fn print_summary(run: &PipelineRun, loader: &Loader) {
    println!("\n{}", "=".repeat(60));
    println!("PIPELINE SUMMARY, season {}", run.season);
    println!("{}", "=".repeat(60));
    println!("Status: {}", run.status);
    if let Some(error) = &run.error {
        println!("Error: {error}");
    }
    println!(
        "Records: {} in / {} out ({} skipped at parse, {} merged, {} totals synthesized)",
        run.records_in,
        run.records_out,
        run.rows_skipped,
        run.transform.rows_merged,
        run.transform.totals_synthesized,
    );
    if run.transform.conversion_failures > 0 {
        println!(
            "Conversion failures: {} (fields nulled)",
            run.transform.conversion_failures
        );
    }
    if run.transform.duplicate_totals > 0 {
        println!(
            "Data integrity: {} player-season(s) had multiple total rows; kept the first",
            run.transform.duplicate_totals
        );
    }

    for (phase, duration) in &run.phase_durations {
        println!("  {phase:<10} {:>8.2?}", duration);
    }
    if let Some(total) = run.total_duration() {
        println!("Total duration: {:.2}s", total.num_milliseconds() as f64 / 1000.0);
    }

    if !run.findings.is_empty() {
        println!("\nValidation findings ({}):", run.findings.len());
        for f in &run.findings {
            println!(
                "  [{}] {}: {} ({}): {}",
                f.severity, f.rule, f.player, f.team, f.message
            );
        }
    }
    if !run.load_errors.is_empty() {
        println!("\nLoad errors:");
        for e in &run.load_errors {
            println!("  - {e}");
        }
    }

    if let Some(path) = &run.csv_path {
        println!("\nCSV output: {}", path.display());
    }
    if run.table_name.is_some() {
        println!("Database: {}", loader.db_path().display());
    }
    println!("{}", "=".repeat(60));
}
