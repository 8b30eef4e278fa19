use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use tracing::error;

use nba_pipeline::config::Config;
use nba_pipeline::load::Loader;
use nba_pipeline::logging;
use nba_pipeline::pipeline::{print_summary, Pipeline};
use nba_pipeline::renderer::{ChromiumRenderer, PageRenderer};
use nba_pipeline::types::RunStatus;

#[derive(Parser)]
#[command(name = "nba_pipeline")]
#[command(about = "NBA player season totals ETL pipeline")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (defaults apply when missing)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Defaults to `run` for the current season when omitted
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape, transform, validate and load one season of player totals
    Run {
        /// Season end year (e.g. 2025 for the 2024-25 season); defaults to
        /// the current season
        #[arg(long)]
        season: Option<u16>,
    },
    /// Run a read-only SQL query against the stats database
    Query {
        /// SQL to execute, e.g. "SELECT player, pts_per_game FROM
        /// player_totals ORDER BY pts_per_game DESC LIMIT 10"
        sql: String,
    },
}

/// End year of the season currently in progress. A new season tips off in
/// October and carries the following calendar year.
fn current_season() -> u16 {
    let today = Local::now();
    let year = today.year() as u16;
    if today.month() >= 10 {
        year + 1
    } else {
        year
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Commands::Run { season: None }) {
        Commands::Run { season } => {
            let season = season.unwrap_or_else(current_season);

            let renderer = match ChromiumRenderer::launch(config.scraper.chrome_path.clone()).await
            {
                Ok(renderer) => Arc::new(renderer),
                Err(e) => {
                    error!("failed to launch browser: {e}");
                    eprintln!("Failed to launch browser: {e}");
                    return ExitCode::FAILURE;
                }
            };

            let pipeline = Pipeline::new(renderer.clone(), &config);
            let run = pipeline.run(season).await;

            // Session is released on every path, including failed runs
            if let Err(e) = renderer.shutdown().await {
                error!("browser shutdown: {e}");
            }

            // Machine-readable copy of the summary for the JSON file log
            if let Ok(json) = serde_json::to_string(&run) {
                tracing::debug!(summary = %json, "run summary");
            }

            print_summary(&run, pipeline.loader());
            match run.status {
                RunStatus::Success | RunStatus::PartialSuccess => ExitCode::SUCCESS,
                RunStatus::Failed => ExitCode::FAILURE,
            }
        }
        Commands::Query { sql } => {
            let loader = Loader::new(&config.storage);
            match loader.query(&sql) {
                Ok(rows) => {
                    for row in rows {
                        println!("{}", row.join(" | "));
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("query failed: {e}");
                    eprintln!("Query failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
