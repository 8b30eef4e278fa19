//! Batch ETL pipeline for NBA player season totals: scrape the rendered
//! stats page, consolidate traded players, validate, and load into SQLite
//! plus a timestamped CSV export.

pub mod config;
pub mod error;
pub mod fetch;
pub mod load;
pub mod logging;
pub mod parse;
pub mod pipeline;
pub mod renderer;
pub mod transform;
pub mod types;
pub mod validate;
