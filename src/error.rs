use thiserror::Error;

/// Which output sink a load failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Sqlite,
    Csv,
}

impl std::fmt::Display for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Sqlite => write!(f, "sqlite"),
            Sink::Csv => write!(f, "csv"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// All fetch attempts were exhausted. Fatal to the run.
    #[error("fetch failed after {attempts} attempts: {cause}")]
    FetchFailed { attempts: u32, cause: String },

    /// The stats table's structural shape was unrecognizable. Fatal to the run.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// One output sink failed while the other may have succeeded. Non-fatal,
    /// surfaced in the run summary.
    #[error("{sink} sink failed: {cause}")]
    LoadPartiallyFailed { sink: Sink, cause: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
