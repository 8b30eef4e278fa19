use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

/// One scraped row exactly as it appears on the page, keyed by the table's
/// per-cell `data-stat` attributes. Values are untyped strings; typing
/// happens in the transform phase.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub season: u16,
    pub cells: HashMap<String, String>,
}

impl RawRecord {
    /// First non-empty value among the given `data-stat` keys. The page has
    /// renamed columns over the years (e.g. `team_id` vs `team_name_abbr`),
    /// so lookups accept aliases.
    pub fn stat(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.cells.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    pub fn player(&self) -> Option<&str> {
        self.stat(&["player", "name_display"])
    }

    pub fn team(&self) -> Option<&str> {
        self.stat(&["team_name_abbr", "team_id", "team"])
    }
}

/// Canonical per-player season line after transformation.
///
/// Counting stats are totals for the season. They are signed so that a
/// corrupt negative source value survives transform unchanged and can be
/// flagged by validation instead of being rewritten. Percentage stats live
/// in `[0, 1]` and are `None` when the corresponding attempt count is zero
/// or the source omitted the value. Per-game rates are `None` when games
/// played is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSeasonStat {
    pub player: String,
    pub season: u16,
    /// Team code, or the sentinel `TOT`/`2TM`-style marker for a player who
    /// changed teams mid-season.
    pub team: String,
    pub pos: Option<String>,
    pub age: Option<u32>,

    pub g: i32,
    pub gs: i32,
    pub mp: i32,
    pub fg: i32,
    pub fga: i32,
    pub fg3: i32,
    pub fg3a: i32,
    pub fg2: i32,
    pub fg2a: i32,
    pub ft: i32,
    pub fta: i32,
    pub orb: i32,
    pub drb: i32,
    pub trb: i32,
    pub ast: i32,
    pub stl: i32,
    pub blk: i32,
    pub tov: i32,
    pub pf: i32,
    pub pts: i32,

    pub fg_pct: Option<f64>,
    pub fg3_pct: Option<f64>,
    pub fg2_pct: Option<f64>,
    pub efg_pct: Option<f64>,
    pub ft_pct: Option<f64>,
    pub ts_pct: Option<f64>,

    pub pts_per_game: Option<f64>,
    pub trb_per_game: Option<f64>,
    pub ast_per_game: Option<f64>,
    pub mp_per_game: Option<f64>,
}

impl PlayerSeasonStat {
    /// Every counting stat, named, for validation.
    pub fn counting_stats(&self) -> [(&'static str, i32); 20] {
        [
            ("g", self.g),
            ("gs", self.gs),
            ("mp", self.mp),
            ("fg", self.fg),
            ("fga", self.fga),
            ("fg3", self.fg3),
            ("fg3a", self.fg3a),
            ("fg2", self.fg2),
            ("fg2a", self.fg2a),
            ("ft", self.ft),
            ("fta", self.fta),
            ("orb", self.orb),
            ("drb", self.drb),
            ("trb", self.trb),
            ("ast", self.ast),
            ("stl", self.stl),
            ("blk", self.blk),
            ("tov", self.tov),
            ("pf", self.pf),
            ("pts", self.pts),
        ]
    }

    /// All non-null percentage fields, named, for validation.
    pub fn percentages(&self) -> Vec<(&'static str, f64)> {
        [
            ("fg_pct", self.fg_pct),
            ("fg3_pct", self.fg3_pct),
            ("fg2_pct", self.fg2_pct),
            ("efg_pct", self.efg_pct),
            ("ft_pct", self.ft_pct),
            ("ts_pct", self.ts_pct),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| (name, v)))
        .collect()
    }
}

/// Severity of a validation finding. All findings are advisory; none halt
/// the pipeline or remove records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// One violated rule, attached to the run summary for human review.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFinding {
    pub rule: &'static str,
    pub severity: Severity,
    pub player: String,
    pub team: String,
    pub message: String,
}

/// Counters reported by the transform phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Player-season groups that had more than one source row.
    pub rows_merged: usize,
    /// Groups that had no TOT row and needed a synthesized total.
    pub totals_synthesized: usize,
    /// Groups carrying more than one TOT row, a source data-integrity
    /// violation. The first TOT row is kept; the rest are dropped.
    pub duplicate_totals: usize,
    /// Non-empty numeric cells that failed conversion and became null/zero.
    pub conversion_failures: usize,
}

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Fetch,
    Parse,
    Transform,
    Validate,
    Load,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Fetch => write!(f, "fetch"),
            Phase::Parse => write!(f, "parse"),
            Phase::Transform => write!(f, "transform"),
            Phase::Validate => write!(f, "validate"),
            Phase::Load => write!(f, "load"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Clean run, no findings, both sinks written.
    Success,
    /// Run completed but with validation findings or a sink failure.
    PartialSuccess,
    /// A fatal error aborted the run before load.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::PartialSuccess => write!(f, "PARTIAL SUCCESS"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Summary of one pipeline invocation. Built up mutably as phases complete
/// so that the summary is testable in isolation and runs never share state.
#[derive(Debug, Serialize)]
pub struct PipelineRun {
    pub season: u16,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    #[serde(serialize_with = "serialize_durations")]
    pub phase_durations: Vec<(Phase, Duration)>,
    pub records_in: usize,
    pub records_out: usize,
    pub rows_skipped: usize,
    pub transform: TransformReport,
    pub findings: Vec<ValidationFinding>,
    /// Sink-level failures from a partial load.
    pub load_errors: Vec<String>,
    pub csv_path: Option<PathBuf>,
    pub table_name: Option<String>,
    pub status: RunStatus,
    /// Cause, when status is `Failed`.
    pub error: Option<String>,
}

impl PipelineRun {
    pub fn new(season: u16) -> Self {
        Self {
            season,
            started_at: Local::now(),
            finished_at: None,
            phase_durations: Vec::new(),
            records_in: 0,
            records_out: 0,
            rows_skipped: 0,
            transform: TransformReport::default(),
            findings: Vec::new(),
            load_errors: Vec::new(),
            csv_path: None,
            table_name: None,
            status: RunStatus::Failed,
            error: None,
        }
    }

    pub fn record_phase(&mut self, phase: Phase, elapsed: Duration) {
        self.phase_durations.push((phase, elapsed));
    }

    pub fn total_duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

fn serialize_durations<S>(
    durations: &[(Phase, Duration)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(durations.len()))?;
    for (phase, d) in durations {
        map.serialize_entry(&phase.to_string(), &d.as_millis())?;
    }
    map.end()
}
