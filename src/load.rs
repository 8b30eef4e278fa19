//! Load phase: persist the validated table to two independent sinks.
//!
//! The SQLite table is replaced wholesale on every run (no incremental
//! merge), and the CSV export gets a fresh timestamped file. Both sinks are
//! attempted even when one fails; a single-sink failure is reported as a
//! partial failure rather than aborting the other write.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result, Sink};
use crate::types::PlayerSeasonStat;

/// Column order shared by the SQLite table and the CSV export.
const COLUMNS: &[&str] = &[
    "player", "season", "team", "pos", "age", "g", "gs", "mp", "fg", "fga", "fg3", "fg3a", "fg2",
    "fg2a", "ft", "fta", "orb", "drb", "trb", "ast", "stl", "blk", "tov", "pf", "pts", "fg_pct",
    "fg3_pct", "fg2_pct", "efg_pct", "ft_pct", "ts_pct", "pts_per_game", "trb_per_game",
    "ast_per_game", "mp_per_game",
];

/// Result of a load: each sink either produced output or contributed a
/// partial-failure error. Both lists can be non-empty at once.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub csv_path: Option<PathBuf>,
    pub table_rows: Option<usize>,
    pub errors: Vec<PipelineError>,
}

pub struct Loader {
    db_path: PathBuf,
    processed_dir: PathBuf,
    table_name: String,
}

impl Loader {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            db_path: storage.data_dir.join("nba_stats.db"),
            processed_dir: storage.data_dir.join("processed"),
            table_name: storage.table_name.clone(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Write both sinks in sequence. A sink failure is recorded and the
    /// other sink is still written.
    pub fn load(
        &self,
        stats: &[PlayerSeasonStat],
        season: u16,
        started_at: DateTime<Local>,
    ) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();

        match self.write_sqlite(stats) {
            Ok(rows) => {
                info!(rows, table = %self.table_name, "sqlite sink written");
                outcome.table_rows = Some(rows);
            }
            Err(e) => outcome.errors.push(PipelineError::LoadPartiallyFailed {
                sink: Sink::Sqlite,
                cause: e.to_string(),
            }),
        }

        match self.write_csv(stats, season, started_at) {
            Ok(path) => {
                info!(path = %path.display(), rows = stats.len(), "csv sink written");
                outcome.csv_path = Some(path);
            }
            Err(e) => outcome.errors.push(PipelineError::LoadPartiallyFailed {
                sink: Sink::Csv,
                cause: e.to_string(),
            }),
        }

        outcome
    }

    /// Replace the stats table: drop, recreate, insert, all in one
    /// transaction. Connection is scoped to this call.
    fn write_sqlite(&self, stats: &[PlayerSeasonStat]) -> Result<usize> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(&self.db_path)?;
        let tx = conn.transaction()?;

        tx.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS {table};
            CREATE TABLE {table} (
                player        TEXT NOT NULL,
                season        INTEGER NOT NULL,
                team          TEXT NOT NULL,
                pos           TEXT,
                age           INTEGER,
                g             INTEGER NOT NULL,
                gs            INTEGER NOT NULL,
                mp            INTEGER NOT NULL,
                fg            INTEGER NOT NULL,
                fga           INTEGER NOT NULL,
                fg3           INTEGER NOT NULL,
                fg3a          INTEGER NOT NULL,
                fg2           INTEGER NOT NULL,
                fg2a          INTEGER NOT NULL,
                ft            INTEGER NOT NULL,
                fta           INTEGER NOT NULL,
                orb           INTEGER NOT NULL,
                drb           INTEGER NOT NULL,
                trb           INTEGER NOT NULL,
                ast           INTEGER NOT NULL,
                stl           INTEGER NOT NULL,
                blk           INTEGER NOT NULL,
                tov           INTEGER NOT NULL,
                pf            INTEGER NOT NULL,
                pts           INTEGER NOT NULL,
                fg_pct        REAL,
                fg3_pct       REAL,
                fg2_pct       REAL,
                efg_pct       REAL,
                ft_pct        REAL,
                ts_pct        REAL,
                pts_per_game  REAL,
                trb_per_game  REAL,
                ast_per_game  REAL,
                mp_per_game   REAL,
                PRIMARY KEY (player, season, team)
            );
            "#,
            table = self.table_name
        ))?;

        {
            let placeholders = (1..=COLUMNS.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.table_name,
                COLUMNS.join(", ")
            ))?;
            for s in stats {
                stmt.execute(params![
                    s.player,
                    s.season,
                    s.team,
                    s.pos,
                    s.age,
                    s.g,
                    s.gs,
                    s.mp,
                    s.fg,
                    s.fga,
                    s.fg3,
                    s.fg3a,
                    s.fg2,
                    s.fg2a,
                    s.ft,
                    s.fta,
                    s.orb,
                    s.drb,
                    s.trb,
                    s.ast,
                    s.stl,
                    s.blk,
                    s.tov,
                    s.pf,
                    s.pts,
                    s.fg_pct,
                    s.fg3_pct,
                    s.fg2_pct,
                    s.efg_pct,
                    s.ft_pct,
                    s.ts_pct,
                    s.pts_per_game,
                    s.trb_per_game,
                    s.ast_per_game,
                    s.mp_per_game,
                ])?;
            }
        }
        tx.commit()?;
        Ok(stats.len())
    }

    /// One timestamped CSV per run. The header row is written even for an
    /// empty run so downstream tooling always sees the schema.
    fn write_csv(
        &self,
        stats: &[PlayerSeasonStat],
        season: u16,
        started_at: DateTime<Local>,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.processed_dir)?;
        let filename = format!(
            "nba_player_totals_{season}_{}.csv",
            started_at.format("%Y%m%d_%H%M%S")
        );
        let path = self.processed_dir.join(filename);

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(COLUMNS)?;
        for s in stats {
            writer.write_record(csv_row(s))?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Read-back interface: run an arbitrary read-only query against the
    /// store. Returns the column headers followed by each row, all values
    /// rendered as strings (nulls as empty strings).
    pub fn query(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        let conn = Connection::open(&self.db_path)?;
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let header: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut results = vec![header];
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut rendered = Vec::with_capacity(column_count);
            for i in 0..column_count {
                use rusqlite::types::ValueRef;
                let value = match row.get_ref(i)? {
                    ValueRef::Null => String::new(),
                    ValueRef::Integer(v) => v.to_string(),
                    ValueRef::Real(v) => v.to_string(),
                    ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                    ValueRef::Blob(_) => "<blob>".to_string(),
                };
                rendered.push(value);
            }
            results.push(rendered);
        }
        Ok(results)
    }
}

fn csv_row(s: &PlayerSeasonStat) -> Vec<String> {
    fn opt<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(T::to_string).unwrap_or_default()
    }
    vec![
        s.player.clone(),
        s.season.to_string(),
        s.team.clone(),
        opt(&s.pos),
        opt(&s.age),
        s.g.to_string(),
        s.gs.to_string(),
        s.mp.to_string(),
        s.fg.to_string(),
        s.fga.to_string(),
        s.fg3.to_string(),
        s.fg3a.to_string(),
        s.fg2.to_string(),
        s.fg2a.to_string(),
        s.ft.to_string(),
        s.fta.to_string(),
        s.orb.to_string(),
        s.drb.to_string(),
        s.trb.to_string(),
        s.ast.to_string(),
        s.stl.to_string(),
        s.blk.to_string(),
        s.tov.to_string(),
        s.pf.to_string(),
        s.pts.to_string(),
        opt(&s.fg_pct),
        opt(&s.fg3_pct),
        opt(&s.fg2_pct),
        opt(&s.efg_pct),
        opt(&s.ft_pct),
        opt(&s.ts_pct),
        opt(&s.pts_per_game),
        opt(&s.trb_per_game),
        opt(&s.ast_per_game),
        opt(&s.mp_per_game),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn sample(player: &str, pts: i32) -> PlayerSeasonStat {
        PlayerSeasonStat {
            player: player.into(),
            season: 2024,
            team: "SEA".into(),
            pos: Some("G".into()),
            age: Some(25),
            g: 10,
            gs: 8,
            mp: 300,
            fg: 40,
            fga: 90,
            fg3: 10,
            fg3a: 30,
            fg2: 30,
            fg2a: 60,
            ft: 10,
            fta: 12,
            orb: 10,
            drb: 30,
            trb: 40,
            ast: 25,
            stl: 8,
            blk: 4,
            tov: 12,
            pf: 20,
            pts,
            fg_pct: Some(0.444),
            fg3_pct: Some(0.333),
            fg2_pct: Some(0.5),
            efg_pct: Some(0.5),
            ft_pct: Some(0.833),
            ts_pct: Some(0.524),
            pts_per_game: Some(f64::from(pts) / 10.0),
            trb_per_game: Some(4.0),
            ast_per_game: Some(2.5),
            mp_per_game: Some(30.0),
        }
    }

    fn loader_in(dir: &Path) -> Loader {
        Loader::new(&StorageConfig {
            data_dir: dir.to_path_buf(),
            table_name: "player_totals".into(),
        })
    }

    #[test]
    fn both_sinks_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_in(dir.path());

        let outcome = loader.load(&[sample("A", 100), sample("B", 80)], 2024, Local::now());
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.table_rows, Some(2));

        let csv_path = outcome.csv_path.unwrap();
        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("player,season,team"));
        assert_eq!(content.lines().count(), 3);
        assert!(csv_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("nba_player_totals_2024_"));
    }

    #[test]
    fn reload_replaces_rather_than_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_in(dir.path());
        let stats = vec![sample("A", 100), sample("B", 80)];

        loader.load(&stats, 2024, Local::now());
        loader.load(&stats, 2024, Local::now());

        let rows = loader
            .query("SELECT COUNT(*) FROM player_totals")
            .unwrap();
        assert_eq!(rows[1][0], "2");
    }

    #[test]
    fn empty_run_leaves_empty_table_and_header_only_csv() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_in(dir.path());

        let outcome = loader.load(&[], 2024, Local::now());
        assert!(outcome.errors.is_empty());

        let rows = loader.query("SELECT COUNT(*) FROM player_totals").unwrap();
        assert_eq!(rows[1][0], "0");

        let content = std::fs::read_to_string(outcome.csv_path.unwrap()).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn query_returns_header_then_rows_with_nulls_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_in(dir.path());
        let mut stat = sample("A", 100);
        stat.age = None;
        loader.load(&[stat], 2024, Local::now());

        let rows = loader
            .query("SELECT player, age, pts FROM player_totals")
            .unwrap();
        assert_eq!(rows[0], vec!["player", "age", "pts"]);
        assert_eq!(rows[1], vec!["A", "", "100"]);
    }

    #[test]
    fn csv_failure_does_not_abort_sqlite_sink() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_in(dir.path());
        // Occupy the processed dir path with a file so CSV creation fails
        std::fs::write(dir.path().join("processed"), b"not a dir").unwrap();

        let outcome = loader.load(&[sample("A", 100)], 2024, Local::now());
        assert_eq!(outcome.table_rows, Some(1));
        assert!(outcome.csv_path.is_none());
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            PipelineError::LoadPartiallyFailed {
                sink: Sink::Csv,
                ..
            }
        ));
    }
}
