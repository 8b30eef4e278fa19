//! Transform phase: raw string rows in, clean typed season lines out.
//!
//! Consolidation of traded players follows the source's convention: a
//! player who changed teams mid-season appears once per team plus one
//! sentinel total row (`TOT`, or `2TM`/`3TM` in newer page versions). Only
//! the total row survives. When the sentinel is missing, a total is
//! synthesized by summing counting stats and recomputing every percentage
//! from the summed makes and attempts, which weights per-team percentages
//! by attempts by construction.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::types::{PlayerSeasonStat, RawRecord, TransformReport};

/// A player's rows for one season, tagged by whether consolidation is
/// needed. The no-sentinel fallback is a distinct case so it stays
/// testable on its own.
#[derive(Debug)]
enum PlayerGroup {
    Single(RawRecord),
    NeedsMerge(Vec<RawRecord>),
}

/// Marker the source uses for a traded player's combined row.
fn is_total_team(team: &str) -> bool {
    team == "TOT" || (team.len() == 3 && team.ends_with("TM"))
}

#[derive(Default)]
struct Converter {
    failures: usize,
}

impl Converter {
    /// Counting stats: a missing cell means the stat was not accrued, so it
    /// becomes 0. An unparseable non-empty cell also becomes 0 but is
    /// counted as a conversion failure. Parsing is signed: a negative cell
    /// is kept as-is for validation to flag, never rewritten here.
    fn count(&mut self, record: &RawRecord, keys: &[&str]) -> i32 {
        match record.stat(keys) {
            None => 0,
            Some(s) => s.parse().unwrap_or_else(|_| {
                self.failures += 1;
                0
            }),
        }
    }

    /// Percentages and other optional numerics: missing stays null. Never
    /// coerced to zero, because "no attempts" and "scrape gap" are both
    /// "unknown rate", not a 0% rate.
    fn fraction(&mut self, record: &RawRecord, keys: &[&str]) -> Option<f64> {
        match record.stat(keys) {
            None => None,
            Some(s) => match s.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    self.failures += 1;
                    None
                }
            },
        }
    }

    fn opt_count(&mut self, record: &RawRecord, keys: &[&str]) -> Option<u32> {
        match record.stat(keys) {
            None => None,
            Some(s) => match s.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    self.failures += 1;
                    None
                }
            },
        }
    }
}

pub fn transform(records: Vec<RawRecord>) -> (Vec<PlayerSeasonStat>, TransformReport) {
    let mut report = TransformReport {
        rows_in: records.len(),
        ..Default::default()
    };

    let mut converter = Converter::default();
    let groups = group_by_player(records);

    let mut stats = Vec::with_capacity(groups.len());
    for group in groups {
        let stat = match group {
            PlayerGroup::Single(record) => convert_row(&record, &mut converter),
            PlayerGroup::NeedsMerge(rows) => {
                report.rows_merged += 1;
                match rows.iter().position(|r| {
                    r.team().map(is_total_team).unwrap_or(false)
                }) {
                    Some(idx) => {
                        let total_count = rows
                            .iter()
                            .filter(|r| r.team().map(is_total_team).unwrap_or(false))
                            .count();
                        if total_count > 1 {
                            report.duplicate_totals += 1;
                            warn!(
                                player = rows[idx].player().unwrap_or("?"),
                                total_rows = total_count,
                                "multiple total rows for one player-season, keeping the first"
                            );
                        }
                        convert_row(&rows[idx], &mut converter)
                    }
                    None => {
                        report.totals_synthesized += 1;
                        synthesize_total(&rows, &mut converter)
                    }
                }
            }
        };
        stats.push(with_derived(stat));
    }

    report.rows_out = stats.len();
    report.conversion_failures = converter.failures;
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        merged = report.rows_merged,
        synthesized = report.totals_synthesized,
        "transform complete"
    );
    (stats, report)
}

/// Group rows by (player, season), preserving first-appearance order.
fn group_by_player(records: Vec<RawRecord>) -> Vec<PlayerGroup> {
    let mut index: HashMap<(String, u16), usize> = HashMap::new();
    let mut buckets: Vec<Vec<RawRecord>> = Vec::new();

    for record in records {
        let Some(player) = record.player() else {
            continue;
        };
        let key = (player.to_string(), record.season);
        match index.get(&key) {
            Some(&i) => buckets[i].push(record),
            None => {
                index.insert(key, buckets.len());
                buckets.push(vec![record]);
            }
        }
    }

    buckets
        .into_iter()
        .map(|mut rows| {
            if rows.len() == 1 {
                PlayerGroup::Single(rows.pop().expect("non-empty bucket"))
            } else {
                PlayerGroup::NeedsMerge(rows)
            }
        })
        .collect()
}

fn convert_row(record: &RawRecord, c: &mut Converter) -> PlayerSeasonStat {
    PlayerSeasonStat {
        player: record.player().unwrap_or_default().to_string(),
        season: record.season,
        team: record.team().unwrap_or_default().to_string(),
        pos: record.stat(&["pos"]).map(str::to_string),
        age: c.opt_count(record, &["age"]),
        g: c.count(record, &["g", "games"]),
        gs: c.count(record, &["gs", "games_started"]),
        mp: c.count(record, &["mp"]),
        fg: c.count(record, &["fg"]),
        fga: c.count(record, &["fga"]),
        fg3: c.count(record, &["fg3"]),
        fg3a: c.count(record, &["fg3a"]),
        fg2: c.count(record, &["fg2"]),
        fg2a: c.count(record, &["fg2a"]),
        ft: c.count(record, &["ft"]),
        fta: c.count(record, &["fta"]),
        orb: c.count(record, &["orb"]),
        drb: c.count(record, &["drb"]),
        trb: c.count(record, &["trb"]),
        ast: c.count(record, &["ast"]),
        stl: c.count(record, &["stl"]),
        blk: c.count(record, &["blk"]),
        tov: c.count(record, &["tov"]),
        pf: c.count(record, &["pf"]),
        pts: c.count(record, &["pts"]),
        fg_pct: c.fraction(record, &["fg_pct"]),
        fg3_pct: c.fraction(record, &["fg3_pct"]),
        fg2_pct: c.fraction(record, &["fg2_pct"]),
        efg_pct: c.fraction(record, &["efg_pct"]),
        ft_pct: c.fraction(record, &["ft_pct"]),
        ts_pct: None,
        pts_per_game: None,
        trb_per_game: None,
        ast_per_game: None,
        mp_per_game: None,
    }
}

/// Build the missing total row by summing counting stats across the
/// per-team rows and recomputing each percentage from the sums.
fn synthesize_total(rows: &[RawRecord], c: &mut Converter) -> PlayerSeasonStat {
    let converted: Vec<PlayerSeasonStat> = rows.iter().map(|r| convert_row(r, c)).collect();
    let first = &converted[0];

    let sum = |f: fn(&PlayerSeasonStat) -> i32| converted.iter().map(f).sum::<i32>();

    let fg = sum(|s| s.fg);
    let fga = sum(|s| s.fga);
    let fg3 = sum(|s| s.fg3);
    let fg3a = sum(|s| s.fg3a);
    let fg2 = sum(|s| s.fg2);
    let fg2a = sum(|s| s.fg2a);
    let ft = sum(|s| s.ft);
    let fta = sum(|s| s.fta);

    PlayerSeasonStat {
        player: first.player.clone(),
        season: first.season,
        team: "TOT".to_string(),
        pos: first.pos.clone(),
        age: converted.iter().filter_map(|s| s.age).max(),
        g: sum(|s| s.g),
        gs: sum(|s| s.gs),
        mp: sum(|s| s.mp),
        fg,
        fga,
        fg3,
        fg3a,
        fg2,
        fg2a,
        ft,
        fta,
        orb: sum(|s| s.orb),
        drb: sum(|s| s.drb),
        trb: sum(|s| s.trb),
        ast: sum(|s| s.ast),
        stl: sum(|s| s.stl),
        blk: sum(|s| s.blk),
        tov: sum(|s| s.tov),
        pf: sum(|s| s.pf),
        pts: sum(|s| s.pts),
        fg_pct: ratio(fg, fga),
        fg3_pct: ratio(fg3, fg3a),
        fg2_pct: ratio(fg2, fg2a),
        efg_pct: effective_fg(fg, fg3, fga),
        ft_pct: ratio(ft, fta),
        ts_pct: None,
        pts_per_game: None,
        trb_per_game: None,
        ast_per_game: None,
        mp_per_game: None,
    }
}

fn ratio(made: i32, attempted: i32) -> Option<f64> {
    if attempted <= 0 {
        None
    } else {
        Some(round(f64::from(made) / f64::from(attempted), 3))
    }
}

fn effective_fg(fg: i32, fg3: i32, fga: i32) -> Option<f64> {
    if fga <= 0 {
        None
    } else {
        Some(round(
            (f64::from(fg) + 0.5 * f64::from(fg3)) / f64::from(fga),
            3,
        ))
    }
}

/// Per-game rates and true shooting. Rates are defined only when games
/// played is non-zero; null otherwise, so a zero-game line never implies a
/// real rate of zero.
fn with_derived(mut stat: PlayerSeasonStat) -> PlayerSeasonStat {
    let games = stat.g;
    let per_game = move |total: i32| -> Option<f64> {
        if games <= 0 {
            None
        } else {
            Some(round(f64::from(total) / f64::from(games), 2))
        }
    };
    stat.pts_per_game = per_game(stat.pts);
    stat.trb_per_game = per_game(stat.trb);
    stat.ast_per_game = per_game(stat.ast);
    stat.mp_per_game = if stat.g <= 0 {
        None
    } else {
        Some(round(f64::from(stat.mp) / f64::from(stat.g), 1))
    };

    // TS% = PTS / (2 * (FGA + 0.44 * FTA)), undefined with no attempts
    let denom = 2.0 * (f64::from(stat.fga) + 0.44 * f64::from(stat.fta));
    stat.ts_pct = if denom <= 0.0 {
        None
    } else {
        Some(round(f64::from(stat.pts) / denom, 3))
    };

    stat
}

fn round(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
