//! Validate phase: advisory sanity rules over the transformed table.
//!
//! Findings never remove or mutate records and never halt the run; they are
//! attached to the run summary for human review. A broken pipeline is a
//! fatal fetch/parse/transform error; a suspicious value is a finding.

use tracing::info;

use crate::types::{PlayerSeasonStat, Severity, ValidationFinding};

/// Tunable bounds for the rule battery.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub min_age: u32,
    pub max_age: u32,
    /// Longest plausible season including play-in games.
    pub max_games: i32,
    /// Single-season points ceiling; catches scraping corruption, not real
    /// outliers (the record season total is 4029).
    pub max_season_points: i32,
    pub max_points_per_game: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_age: 16,
            max_age: 50,
            max_games: 85,
            max_season_points: 4500,
            max_points_per_game: 50.0,
        }
    }
}

pub struct Validator {
    config: ValidatorConfig,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Run every rule over every record. The input is returned to the
    /// caller untouched; only the findings list is produced here.
    pub fn validate(&self, stats: &[PlayerSeasonStat]) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        for stat in stats {
            self.check_non_negative(stat, &mut findings);
            self.check_percent_ranges(stat, &mut findings);
            self.check_age(stat, &mut findings);
            self.check_games(stat, &mut findings);
            self.check_scoring(stat, &mut findings);
            self.check_shot_consistency(stat, &mut findings);
        }
        info!(records = stats.len(), findings = findings.len(), "validation complete");
        findings
    }

    fn finding(
        &self,
        stat: &PlayerSeasonStat,
        rule: &'static str,
        severity: Severity,
        message: String,
    ) -> ValidationFinding {
        ValidationFinding {
            rule,
            severity,
            player: stat.player.clone(),
            team: stat.team.clone(),
            message,
        }
    }

    fn check_non_negative(&self, stat: &PlayerSeasonStat, out: &mut Vec<ValidationFinding>) {
        for (name, value) in stat.counting_stats() {
            if value < 0 {
                out.push(self.finding(
                    stat,
                    "non_negative",
                    Severity::Error,
                    format!("{name} = {value} is negative"),
                ));
            }
        }
    }

    fn check_percent_ranges(&self, stat: &PlayerSeasonStat, out: &mut Vec<ValidationFinding>) {
        for (name, value) in stat.percentages() {
            if !(0.0..=1.0).contains(&value) {
                out.push(self.finding(
                    stat,
                    "pct_range",
                    Severity::Warning,
                    format!("{name} = {value} outside [0, 1]"),
                ));
            }
        }
    }

    fn check_age(&self, stat: &PlayerSeasonStat, out: &mut Vec<ValidationFinding>) {
        if let Some(age) = stat.age {
            if age < self.config.min_age || age > self.config.max_age {
                out.push(self.finding(
                    stat,
                    "age_range",
                    Severity::Warning,
                    format!(
                        "age {age} outside plausible range {}..={}",
                        self.config.min_age, self.config.max_age
                    ),
                ));
            }
        }
    }

    fn check_games(&self, stat: &PlayerSeasonStat, out: &mut Vec<ValidationFinding>) {
        if stat.g > self.config.max_games {
            out.push(self.finding(
                stat,
                "games_range",
                Severity::Warning,
                format!("{} games exceeds {}", stat.g, self.config.max_games),
            ));
        }
    }

    fn check_scoring(&self, stat: &PlayerSeasonStat, out: &mut Vec<ValidationFinding>) {
        if stat.pts > self.config.max_season_points {
            out.push(self.finding(
                stat,
                "season_points_ceiling",
                Severity::Error,
                format!(
                    "{} season points exceeds sanity ceiling {}",
                    stat.pts, self.config.max_season_points
                ),
            ));
        }
        if let Some(ppg) = stat.pts_per_game {
            if ppg > self.config.max_points_per_game {
                out.push(self.finding(
                    stat,
                    "ppg_ceiling",
                    Severity::Warning,
                    format!("{ppg} points per game looks like a data issue"),
                ));
            }
        }
    }

    fn check_shot_consistency(&self, stat: &PlayerSeasonStat, out: &mut Vec<ValidationFinding>) {
        let pairs = [
            ("fg", stat.fg, stat.fga),
            ("fg3", stat.fg3, stat.fg3a),
            ("ft", stat.ft, stat.fta),
        ];
        for (name, made, attempted) in pairs {
            if made > attempted {
                out.push(self.finding(
                    stat,
                    "shots_consistency",
                    Severity::Error,
                    format!("{name}: {made} made exceeds {attempted} attempted"),
                ));
            }
        }
    }
}
