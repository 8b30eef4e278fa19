use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use nba_pipeline::config::Config;
use nba_pipeline::pipeline::Pipeline;
use nba_pipeline::renderer::PageRenderer;
use nba_pipeline::types::RunStatus;

/// Renderer that serves canned HTML, or fails every call when `html` is
/// `None`, counting render attempts either way.
struct StubRenderer {
    html: Option<String>,
    calls: AtomicU32,
}

impl StubRenderer {
    fn serving(html: &str) -> Arc<Self> {
        Arc::new(Self {
            html: Some(html.to_string()),
            calls: AtomicU32::new(0),
        })
    }

    fn timing_out() -> Arc<Self> {
        Arc::new(Self {
            html: None,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl PageRenderer for StubRenderer {
    async fn render(
        &self,
        _url: &str,
        _selector: &str,
        _timeout: Duration,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.html {
            Some(html) => Ok(html.clone()),
            None => Err(anyhow::anyhow!("page did not render within 10000ms")),
        }
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.scraper.request_delay_ms = 0;
    config.scraper.retry_backoff_ms = 0;
    config.storage.data_dir = data_dir.to_path_buf();
    config
}

fn stats_page(rows: &str) -> String {
    format!(
        r#"<html><body><table id="totals_stats">
          <thead><tr><th data-stat="player">Player</th></tr></thead>
          <tbody>{rows}</tbody>
        </table></body></html>"#
    )
}

fn row(player: &str, team: &str, cells: &[(&str, &str)]) -> String {
    let mut html = format!(
        r#"<tr><th data-stat="player"><a href="/p">{player}</a></th>
           <td data-stat="team_name_abbr">{team}</td>"#
    );
    for (stat, value) in cells {
        html.push_str(&format!(r#"<td data-stat="{stat}">{value}</td>"#));
    }
    html.push_str("</tr>");
    html
}

#[tokio::test]
async fn clean_run_loads_both_sinks_and_reports_success() {
    let dir = tempfile::tempdir().unwrap();
    let html = stats_page(&format!(
        "{}{}{}",
        row("Traded Star", "AAA", &[("g", "20"), ("pts", "400"), ("trb", "100")]),
        row("Traded Star", "TOT", &[("g", "60"), ("pts", "1200"), ("trb", "300")]),
        row("Steady Wing", "BBB", &[("g", "70"), ("pts", "980"), ("trb", "350")]),
    ));
    let pipeline = Pipeline::new(StubRenderer::serving(&html), &test_config(dir.path()));

    let run = pipeline.run(2025).await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.records_in, 3);
    assert_eq!(run.records_out, 2);
    assert_eq!(run.transform.rows_merged, 1);
    assert!(run.findings.is_empty());
    assert!(run.load_errors.is_empty());
    assert_eq!(run.phase_durations.len(), 5);

    // Traded player kept only as the TOT row, in both sinks
    let rows = pipeline
        .loader()
        .query("SELECT team, pts, pts_per_game FROM player_totals WHERE player = 'Traded Star'")
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], vec!["TOT", "1200", "20"]);

    let csv = std::fs::read_to_string(run.csv_path.unwrap()).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("Steady Wing"));
}

#[tokio::test]
async fn three_fetch_timeouts_fail_the_run_without_loading() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = StubRenderer::timing_out();
    let pipeline = Pipeline::new(renderer.clone(), &test_config(dir.path()));

    let run = pipeline.run(2025).await;

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().contains("after 3 attempts"));
    assert_eq!(run.records_out, 0);

    // Load phase never ran: no database, no export
    assert!(run.csv_path.is_none());
    assert!(!dir.path().join("nba_stats.db").exists());
    assert_eq!(run.phase_durations.len(), 1);
}

#[tokio::test]
async fn unrecognizable_page_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        StubRenderer::serving("<html><body><p>maintenance</p></body></html>"),
        &test_config(dir.path()),
    );

    let run = pipeline.run(2025).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().contains("parse failed"));
    assert!(!dir.path().join("nba_stats.db").exists());
}

#[tokio::test]
async fn empty_table_is_a_successful_zero_record_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(StubRenderer::serving(&stats_page("")), &test_config(dir.path()));

    let run = pipeline.run(2025).await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.records_in, 0);
    assert_eq!(run.records_out, 0);

    // Both sinks still written: empty table, header-only CSV
    let rows = pipeline
        .loader()
        .query("SELECT COUNT(*) FROM player_totals")
        .unwrap();
    assert_eq!(rows[1][0], "0");
    let csv = std::fs::read_to_string(run.csv_path.unwrap()).unwrap();
    assert_eq!(csv.lines().count(), 1);
}

#[tokio::test]
async fn negative_rebound_is_flagged_but_loaded_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let html = stats_page(&row(
        "Glitch Forward",
        "DDD",
        &[("g", "50"), ("pts", "600"), ("trb", "-3")],
    ));
    let pipeline = Pipeline::new(StubRenderer::serving(&html), &test_config(dir.path()));

    let run = pipeline.run(2025).await;

    assert_eq!(run.status, RunStatus::PartialSuccess);
    assert!(run
        .findings
        .iter()
        .any(|f| f.rule == "non_negative" && f.message.contains("trb = -3")));

    // The corrupt value is surfaced, not rewritten: both sinks carry -3
    let rows = pipeline
        .loader()
        .query("SELECT trb FROM player_totals WHERE player = 'Glitch Forward'")
        .unwrap();
    assert_eq!(rows[1][0], "-3");
    let csv = std::fs::read_to_string(run.csv_path.unwrap()).unwrap();
    assert!(csv.contains("-3"));
}

#[tokio::test]
async fn both_sinks_failing_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    // Data dir path occupied by a regular file: neither sink can write
    let blocked = dir.path().join("data");
    std::fs::write(&blocked, b"not a dir").unwrap();

    let html = stats_page(&row("Steady Wing", "BBB", &[("g", "70"), ("pts", "980")]));
    let pipeline = Pipeline::new(StubRenderer::serving(&html), &test_config(&blocked));

    let run = pipeline.run(2025).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("all load sinks failed"));
    assert_eq!(run.load_errors.len(), 2);
    assert!(run.csv_path.is_none());
}

#[tokio::test]
async fn suspicious_values_degrade_status_but_stay_in_both_sinks() {
    let dir = tempfile::tempdir().unwrap();
    // 70 games, 4900 points: above the season scoring sanity ceiling
    let html = stats_page(&row(
        "Glitch Man",
        "CCC",
        &[("g", "70"), ("pts", "4900"), ("age", "27")],
    ));
    let pipeline = Pipeline::new(StubRenderer::serving(&html), &test_config(dir.path()));

    let run = pipeline.run(2025).await;

    assert_eq!(run.status, RunStatus::PartialSuccess);
    assert!(run
        .findings
        .iter()
        .any(|f| f.rule == "season_points_ceiling"));

    // Advisory only: the record was loaded anyway
    let rows = pipeline
        .loader()
        .query("SELECT pts FROM player_totals WHERE player = 'Glitch Man'")
        .unwrap();
    assert_eq!(rows[1][0], "4900");
    let csv = std::fs::read_to_string(run.csv_path.unwrap()).unwrap();
    assert!(csv.contains("Glitch Man"));
}
