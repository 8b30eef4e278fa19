//! Parse phase: turn rendered HTML into `RawRecord`s.
//!
//! The source table tags every cell with a `data-stat` attribute, so rows
//! are extracted by attribute rather than by column position. Parsing is
//! purely structural; no value validation happens here.

use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::types::RawRecord;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Extract one `RawRecord` per data row of the season-totals table.
///
/// Returns the ordered records plus the number of rows skipped for
/// structural reasons (repeated in-body header rows, rows with no player
/// name). Fails only when the table itself is unrecognizable.
pub fn parse_season_totals(html: &str, season: u16) -> Result<(Vec<RawRecord>, usize)> {
    let document = Html::parse_document(html);

    let table = document
        .select(&selector("table#totals_stats"))
        .next()
        .ok_or_else(|| PipelineError::ParseFailed("stats table not found on page".into()))?;

    if table.select(&selector("thead")).next().is_none() {
        return Err(PipelineError::ParseFailed(
            "stats table has no header row".into(),
        ));
    }

    let tbody = table
        .select(&selector("tbody"))
        .next()
        .ok_or_else(|| PipelineError::ParseFailed("stats table has no body".into()))?;

    let cell_selector = selector("th, td");
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in tbody.select(&selector("tr")) {
        // The source repeats the header mid-table every 20 rows or so
        if row.value().classes().any(|c| c == "thead") {
            skipped += 1;
            continue;
        }

        let mut record = RawRecord {
            season,
            cells: Default::default(),
        };
        for cell in row.select(&cell_selector) {
            let Some(stat) = cell.value().attr("data-stat") else {
                continue;
            };
            let value = cell.text().collect::<String>().trim().to_string();
            record.cells.insert(stat.to_string(), value);
        }

        match record.player() {
            Some(_) => records.push(record),
            None => {
                debug!("skipping row without player cell");
                skipped += 1;
            }
        }
    }

    info!(rows = records.len(), skipped, "parsed season totals table");
    Ok((records, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_html(body_rows: &str) -> String {
        format!(
            r#"<html><body><table id="totals_stats">
              <thead><tr><th data-stat="player">Player</th></tr></thead>
              <tbody>{body_rows}</tbody>
            </table></body></html>"#
        )
    }

    fn player_row(player: &str, team: &str, pts: &str, g: &str) -> String {
        format!(
            r#"<tr>
              <th data-stat="player"><a href="/x">{player}</a></th>
              <td data-stat="team_name_abbr">{team}</td>
              <td data-stat="g">{g}</td>
              <td data-stat="pts">{pts}</td>
            </tr>"#
        )
    }

    #[test]
    fn extracts_rows_keyed_by_data_stat() {
        let html = table_html(&player_row("Alice Guard", "SEA", "100", "10"));
        let (records, skipped) = parse_season_totals(&html, 2025).unwrap();

        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].player(), Some("Alice Guard"));
        assert_eq!(records[0].team(), Some("SEA"));
        assert_eq!(records[0].stat(&["pts"]), Some("100"));
        assert_eq!(records[0].season, 2025);
    }

    #[test]
    fn repeated_header_and_nameless_rows_are_skipped_not_fatal() {
        let rows = format!(
            r#"{}<tr class="thead"><th data-stat="player">Player</th></tr>
               <tr><td data-stat="team_name_abbr">SEA</td></tr>{}"#,
            player_row("Alice Guard", "SEA", "100", "10"),
            player_row("Bob Center", "PDX", "50", "5"),
        );
        let (records, skipped) = parse_season_totals(&table_html(&rows), 2025).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn zero_data_rows_is_a_valid_empty_result() {
        let (records, skipped) = parse_season_totals(&table_html(""), 2025).unwrap();
        assert!(records.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn missing_table_is_parse_failed() {
        let err = parse_season_totals("<html><body></body></html>", 2025).unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailed(_)));
    }

    #[test]
    fn missing_header_is_parse_failed() {
        let html = r#"<table id="totals_stats"><tbody></tbody></table>"#;
        let err = parse_season_totals(html, 2025).unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailed(_)));
    }
}
