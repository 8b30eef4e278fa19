//! Extract phase: drive the browser to the season-totals page and bring
//! back the rendered HTML.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ScraperConfig;
use crate::error::{PipelineError, Result};
use crate::renderer::PageRenderer;

/// CSS id of the season-totals table on the source page.
pub const STATS_TABLE_SELECTOR: &str = "table#totals_stats";

pub struct Fetcher {
    renderer: Arc<dyn PageRenderer>,
    config: ScraperConfig,
}

impl Fetcher {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: ScraperConfig) -> Self {
        Self { renderer, config }
    }

    fn season_url(&self, season: u16) -> String {
        format!(
            "{}/leagues/NBA_{}_totals.html",
            self.config.base_url.trim_end_matches('/'),
            season
        )
    }

    /// Fetch the rendered season-totals page for `season`.
    ///
    /// Each attempt is bounded by the page timeout; transient failures are
    /// retried with a fixed backoff up to `max_retries` total attempts.
    /// Exhausting retries is fatal. A page that renders with zero data rows
    /// is not an error here; the parser reports it as an empty result.
    pub async fn fetch_season_totals(&self, season: u16) -> Result<String> {
        let url = self.season_url(season);
        let timeout = Duration::from_millis(self.config.page_timeout_ms);
        let attempts = self.config.max_retries.max(1);
        let mut last_cause = String::new();

        for attempt in 1..=attempts {
            info!(%url, attempt, "fetching season totals");
            match self
                .renderer
                .render(&url, STATS_TABLE_SELECTOR, timeout)
                .await
            {
                Ok(html) => {
                    // Courtesy delay per the source site's access policy,
                    // honored even on a single successful fetch.
                    tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
                    info!(bytes = html.len(), "page rendered");
                    return Ok(html);
                }
                Err(e) => {
                    last_cause = e.to_string();
                    warn!(attempt, cause = %last_cause, "fetch attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms))
                            .await;
                    }
                }
            }
        }

        Err(PipelineError::FetchFailed {
            attempts,
            cause: last_cause,
        })
    }
}
