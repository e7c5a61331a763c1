//! Report runner: executes a translated query against the reporting feed

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, warn};

use crate::models::{FieldDefinition, ReportResult};
use crate::query::ReportQuery;
use crate::services::ga::AnalyticsFeed;

/// Count fetches always ask for the full result set on the first page.
const COUNT_MAX_RESULTS: i64 = 9999;

/// Data fetch page size when the query carries no explicit limit.
const DEFAULT_MAX_RESULTS: i64 = 1000;

/// Message shown when reports are requested before authorization.
const AUTHORIZE_MESSAGE: &str =
    "You must authorize your Google Analytics account before you can view reports.";

pub struct ReportRunner {
    feed: Arc<dyn AnalyticsFeed>,
}

impl ReportRunner {
    pub fn new(feed: Arc<dyn AnalyticsFeed>) -> Self {
        Self { feed }
    }

    /// Run the count and data fetches for a built query.
    ///
    /// Remote failures never escape this boundary: the result comes back
    /// empty with a user-facing message instead.
    pub async fn run(
        &self,
        query: &ReportQuery,
        catalog: &HashMap<String, FieldDefinition>,
    ) -> ReportResult {
        if !self.feed.has_credential() {
            warn!("Report skipped: no access credential configured");
            return ReportResult {
                message: Some(AUTHORIZE_MESSAGE.to_string()),
                ..Default::default()
            };
        }

        let start = Instant::now();

        // Total row count first; it drives pagination and gates the data
        // fetch entirely.
        let mut count_request = query.build(catalog);
        count_request.max_results = Some(COUNT_MAX_RESULTS);
        count_request.start_index = Some(1);

        let count_feed = match self.feed.fetch_report(&count_request).await {
            Ok(feed) => feed,
            Err(e) => {
                error!(error = %e, "Count fetch failed");
                return failed(e.to_string(), start);
            }
        };

        let total_rows = count_feed
            .results
            .as_ref()
            .map(|results| results.rows.len())
            .unwrap_or(0);

        if total_rows == 0 {
            // Surface the remote error payload when the count came back
            // empty; otherwise the report is legitimately empty.
            return ReportResult {
                message: count_feed.error_message().map(str::to_string),
                execute_time_ms: elapsed_ms(start),
                ..Default::default()
            };
        }

        let mut data_request = query.build(catalog);
        data_request.max_results = Some(query.limit().unwrap_or(DEFAULT_MAX_RESULTS));
        data_request.start_index = Some(query.offset().unwrap_or(0) + 1);

        let data_feed = match self.feed.fetch_report(&data_request).await {
            Ok(feed) => feed,
            Err(e) => {
                error!(error = %e, "Data fetch failed");
                return failed(e.to_string(), start);
            }
        };

        if let Some(message) = data_feed.error_message() {
            return failed(message.to_string(), start);
        }

        let results = data_feed.results.unwrap_or_default();
        let query_echo = results
            .query
            .as_ref()
            .and_then(|echo| serde_json::to_string_pretty(echo).ok())
            .unwrap_or_default();

        ReportResult {
            rows: query.map_rows(results.rows),
            total_rows,
            query_echo,
            execute_time_ms: elapsed_ms(start),
            message: None,
        }
    }
}

/// An empty result carrying the failure message; partial rows are never
/// kept.
fn failed(message: String, start: Instant) -> ReportResult {
    ReportResult {
        message: Some(message),
        execute_time_ms: elapsed_ms(start),
        ..Default::default()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
