//! Google Analytics remote feed client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{ColumnsPayload, EtagPayload, ReportFeed, ReportRequest};

/// Column metadata endpoint.
pub const DEFAULT_METADATA_URL: &str =
    "https://www.googleapis.com/analytics/v3/metadata/ga/columns";

/// Core Reporting endpoint.
pub const DEFAULT_REPORTS_URL: &str = "https://www.googleapis.com/analytics/v3/data/ga";

/// Remote calls must not stall the triggering unit of work.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Remote analytics service surface. Implemented by the real client and by
/// the scripted feed used in tests and offline development.
#[async_trait]
pub trait AnalyticsFeed: Send + Sync {
    /// Whether an access credential is configured at all.
    fn has_credential(&self) -> bool;

    /// Lightweight catalog version probe (`?fields=etag`).
    async fn fetch_etag(&self) -> Result<Option<String>>;

    /// The full column metadata set.
    async fn fetch_columns(&self) -> Result<ColumnsPayload>;

    /// Run one reporting query.
    async fn fetch_report(&self, request: &ReportRequest) -> Result<ReportFeed>;
}

/// HTTP client for the Google Analytics metadata and reporting endpoints
pub struct GoogleAnalyticsClient {
    client: Client,
    metadata_url: String,
    reports_url: String,
    access_token: Option<String>,
}

impl GoogleAnalyticsClient {
    pub fn new(
        metadata_url: impl Into<String>,
        reports_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            metadata_url: metadata_url.into(),
            reports_url: reports_url.into(),
            access_token: access_token.filter(|token| !token.is_empty()),
        })
    }

    /// Issue a GET and classify the outcome: transport failures, non-success
    /// statuses and empty bodies each map to their own error kind.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::RemoteApi(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }
        if body.is_empty() {
            return Err(AppError::EmptyResponse);
        }

        debug!(bytes = body.len(), "Remote response received");
        serde_json::from_str(&body)
            .map_err(|e| AppError::RemoteApi(format!("malformed response body: {e}")))
    }
}

#[async_trait]
impl AnalyticsFeed for GoogleAnalyticsClient {
    fn has_credential(&self) -> bool {
        self.access_token.is_some()
    }

    async fn fetch_etag(&self) -> Result<Option<String>> {
        let url = format!("{}?fields=etag", self.metadata_url);
        let payload: EtagPayload = self.get_json(self.client.get(url)).await?;
        Ok(payload.etag)
    }

    async fn fetch_columns(&self) -> Result<ColumnsPayload> {
        self.get_json(self.client.get(&self.metadata_url)).await
    }

    async fn fetch_report(&self, request: &ReportRequest) -> Result<ReportFeed> {
        self.get_json(
            self.client
                .get(&self.reports_url)
                .query(&request.to_query_pairs()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_requires_non_empty_token() {
        let with_token =
            GoogleAnalyticsClient::new(DEFAULT_METADATA_URL, DEFAULT_REPORTS_URL, Some("t".into()))
                .unwrap();
        assert!(with_token.has_credential());

        let empty_token =
            GoogleAnalyticsClient::new(DEFAULT_METADATA_URL, DEFAULT_REPORTS_URL, Some("".into()))
                .unwrap();
        assert!(!empty_token.has_credential());

        let no_token =
            GoogleAnalyticsClient::new(DEFAULT_METADATA_URL, DEFAULT_REPORTS_URL, None).unwrap();
        assert!(!no_token.has_credential());
    }
}
