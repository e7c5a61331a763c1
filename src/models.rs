//! Core domain models and Google Analytics wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service namespace prefix on Google Analytics column ids.
pub const GA_PREFIX: &str = "ga:";

/// Settings key for the last-seen catalog version tag.
pub const META_ETAG: &str = "metadata_etag";

/// Settings key for the wall-clock time of the last successful import.
pub const META_LAST_TIME: &str = "metadata_last_time";

/// Whether a catalog column is a dimension or a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Categorical attribute, e.g. page path
    Dimension,
    /// Numeric measure, e.g. session count
    Metric,
}

impl FieldKind {
    /// Classify a metadata `type` attribute. Anything that is not a
    /// dimension counts as a metric.
    pub fn from_type(s: &str) -> Self {
        if s.eq_ignore_ascii_case("dimension") {
            FieldKind::Dimension
        } else {
            FieldKind::Metric
        }
    }
}

/// One row of the local field catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Column id with the `ga:` prefix stripped, e.g. "sessions"
    pub id: String,
    /// Dimension or metric
    pub kind: FieldKind,
    /// Lower-cased data type, e.g. "integer"
    pub data_type: String,
    /// Display grouping from the remote catalog
    pub group: String,
    /// Display name
    pub ui_name: String,
    /// May be empty
    #[serde(default)]
    pub description: String,
    /// Formula for calculated metrics
    pub calculation: Option<String>,
}

/// Catalog sync bookkeeping shown alongside the fields listing
#[derive(Debug, Clone, Serialize)]
pub struct CatalogMeta {
    /// Last-seen remote version tag
    pub etag: Option<String>,
    /// When the catalog was last successfully imported
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Full column metadata payload from the metadata endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnsPayload {
    pub etag: Option<String>,
    #[serde(default)]
    pub items: Vec<Column>,
}

/// One column entry of the metadata payload
#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    /// Namespaced id, e.g. "ga:sessions"
    pub id: String,
    pub attributes: ColumnAttributes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAttributes {
    #[serde(rename = "type")]
    pub kind: String,
    pub data_type: String,
    /// "PUBLIC" for importable columns; deprecated/beta entries carry
    /// other values and are excluded from the catalog
    pub status: String,
    pub group: String,
    pub ui_name: String,
    pub description: Option<String>,
    pub calculation: Option<String>,
}

/// `?fields=etag` variant of the metadata payload
#[derive(Debug, Clone, Deserialize)]
pub struct EtagPayload {
    pub etag: Option<String>,
}

/// Parameter bag for the reporting endpoint, produced by
/// [`crate::query::ReportQuery::build`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportRequest {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub filters: Option<String>,
    pub sort_metric: Vec<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub profile_id: Option<i64>,
    pub max_results: Option<i64>,
    pub start_index: Option<i64>,
}

impl ReportRequest {
    /// Flatten into query parameters for the reporting endpoint.
    /// List members are comma-joined; empty members are omitted.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.dimensions.is_empty() {
            pairs.push(("dimensions", self.dimensions.join(",")));
        }
        if !self.metrics.is_empty() {
            pairs.push(("metrics", self.metrics.join(",")));
        }
        if let Some(filters) = &self.filters {
            pairs.push(("filters", filters.clone()));
        }
        if !self.sort_metric.is_empty() {
            pairs.push(("sort_metric", self.sort_metric.join(",")));
        }
        if let Some(start_date) = self.start_date {
            pairs.push(("start_date", start_date.to_string()));
        }
        if let Some(end_date) = self.end_date {
            pairs.push(("end_date", end_date.to_string()));
        }
        if let Some(profile_id) = self.profile_id {
            pairs.push(("profile_id", profile_id.to_string()));
        }
        if let Some(max_results) = self.max_results {
            pairs.push(("max_results", max_results.to_string()));
        }
        if let Some(start_index) = self.start_index {
            pairs.push(("start_index", start_index.to_string()));
        }
        pairs
    }
}

/// Response envelope from the reporting endpoint. A successful fetch
/// carries `results`; an API-level failure carries `response` with the
/// remote error message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFeed {
    pub results: Option<FeedResults>,
    pub response: Option<FeedErrorEnvelope>,
}

impl ReportFeed {
    /// The remote's error message, when the feed carries one.
    pub fn error_message(&self) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|envelope| envelope.data.as_ref())
            .and_then(|data| data.error.as_ref())
            .map(|error| error.message.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedResults {
    /// Report rows keyed by stripped field id
    #[serde(default)]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// The query as the remote understood it, echoed back for diagnostics
    pub query: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedErrorEnvelope {
    pub data: Option<FeedErrorData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedErrorData {
    pub error: Option<FeedError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedError {
    pub message: String,
}

/// Outcome of one report execution
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportResult {
    /// Rows keyed by the aliases registered on the query
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Total row count from the separate count fetch
    pub total_rows: usize,
    /// The remote's echoed query object, for UI display
    pub query_echo: String,
    /// Elapsed wall-clock of the combined count+data fetch
    pub execute_time_ms: u64,
    /// User-facing error or authorization message; the row set is always
    /// empty when this is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
