//! Prometheus metrics endpoint

use axum::response::IntoResponse;
use std::sync::atomic::{AtomicU64, Ordering};

/// Application metrics for Prometheus
#[derive(Default)]
pub struct Metrics {
    /// Total reports executed
    pub reports_run_total: AtomicU64,
    /// Total reports that came back with an error message
    pub report_errors_total: AtomicU64,
    /// Total catalog fields imported across all syncs
    pub fields_imported_total: AtomicU64,
    /// Current number of fields in the catalog
    catalog_size: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_reports(&self) {
        self.reports_run_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_report_errors(&self) {
        self.report_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_fields_imported(&self, count: u64) {
        self.fields_imported_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_catalog_size(&self, size: u64) {
        self.catalog_size.store(size, Ordering::Relaxed);
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reports_run_total: self.reports_run_total.load(Ordering::Relaxed),
            report_errors_total: self.report_errors_total.load(Ordering::Relaxed),
            fields_imported_total: self.fields_imported_total.load(Ordering::Relaxed),
            catalog_size: self.catalog_size.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct MetricsSnapshot {
    pub reports_run_total: u64,
    pub report_errors_total: u64,
    pub fields_imported_total: u64,
    pub catalog_size: u64,
}

/// GET /metrics
///
/// Returns Prometheus-format metrics
pub async fn prometheus_metrics(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> impl IntoResponse {
    let catalog_size = state.db.catalog_size().await.unwrap_or(0) as u64;
    state.metrics.set_catalog_size(catalog_size);

    let snapshot = state.metrics.get_metrics();

    let output = format!(
        r#"# HELP ga_reports_reports_run_total Total number of reports executed
# TYPE ga_reports_reports_run_total counter
ga_reports_reports_run_total {}

# HELP ga_reports_report_errors_total Total number of reports that returned an error message
# TYPE ga_reports_report_errors_total counter
ga_reports_report_errors_total {}

# HELP ga_reports_fields_imported_total Total number of catalog fields imported
# TYPE ga_reports_fields_imported_total counter
ga_reports_fields_imported_total {}

# HELP ga_reports_catalog_size Current number of fields in the local catalog
# TYPE ga_reports_catalog_size gauge
ga_reports_catalog_size {}

# HELP ga_reports_info Build information
# TYPE ga_reports_info gauge
ga_reports_info{{version="{}"}} 1
"#,
        snapshot.reports_run_total,
        snapshot.report_errors_total,
        snapshot.fields_imported_total,
        catalog_size,
        env!("CARGO_PKG_VERSION"),
    );

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}
