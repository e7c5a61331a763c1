//! Application state shared across handlers

use std::sync::Arc;

use crate::db::Database;
use crate::routes::metrics::Metrics;
use crate::services::ga::AnalyticsFeed;
use crate::services::report::ReportRunner;
use crate::services::sync::FieldSynchronizer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Catalog database
    pub db: Arc<Database>,
    /// Remote analytics feed
    pub feed: Arc<dyn AnalyticsFeed>,
    /// Catalog synchronizer driving the admin actions
    pub synchronizer: Arc<FieldSynchronizer>,
    /// Report runner
    pub runner: Arc<ReportRunner>,
    /// Application metrics for Prometheus
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Create new application state around a catalog database and a feed.
    pub fn new(db: Database, feed: Arc<dyn AnalyticsFeed>) -> Self {
        let synchronizer = Arc::new(FieldSynchronizer::new(feed.clone(), db.clone()));
        let runner = Arc::new(ReportRunner::new(feed.clone()));
        Self {
            db: Arc::new(db),
            feed,
            synchronizer,
            runner,
            metrics: Arc::new(Metrics::new()),
        }
    }
}
