//! Scripted analytics feed for tests and offline development

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ColumnsPayload, ReportFeed, ReportRequest};
use crate::services::ga::AnalyticsFeed;

/// Feed double that returns pre-programmed responses and records the
/// report requests it receives, in arrival order.
#[derive(Default)]
pub struct MockFeed {
    credential: bool,
    etag: Mutex<Option<Result<Option<String>>>>,
    columns: Mutex<Option<Result<ColumnsPayload>>>,
    reports: Mutex<Vec<Result<ReportFeed>>>,
    seen_requests: Mutex<Vec<ReportRequest>>,
}

impl MockFeed {
    /// A feed with a credential configured and no scripted responses.
    pub fn new() -> Self {
        Self {
            credential: true,
            ..Default::default()
        }
    }

    /// A feed behaving as if the account was never authorized.
    pub fn without_credential() -> Self {
        Self::default()
    }

    pub fn set_etag(&self, response: Result<Option<String>>) {
        *self.etag.lock() = Some(response);
    }

    pub fn set_columns(&self, response: Result<ColumnsPayload>) {
        *self.columns.lock() = Some(response);
    }

    /// Queue a report response; fetches consume the queue front-first.
    pub fn push_report(&self, response: Result<ReportFeed>) {
        self.reports.lock().push(response);
    }

    /// Report requests observed so far.
    pub fn seen_requests(&self) -> Vec<ReportRequest> {
        self.seen_requests.lock().clone()
    }
}

#[async_trait]
impl AnalyticsFeed for MockFeed {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn fetch_etag(&self) -> Result<Option<String>> {
        self.etag.lock().clone().unwrap_or(Ok(None))
    }

    async fn fetch_columns(&self) -> Result<ColumnsPayload> {
        self.columns
            .lock()
            .clone()
            .unwrap_or(Err(AppError::EmptyResponse))
    }

    async fn fetch_report(&self, request: &ReportRequest) -> Result<ReportFeed> {
        self.seen_requests.lock().push(request.clone());
        let mut queue = self.reports.lock();
        if queue.is_empty() {
            Ok(ReportFeed::default())
        } else {
            queue.remove(0)
        }
    }
}
