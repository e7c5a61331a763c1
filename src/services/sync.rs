//! Field catalog synchronizer: imports the Google Analytics column
//! metadata into the local catalog

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::models::{Column, FieldDefinition, FieldKind, GA_PREFIX, META_ETAG, META_LAST_TIME};
use crate::services::ga::AnalyticsFeed;

/// Outcome of a version-tag check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogStatus {
    UpToDate,
    Stale,
}

/// Result of a completed import, reported back to the admin surface
#[derive(Debug, Clone)]
pub struct ImportSummary {
    /// Rows actually swapped into the live catalog
    pub imported: usize,
    /// Version tag the import recorded
    pub etag: Option<String>,
}

/// Hook applied to each normalized field before it is persisted, so
/// embedders can rename or adjust catalog entries.
pub type AlterHook = dyn Fn(FieldDefinition) -> FieldDefinition + Send + Sync;

pub struct FieldSynchronizer {
    feed: Arc<dyn AnalyticsFeed>,
    db: Database,
    alter: Option<Box<AlterHook>>,
}

impl FieldSynchronizer {
    pub fn new(feed: Arc<dyn AnalyticsFeed>, db: Database) -> Self {
        Self {
            feed,
            db,
            alter: None,
        }
    }

    pub fn with_alter_hook(mut self, hook: Box<AlterHook>) -> Self {
        self.alter = Some(hook);
        self
    }

    /// Compare the remote version tag against the last stored one.
    /// Read-only; the catalog is never touched here.
    pub async fn check_for_updates(&self) -> Result<CatalogStatus> {
        let remote = self.feed.fetch_etag().await.map_err(|e| {
            error!(error = %e, "Failed to fetch catalog version tag");
            e
        })?;
        let stored = self.db.get_meta(META_ETAG).await?;

        if remote == stored {
            Ok(CatalogStatus::UpToDate)
        } else {
            Ok(CatalogStatus::Stale)
        }
    }

    /// Fetch the full column metadata set and replace the local catalog.
    ///
    /// Items are staged one by one, then swapped into the live table in a
    /// single transaction; a failure before the swap leaves the previous
    /// catalog fully intact.
    pub async fn import_fields(&self) -> Result<ImportSummary> {
        let payload = self.feed.fetch_columns().await.map_err(|e| {
            error!(error = %e, "Failed to fetch column metadata definitions");
            e
        })?;

        self.db.clear_staging().await?;

        for item in &payload.items {
            // Deprecated and beta columns never enter the catalog.
            if item.attributes.status != "PUBLIC" {
                continue;
            }
            let mut field = normalize_column(item);
            if let Some(alter) = &self.alter {
                field = alter(field);
            }
            if let Err(e) = self.db.insert_staged_field(&field).await {
                warn!(error = %e, field = %field.id, "Skipping field that failed to stage");
            }
        }

        let imported = self.db.commit_catalog_swap().await?;

        // Version tag and import time are recorded independent of how many
        // items actually made it in.
        if let Some(etag) = &payload.etag {
            self.db.set_meta(META_ETAG, etag).await?;
        }
        self.db
            .set_meta(META_LAST_TIME, &Utc::now().to_rfc3339())
            .await?;

        info!(imported = imported, "Catalog import finished");
        Ok(ImportSummary {
            imported,
            etag: payload.etag,
        })
    }
}

/// Normalize one remote column into a catalog row: strip the service
/// prefix, lower-case the type attributes, default the optional text.
fn normalize_column(item: &Column) -> FieldDefinition {
    let attributes = &item.attributes;
    FieldDefinition {
        id: item
            .id
            .strip_prefix(GA_PREFIX)
            .unwrap_or(&item.id)
            .to_string(),
        kind: FieldKind::from_type(&attributes.kind),
        data_type: attributes.data_type.to_lowercase(),
        group: attributes.group.clone(),
        ui_name: attributes.ui_name.clone(),
        description: attributes.description.clone().unwrap_or_default(),
        calculation: attributes.calculation.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{ColumnAttributes, ColumnsPayload};
    use crate::services::mock::MockFeed;

    fn column(id: &str, kind: &str, data_type: &str, status: &str) -> Column {
        Column {
            id: id.to_string(),
            attributes: ColumnAttributes {
                kind: kind.to_string(),
                data_type: data_type.to_string(),
                status: status.to_string(),
                group: "Session".to_string(),
                ui_name: id.trim_start_matches("ga:").to_string(),
                description: None,
                calculation: None,
            },
        }
    }

    fn payload(etag: &str, items: Vec<Column>) -> ColumnsPayload {
        ColumnsPayload {
            etag: Some(etag.to_string()),
            items,
        }
    }

    async fn synchronizer() -> (Arc<MockFeed>, Database, FieldSynchronizer) {
        let feed = Arc::new(MockFeed::new());
        let db = Database::in_memory().await.unwrap();
        let sync = FieldSynchronizer::new(feed.clone(), db.clone());
        (feed, db, sync)
    }

    #[tokio::test]
    async fn matching_etag_reports_up_to_date() {
        let (feed, db, sync) = synchronizer().await;
        db.set_meta(META_ETAG, "abc").await.unwrap();
        feed.set_etag(Ok(Some("abc".to_string())));

        let status = sync.check_for_updates().await.unwrap();
        assert_eq!(status, CatalogStatus::UpToDate);
        // Check never mutates
        assert_eq!(db.get_meta(META_ETAG).await.unwrap(), Some("abc".into()));
        assert_eq!(db.catalog_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn changed_etag_reports_stale_without_mutation() {
        let (feed, db, sync) = synchronizer().await;
        db.set_meta(META_ETAG, "abc").await.unwrap();
        feed.set_etag(Ok(Some("xyz".to_string())));

        let status = sync.check_for_updates().await.unwrap();
        assert_eq!(status, CatalogStatus::Stale);
        assert_eq!(db.get_meta(META_ETAG).await.unwrap(), Some("abc".into()));
    }

    #[tokio::test]
    async fn check_transport_failure_propagates() {
        let (feed, db, sync) = synchronizer().await;
        feed.set_etag(Err(AppError::Transport("timed out".into())));

        let result = sync.check_for_updates().await;
        assert!(matches!(result, Err(AppError::Transport(_))));
        assert_eq!(db.get_meta(META_ETAG).await.unwrap(), None);
    }

    #[tokio::test]
    async fn import_normalizes_and_filters_public_columns() {
        let (feed, db, sync) = synchronizer().await;
        feed.set_columns(Ok(payload(
            "tag-1",
            vec![
                column("ga:sessions", "METRIC", "INTEGER", "PUBLIC"),
                column("ga:date", "DIMENSION", "STRING", "PUBLIC"),
                column("ga:visitCount", "METRIC", "INTEGER", "DEPRECATED"),
            ],
        )));

        let summary = sync.import_fields().await.unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.etag.as_deref(), Some("tag-1"));

        let fields = db.field_map().await.unwrap();
        assert!(!fields.contains_key("visitCount"));

        let sessions = &fields["sessions"];
        assert_eq!(sessions.kind, FieldKind::Metric);
        assert_eq!(sessions.data_type, "integer");
        assert_eq!(sessions.description, "");
        assert_eq!(sessions.calculation, None);
        assert_eq!(fields["date"].kind, FieldKind::Dimension);

        assert_eq!(db.get_meta(META_ETAG).await.unwrap(), Some("tag-1".into()));
        assert!(db.get_meta(META_LAST_TIME).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reimport_replaces_without_residue() {
        let (feed, db, sync) = synchronizer().await;
        feed.set_columns(Ok(payload(
            "tag-1",
            vec![
                column("ga:sessions", "METRIC", "INTEGER", "PUBLIC"),
                column("ga:bounces", "METRIC", "INTEGER", "PUBLIC"),
            ],
        )));
        sync.import_fields().await.unwrap();
        let first = db.fields().await.unwrap();

        // Same payload again: identical catalog, no duplicates.
        feed.set_columns(Ok(payload(
            "tag-1",
            vec![
                column("ga:sessions", "METRIC", "INTEGER", "PUBLIC"),
                column("ga:bounces", "METRIC", "INTEGER", "PUBLIC"),
            ],
        )));
        sync.import_fields().await.unwrap();
        assert_eq!(db.fields().await.unwrap(), first);

        // A shrunk payload drops the removed column.
        feed.set_columns(Ok(payload(
            "tag-2",
            vec![column("ga:sessions", "METRIC", "INTEGER", "PUBLIC")],
        )));
        let summary = sync.import_fields().await.unwrap();
        assert_eq!(summary.imported, 1);
        let fields = db.field_map().await.unwrap();
        assert!(fields.contains_key("sessions"));
        assert!(!fields.contains_key("bounces"));
        assert_eq!(db.get_meta(META_ETAG).await.unwrap(), Some("tag-2".into()));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_state_untouched() {
        let (feed, db, sync) = synchronizer().await;
        feed.set_columns(Ok(payload(
            "tag-1",
            vec![column("ga:sessions", "METRIC", "INTEGER", "PUBLIC")],
        )));
        sync.import_fields().await.unwrap();

        feed.set_columns(Err(AppError::EmptyResponse));
        let result = sync.import_fields().await;
        assert!(matches!(result, Err(AppError::EmptyResponse)));

        // Previous catalog and metadata survive the aborted import.
        assert_eq!(db.catalog_size().await.unwrap(), 1);
        assert_eq!(db.get_meta(META_ETAG).await.unwrap(), Some("tag-1".into()));
    }

    #[tokio::test]
    async fn alter_hook_runs_before_persisting() {
        let feed = Arc::new(MockFeed::new());
        let db = Database::in_memory().await.unwrap();
        let sync = FieldSynchronizer::new(feed.clone(), db.clone()).with_alter_hook(Box::new(
            |mut field| {
                field.ui_name = format!("GA {}", field.ui_name);
                field
            },
        ));

        feed.set_columns(Ok(payload(
            "tag-1",
            vec![column("ga:sessions", "METRIC", "INTEGER", "PUBLIC")],
        )));
        sync.import_fields().await.unwrap();

        let fields = db.field_map().await.unwrap();
        assert_eq!(fields["sessions"].ui_name, "GA sessions");
    }

    #[tokio::test]
    async fn empty_item_list_empties_catalog_but_records_meta() {
        let (feed, db, sync) = synchronizer().await;
        feed.set_columns(Ok(payload(
            "tag-1",
            vec![column("ga:sessions", "METRIC", "INTEGER", "PUBLIC")],
        )));
        sync.import_fields().await.unwrap();

        feed.set_columns(Ok(payload("tag-2", vec![])));
        let summary = sync.import_fields().await.unwrap();
        assert_eq!(summary.imported, 0);
        assert_eq!(db.catalog_size().await.unwrap(), 0);
        assert_eq!(db.get_meta(META_ETAG).await.unwrap(), Some("tag-2".into()));
    }
}
