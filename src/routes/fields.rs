//! Field catalog listing and admin sync actions

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Result;
use crate::models::{CatalogMeta, FieldDefinition, FieldKind};
use crate::services::sync::CatalogStatus;
use crate::state::AppState;

/// Query parameters for the fields listing
#[derive(Debug, Deserialize)]
pub struct FieldsQuery {
    /// Optional filter: "dimension" or "metric"
    pub kind: Option<FieldKind>,
}

/// Response for the fields listing
#[derive(Debug, Serialize)]
pub struct FieldsResponse {
    pub count: usize,
    pub meta: CatalogMeta,
    pub fields: Vec<FieldDefinition>,
}

/// GET /api/v1/fields
///
/// Returns the locally stored field catalog plus sync bookkeeping
/// (version tag and last import time).
pub async fn list_fields(
    State(state): State<AppState>,
    Query(params): Query<FieldsQuery>,
) -> Result<Json<FieldsResponse>> {
    let mut fields = state.db.fields().await?;
    if let Some(kind) = params.kind {
        fields.retain(|field| field.kind == kind);
    }
    let meta = state.db.catalog_meta().await?;

    Ok(Json(FieldsResponse {
        count: fields.len(),
        meta,
        fields,
    }))
}

/// Response for the check-updates admin action
#[derive(Debug, Serialize)]
pub struct CheckUpdatesResponse {
    pub status: &'static str,
    pub message: String,
}

/// POST /api/v1/fields/check-updates
///
/// Read-only version probe. A remote failure reports "unknown" rather
/// than stale; only an import mutates the catalog.
pub async fn check_updates(State(state): State<AppState>) -> Json<CheckUpdatesResponse> {
    let (status, message) = match state.synchronizer.check_for_updates().await {
        Ok(CatalogStatus::UpToDate) => (
            "up_to_date",
            "All Google Analytics fields are up to date.".to_string(),
        ),
        Ok(CatalogStatus::Stale) => (
            "stale",
            "New Google Analytics fields have been found. Run the import to update the local catalog."
                .to_string(),
        ),
        Err(e) => {
            error!(error = %e, "Check for updates failed");
            ("unknown", format!("Could not check for updates: {e}"))
        }
    };

    Json(CheckUpdatesResponse { status, message })
}

/// Response for the import admin action
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub status: &'static str,
    pub imported: usize,
    pub message: String,
}

/// POST /api/v1/fields/import
///
/// Replaces the local catalog from the remote metadata endpoint and
/// reports the final imported count.
pub async fn import_fields(State(state): State<AppState>) -> Json<ImportResponse> {
    match state.synchronizer.import_fields().await {
        Ok(summary) => {
            state.metrics.add_fields_imported(summary.imported as u64);
            Json(ImportResponse {
                status: "ok",
                imported: summary.imported,
                message: format!("Imported {} Google Analytics fields.", summary.imported),
            })
        }
        Err(e) => {
            error!(error = %e, "Field import failed");
            Json(ImportResponse {
                status: "error",
                imported: 0,
                message: format!(
                    "An error occurred during the import of Google Analytics fields: {e}"
                ),
            })
        }
    }
}
