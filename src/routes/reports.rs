//! Report execution endpoint

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::ReportResult;
use crate::query::{Combinator, ReportQuery};
use crate::state::AppState;

/// One field selection in a report description
#[derive(Debug, Deserialize)]
pub struct FieldSpec {
    pub field: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// One condition inside a filter group
#[derive(Debug, Deserialize)]
pub struct ConditionSpec {
    pub field: String,
    pub operator: String,
    pub value: serde_json::Value,
}

/// A filter group; conditions combine with the group's combinator
#[derive(Debug, Deserialize)]
pub struct FilterGroupSpec {
    /// Group id; absent or 0 addresses the default group
    #[serde(default)]
    pub group: Option<u32>,
    #[serde(default = "default_combinator")]
    pub combinator: String,
    pub conditions: Vec<ConditionSpec>,
}

fn default_combinator() -> String {
    "AND".to_string()
}

#[derive(Debug, Deserialize)]
pub struct OrderBySpec {
    pub field: String,
    #[serde(default = "default_order")]
    pub order: String,
}

fn default_order() -> String {
    "ASC".to_string()
}

/// Request body for report execution
#[derive(Debug, Deserialize)]
pub struct ReportRequestBody {
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub filters: Vec<FilterGroupSpec>,
    /// How the filter groups combine with each other
    #[serde(default = "default_combinator")]
    pub group_combinator: String,
    #[serde(default)]
    pub order_by: Vec<OrderBySpec>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    /// Reporting profile override
    #[serde(default)]
    pub profile_id: Option<i64>,
}

/// POST /api/v1/reports/query
///
/// Translates the report description into a reporting API query, executes
/// it against the remote feed and returns the mapped rows. Remote failures
/// come back as an empty result with a message, not as an HTTP error.
pub async fn run_report(
    State(state): State<AppState>,
    Json(body): Json<ReportRequestBody>,
) -> Result<Json<ReportResult>> {
    if body.fields.is_empty() {
        return Err(AppError::InvalidRequest(
            "at least one field is required".to_string(),
        ));
    }

    let mut query = ReportQuery::new();

    for spec in &body.fields {
        query.add_field(
            spec.table.as_deref(),
            &spec.field,
            spec.alias.as_deref(),
            spec.params.clone(),
        );
    }

    for group in &body.filters {
        let group_id = group.group.unwrap_or(0);
        query.set_where_group(Combinator::parse(&group.combinator), group_id);
        for condition in &group.conditions {
            query.add_where(
                Some(group_id),
                &condition.field,
                scalar_to_string(&condition.value),
                condition.operator.clone(),
            );
        }
    }
    query.set_group_operator(Combinator::parse(&body.group_combinator));

    for order in &body.order_by {
        query.add_order_by(&order.field, &order.order);
    }

    query.set_range(body.offset, body.limit);

    if let Some(profile_id) = body.profile_id {
        query.set_profile_override(true);
        query.set_profile_id(profile_id);
    }

    let catalog = state.db.field_map().await?;
    let result = state.runner.run(&query, &catalog).await;

    state.metrics.inc_reports();
    if result.message.is_some() {
        state.metrics.inc_report_errors();
    }

    Ok(Json(result))
}

/// Render a JSON scalar the way it appears in a filter expression.
fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
