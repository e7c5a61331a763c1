//! In-memory query builder translating a generic report description into
//! Google Analytics Core Reporting API parameters

use std::collections::{BTreeMap, HashMap};

use crate::models::{FieldDefinition, FieldKind, ReportRequest, GA_PREFIX};

/// Condition fields that become top-level query parameters rather than
/// filter expressions: date range and account selection.
const RESERVED_FIELDS: [&str; 3] = ["start_date", "end_date", "profile_id"];

/// Longest alias kept before collision numbering kicks in.
const MAX_ALIAS_LEN: usize = 60;

/// How conditions within a group, or the groups themselves, combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    /// Filter-expression separator: `;` means AND, `,` means OR.
    fn glue(self) -> &'static str {
        match self {
            Combinator::And => ";",
            Combinator::Or => ",",
        }
    }

    /// Anything other than a case-insensitive "OR" is AND.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("or") {
            Combinator::Or
        } else {
            Combinator::And
        }
    }
}

/// A metric or dimension registered on the query
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub field: String,
    pub table: Option<String>,
    pub alias: String,
    pub params: BTreeMap<String, String>,
}

/// One condition of a where group
#[derive(Debug, Clone)]
struct Condition {
    field: String,
    value: String,
    operator: String,
}

#[derive(Debug, Clone)]
struct WhereGroup {
    combinator: Combinator,
    conditions: Vec<Condition>,
}

impl WhereGroup {
    fn new(combinator: Combinator) -> Self {
        Self {
            combinator,
            conditions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct OrderBy {
    field: String,
    direction: &'static str,
}

/// Builds one report query: fields, filter groups, sort clauses and
/// pagination, rendered against the local field catalog.
///
/// Built once per report execution; never shared across requests.
#[derive(Debug, Default)]
pub struct ReportQuery {
    base_table: Option<String>,
    base_field: Option<String>,
    /// Registered tables, kept for compatibility; there are no real joins
    /// against the reporting API.
    table_queue: Vec<String>,
    /// Registered fields in insertion order, keyed by their final alias
    fields: Vec<FieldInfo>,
    /// (table, field) pair -> alias, for row mapping
    field_aliases: HashMap<(String, String), String>,
    where_groups: BTreeMap<u32, WhereGroup>,
    group_operator: Combinator,
    order_by: Vec<OrderBy>,
    limit: Option<i64>,
    offset: Option<i64>,
    use_profile_override: bool,
    profile_id: Option<i64>,
}

impl ReportQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the report's base table/field pair. A field matching both
    /// gets the base field name as its alias: it identifies the report's
    /// "primary key" column.
    pub fn with_base(mut self, table: &str, field: &str) -> Self {
        self.base_table = Some(table.to_string());
        self.base_field = Some(field.to_string());
        self
    }

    /// Add a metric or dimension to the query. Returns the alias the field
    /// can be referred to as.
    pub fn add_field(
        &mut self,
        table: Option<&str>,
        field: &str,
        alias: Option<&str>,
        params: BTreeMap<String, String>,
    ) -> String {
        let mut alias = alias.unwrap_or("").to_string();

        // The base table/field pair gets a special alias.
        if alias.is_empty()
            && self.base_table.as_deref() == table
            && self.base_field.as_deref() == Some(field)
        {
            alias = field.to_string();
        }

        if let Some(table) = table {
            if !self.table_queue.iter().any(|queued| queued == table) {
                self.ensure_table(table);
            }
        }

        if alias.is_empty() {
            alias = match table {
                Some(table) => format!("{table}_{field}"),
                None => field.to_string(),
            };
        }

        // Cap the original alias so collision numbering stays in bounds.
        if alias.chars().count() > MAX_ALIAS_LEN {
            alias = alias.chars().take(MAX_ALIAS_LEN).collect();
        }

        let mut info = FieldInfo {
            field: field.to_string(),
            table: table.map(str::to_string),
            alias: alias.clone(),
            params,
        };

        // Differing parameters can change the meaning of an otherwise equal
        // alias; bump a numeric suffix until the alias is free or maps to an
        // identical definition.
        let base = alias.clone();
        let mut counter = 0;
        while let Some(existing) = self.fields.iter().find(|f| f.alias == alias) {
            if *existing == info {
                break;
            }
            counter += 1;
            alias = format!("{base}_{counter}");
            info.alias = alias.clone();
        }

        if !self.fields.iter().any(|f| f.alias == alias) {
            self.fields.push(info);
        }

        self.field_aliases.insert(
            (table.unwrap_or("").to_string(), field.to_string()),
            alias.clone(),
        );

        alias
    }

    /// Placeholder table registration; no joins exist in this domain.
    fn ensure_table(&mut self, table: &str) {
        self.table_queue.push(table.to_string());
    }

    /// Add a condition to a filter group. `None` and `Some(0)` both address
    /// the default group; a group referenced for the first time is created
    /// as AND.
    pub fn add_where(
        &mut self,
        group: Option<u32>,
        field: &str,
        value: impl Into<String>,
        operator: impl Into<String>,
    ) {
        let group = group.unwrap_or(0);
        self.where_groups
            .entry(group)
            .or_insert_with(|| WhereGroup::new(Combinator::And))
            .conditions
            .push(Condition {
                field: field.to_string(),
                value: value.into(),
                operator: operator.into(),
            });
    }

    /// Create a filter group with the given combinator, or re-type an
    /// existing one.
    pub fn set_where_group(&mut self, combinator: Combinator, group: u32) {
        self.where_groups
            .entry(group)
            .or_insert_with(|| WhereGroup::new(combinator))
            .combinator = combinator;
    }

    /// How the groups themselves combine into the final filter expression.
    pub fn set_group_operator(&mut self, combinator: Combinator) {
        self.group_operator = combinator;
    }

    /// Queue a sort clause. A case-insensitive "DESC" sorts descending;
    /// anything else sorts ascending.
    pub fn add_order_by(&mut self, field: &str, order: &str) {
        let direction = if order.eq_ignore_ascii_case("desc") {
            "-"
        } else {
            ""
        };
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
        });
    }

    pub fn set_range(&mut self, offset: Option<i64>, limit: Option<i64>) {
        self.offset = offset;
        self.limit = limit;
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Opt this query into a reporting profile other than the default.
    pub fn set_profile_override(&mut self, enabled: bool) {
        self.use_profile_override = enabled;
    }

    pub fn set_profile_id(&mut self, profile_id: i64) {
        self.profile_id = Some(profile_id);
    }

    /// Registered fields in insertion order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Alias a field name was registered under, if any. Tableless
    /// registrations win over table-qualified ones.
    pub fn alias_for(&self, field: &str) -> Option<&str> {
        if let Some(alias) = self.field_aliases.get(&(String::new(), field.to_string())) {
            return Some(alias.as_str());
        }
        self.fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.alias.as_str())
    }

    /// Render the registered fields, filters and sort clauses into the
    /// reporting API parameter bag. Pure; no I/O happens here.
    ///
    /// The catalog is informational, not authoritative: fields it does not
    /// recognize are silently excluded.
    pub fn build(&self, catalog: &HashMap<String, FieldDefinition>) -> ReportRequest {
        let mut request = ReportRequest::default();

        for field in &self.fields {
            let Some(definition) = catalog.get(&field.field) else {
                continue;
            };
            let prefixed = format!("{GA_PREFIX}{}", field.field);
            match definition.kind {
                FieldKind::Dimension => request.dimensions.push(prefixed),
                FieldKind::Metric => request.metrics.push(prefixed),
            }
        }

        let mut rendered_groups = Vec::new();
        for group in self.where_groups.values() {
            let mut rendered = Vec::new();
            for condition in &group.conditions {
                if RESERVED_FIELDS.contains(&condition.field.as_str()) {
                    let value = coerce_int(&condition.value);
                    match condition.field.as_str() {
                        "start_date" => request.start_date = Some(value),
                        "end_date" => request.end_date = Some(value),
                        _ => request.profile_id = Some(value),
                    }
                } else if catalog.contains_key(&condition.field) {
                    rendered.push(format!(
                        "{}{}{}",
                        condition.field, condition.operator, condition.value
                    ));
                }
            }
            if !rendered.is_empty() {
                rendered_groups.push(rendered.join(group.combinator.glue()));
            }
        }
        if !rendered_groups.is_empty() {
            request.filters = Some(rendered_groups.join(self.group_operator.glue()));
        }

        for order in &self.order_by {
            request
                .sort_metric
                .push(format!("{}{GA_PREFIX}{}", order.direction, order.field));
        }

        if self.use_profile_override {
            if let Some(profile_id) = self.profile_id {
                request.profile_id = Some(profile_id);
            }
        }

        request
    }

    /// Convert remote rows (keyed by stripped field id) into report records
    /// keyed by the aliases registered on this query. Keys the query never
    /// registered pass through unchanged.
    pub fn map_rows(
        &self,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
    ) -> Vec<serde_json::Map<String, serde_json::Value>> {
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(key, value)| {
                        let stripped = key.strip_prefix(GA_PREFIX).unwrap_or(&key);
                        match self.alias_for(stripped) {
                            Some(alias) => (alias.to_string(), value),
                            None => (stripped.to_string(), value),
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// PHP-intval-style coercion: optional sign and leading digits, else 0.
fn coerce_int(value: &str) -> i64 {
    let s = value.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    s[..end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str, kind: FieldKind) -> FieldDefinition {
        FieldDefinition {
            id: id.to_string(),
            kind,
            data_type: "string".to_string(),
            group: "Test".to_string(),
            ui_name: id.to_string(),
            description: String::new(),
            calculation: None,
        }
    }

    fn catalog() -> HashMap<String, FieldDefinition> {
        [
            ("sessions", FieldKind::Metric),
            ("pageviews", FieldKind::Metric),
            ("date", FieldKind::Dimension),
            ("deviceCategory", FieldKind::Dimension),
        ]
        .into_iter()
        .map(|(id, kind)| (id.to_string(), definition(id, kind)))
        .collect()
    }

    #[test]
    fn identical_readd_reuses_alias() {
        let mut query = ReportQuery::new();
        let first = query.add_field(None, "sessions", None, BTreeMap::new());
        let second = query.add_field(None, "sessions", None, BTreeMap::new());
        assert_eq!(first, "sessions");
        assert_eq!(first, second);
        assert_eq!(query.fields().len(), 1);
    }

    #[test]
    fn differing_definitions_get_numbered_aliases() {
        let mut query = ReportQuery::new();
        let mut params = BTreeMap::new();
        params.insert("aggregate".to_string(), "sum".to_string());

        let first = query.add_field(None, "sessions", Some("s"), BTreeMap::new());
        let second = query.add_field(None, "sessions", Some("s"), params.clone());
        let third = query.add_field(None, "pageviews", Some("s"), BTreeMap::new());

        assert_eq!(first, "s");
        assert_eq!(second, "s_1");
        assert_eq!(third, "s_2");
    }

    #[test]
    fn default_alias_includes_table() {
        let mut query = ReportQuery::new();
        let alias = query.add_field(Some("report"), "sessions", None, BTreeMap::new());
        assert_eq!(alias, "report_sessions");
    }

    #[test]
    fn base_field_gets_bare_alias() {
        let mut query = ReportQuery::new().with_base("report", "date");
        let alias = query.add_field(Some("report"), "date", None, BTreeMap::new());
        assert_eq!(alias, "date");
    }

    #[test]
    fn alias_truncated_to_sixty_chars() {
        let mut query = ReportQuery::new();
        let long = "x".repeat(80);
        let alias = query.add_field(None, &long, None, BTreeMap::new());
        assert_eq!(alias.len(), 60);
    }

    #[test]
    fn falsy_groups_normalize_to_default() {
        let mut query = ReportQuery::new();
        query.add_where(None, "sessions", "10", ">");
        query.add_where(Some(0), "sessions", "1000", "<");

        let request = query.build(&catalog());
        // One AND group holding both conditions
        assert_eq!(request.filters.as_deref(), Some("sessions>10;sessions<1000"));
    }

    #[test]
    fn filter_groups_render_with_and_or_glue() {
        let mut query = ReportQuery::new();
        query.add_where(Some(1), "sessions", "10", ">");
        query.add_where(Some(1), "sessions", "1000", "<");
        query.set_where_group(Combinator::Or, 2);
        query.add_where(Some(2), "deviceCategory", "mobile", "==");

        let request = query.build(&catalog());
        assert_eq!(
            request.filters.as_deref(),
            Some("sessions>10;sessions<1000;deviceCategory==mobile")
        );
    }

    #[test]
    fn or_group_joins_with_comma() {
        let mut query = ReportQuery::new();
        query.set_where_group(Combinator::Or, 1);
        query.add_where(Some(1), "deviceCategory", "mobile", "==");
        query.add_where(Some(1), "deviceCategory", "tablet", "==");

        let request = query.build(&catalog());
        assert_eq!(
            request.filters.as_deref(),
            Some("deviceCategory==mobile,deviceCategory==tablet")
        );
    }

    #[test]
    fn outer_or_joins_groups_with_comma() {
        let mut query = ReportQuery::new();
        query.set_group_operator(Combinator::Or);
        query.add_where(Some(1), "sessions", "10", ">");
        query.add_where(Some(2), "deviceCategory", "mobile", "==");

        let request = query.build(&catalog());
        assert_eq!(
            request.filters.as_deref(),
            Some("sessions>10,deviceCategory==mobile")
        );
    }

    #[test]
    fn reserved_fields_become_top_level_params() {
        let mut query = ReportQuery::new();
        query.add_where(None, "start_date", "1388534400", "==");
        query.add_where(None, "end_date", "1391212800", "==");
        query.add_where(None, "profile_id", "4242", "==");

        let request = query.build(&catalog());
        assert_eq!(request.start_date, Some(1_388_534_400));
        assert_eq!(request.end_date, Some(1_391_212_800));
        assert_eq!(request.profile_id, Some(4242));
        assert!(request.filters.is_none());
    }

    #[test]
    fn unknown_fields_are_bookkept_but_not_rendered() {
        let mut query = ReportQuery::new();
        let alias = query.add_field(None, "notInCatalog", None, BTreeMap::new());
        query.add_field(None, "sessions", None, BTreeMap::new());
        query.add_where(None, "notInCatalog", "1", "==");

        assert_eq!(alias, "notInCatalog");
        assert!(query.alias_for("notInCatalog").is_some());

        let request = query.build(&catalog());
        assert_eq!(request.metrics, vec!["ga:sessions"]);
        assert!(request.dimensions.is_empty());
        assert!(request.filters.is_none());
    }

    #[test]
    fn end_to_end_build() {
        let mut query = ReportQuery::new();
        query.add_field(None, "sessions", None, BTreeMap::new());
        query.add_field(None, "date", None, BTreeMap::new());
        query.add_order_by("sessions", "DESC");
        query.set_range(None, Some(10));

        let request = query.build(&catalog());
        assert_eq!(request.metrics, vec!["ga:sessions"]);
        assert_eq!(request.dimensions, vec!["ga:date"]);
        assert_eq!(request.sort_metric, vec!["-ga:sessions"]);
        assert!(request.filters.is_none());
        assert_eq!(query.limit(), Some(10));
    }

    #[test]
    fn order_direction_is_case_insensitive() {
        let mut query = ReportQuery::new();
        query.add_order_by("sessions", "desc");
        query.add_order_by("date", "ASC");
        query.add_order_by("pageviews", "");

        let request = query.build(&catalog());
        assert_eq!(
            request.sort_metric,
            vec!["-ga:sessions", "ga:date", "ga:pageviews"]
        );
    }

    #[test]
    fn profile_override_requires_flag_and_id() {
        let mut query = ReportQuery::new();
        query.set_profile_id(99);
        assert_eq!(query.build(&catalog()).profile_id, None);

        query.set_profile_override(true);
        assert_eq!(query.build(&catalog()).profile_id, Some(99));
    }

    #[test]
    fn map_rows_translates_keys_to_aliases() {
        let mut query = ReportQuery::new();
        let alias = query.add_field(Some("report"), "sessions", None, BTreeMap::new());
        assert_eq!(alias, "report_sessions");

        let row = serde_json::json!({ "ga:sessions": "42", "bounces": "7" });
        let rows = vec![row.as_object().unwrap().clone()];
        let mapped = query.map_rows(rows);

        assert_eq!(mapped[0].get("report_sessions").unwrap(), "42");
        // Unregistered keys pass through with the prefix stripped
        assert_eq!(mapped[0].get("bounces").unwrap(), "7");
    }

    #[test]
    fn intval_coercion() {
        assert_eq!(coerce_int("1388534400"), 1_388_534_400);
        assert_eq!(coerce_int("2014-01-01"), 2014);
        assert_eq!(coerce_int("  -5x"), -5);
        assert_eq!(coerce_int("abc"), 0);
        assert_eq!(coerce_int(""), 0);
        assert_eq!(coerce_int("-"), 0);
    }
}
