//! Read-only query surface over the organisation-scoped tables the brief
//! engine consumes.
//!
//! Rows are returned as `row_to_json` values and decoded into typed records
//! at the caller's boundary (`crate::records`). The engine never mutates the
//! store, so there is no insert/update/delete surface here.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "admin_users",
    "automation_runs",
    "automations",
    "billing_transactions",
    "claims",
    "expenses",
    "funding_contracts",
    "houses",
    "organisations",
    "residents",
];

const MAX_ROWS: i64 = 10_000;

/// Batch size for queries keyed by a potentially large id list. Results
/// from the batches are merged by addition downstream, never replaced.
pub const ID_BATCH_SIZE: usize = 100;

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "id"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    query.push(" ORDER BY t.").push(order_name);
    query.push(if ascending { " ASC" } else { " DESC" });
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, MAX_ROWS))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

pub async fn get_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let id_name = validate_identifier(id_field)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE ");
    push_scalar_filter(
        &mut query,
        id_name,
        FilterOperator::Eq,
        &infer_scalar_filter(id_name, &Value::String(row_id.to_string())),
    );
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

/// Run one logical query keyed by a large id list as concurrent ≤100-id
/// batches and merge the results.
///
/// Every batch is attempted even when an earlier one fails; if any batch
/// failed the merged result is withheld and an error is returned, so callers
/// never aggregate over a silently-partial row set.
#[allow(clippy::too_many_arguments)]
pub async fn list_rows_chunked(
    pool: &sqlx::PgPool,
    table: &str,
    id_column: &str,
    ids: &[String],
    base_filters: Option<&Map<String, Value>>,
    per_chunk_limit: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    validate_table(table)?;
    validate_identifier(id_column)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut batches = JoinSet::new();
    for chunk in ids.chunks(ID_BATCH_SIZE) {
        let pool = pool.clone();
        let table = table.to_string();
        let order_by = order_by.to_string();
        let mut filters = base_filters.cloned().unwrap_or_default();
        filters.insert(
            id_column.to_string(),
            Value::Array(chunk.iter().cloned().map(Value::String).collect()),
        );
        batches.spawn(async move {
            list_rows(
                &pool,
                &table,
                Some(&filters),
                per_chunk_limit,
                0,
                &order_by,
                ascending,
            )
            .await
        });
    }

    let total = batches.len();
    let mut merged = Vec::new();
    let mut failed = 0usize;
    while let Some(joined) = batches.join_next().await {
        match joined {
            Ok(Ok(rows)) => merged.extend(rows),
            Ok(Err(error)) => {
                warn!(table, %error, "batched query failed");
                failed += 1;
            }
            Err(error) => {
                warn!(table, %error, "batched query task failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(AppError::Dependency(format!(
            "{failed} of {total} batched queries failed for {table}."
        )));
    }
    Ok(merged)
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::BadRequest(format!(
        "Table '{normalized}' is not readable by the brief engine."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    let mut characters = trimmed.chars();
    let starts_lower = characters
        .next()
        .is_some_and(|first| first.is_ascii_lowercase());
    let rest_valid = characters
        .all(|character| character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_');
    if !starts_lower || !rest_valid {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone)]
enum ScalarFilter {
    Text(String),
    Uuid(uuid::Uuid),
    Bool(bool),
    I64(i64),
    F64(f64),
    Date(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
}

impl FilterOperator {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gt => " > ",
            Self::Gte => " >= ",
            Self::Lt => " < ",
            Self::Lte => " <= ",
            Self::IsNull => " IS NULL",
        }
    }
}

fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    if let Some((column, suffix)) = filter_key.rsplit_once("__") {
        let operator = match suffix {
            "gt" => Some(FilterOperator::Gt),
            "gte" => Some(FilterOperator::Gte),
            "lt" => Some(FilterOperator::Lt),
            "lte" => Some(FilterOperator::Lte),
            "is_null" => Some(FilterOperator::IsNull),
            "in" => Some(FilterOperator::Eq),
            _ => None,
        };
        if let Some(operator) = operator {
            return Ok((validate_identifier(column)?, operator));
        }
    }
    Ok((validate_identifier(filter_key)?, FilterOperator::Eq))
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;

    if matches!(operator, FilterOperator::IsNull) {
        let should_be_null = match value {
            Value::Null => true,
            Value::Bool(flag) => *flag,
            Value::String(text) => matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "true" | "t" | "1" | "yes"
            ),
            _ => false,
        };
        query.push(" AND t.").push(column);
        query.push(if should_be_null { " IS NULL" } else { " IS NOT NULL" });
        return Ok(());
    }

    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            if !matches!(operator, FilterOperator::Eq) {
                return Err(AppError::BadRequest(format!(
                    "Filter '{filter_key}' does not support array values."
                )));
            }
            if items.is_empty() {
                return Ok(());
            }
            query.push(" AND ");
            push_array_filter(query, column, items);
            Ok(())
        }
        _ => {
            query.push(" AND ");
            let filter = infer_scalar_filter(column, value);
            push_scalar_filter(query, column, operator, &filter);
            Ok(())
        }
    }
}

fn push_scalar_filter(
    query: &mut QueryBuilder<Postgres>,
    column: &str,
    operator: FilterOperator,
    value: &ScalarFilter,
) {
    query.push("t.").push(column);
    let sql_operator = operator.sql();
    match value {
        ScalarFilter::Text(text) => {
            query.push("::text").push(sql_operator).push_bind(text.clone());
        }
        ScalarFilter::Uuid(id) => {
            query.push(sql_operator).push_bind(*id);
        }
        ScalarFilter::Bool(flag) => {
            query.push(sql_operator).push_bind(*flag);
        }
        ScalarFilter::I64(number) => {
            query.push(sql_operator).push_bind(*number);
        }
        ScalarFilter::F64(number) => {
            query.push(sql_operator).push_bind(*number);
        }
        ScalarFilter::Date(date) => {
            query.push(sql_operator).push_bind(*date);
        }
        ScalarFilter::Timestamp(instant) => {
            query.push(sql_operator).push_bind(instant.to_owned());
        }
    }
}

/// Id-list membership. Uuid-shaped id lists bind as `uuid[]`, everything
/// else compares as text.
fn push_array_filter(query: &mut QueryBuilder<Postgres>, column: &str, items: &[Value]) {
    query.push("t.").push(column);

    if is_uuid_identifier(column) {
        let mut parsed = Vec::with_capacity(items.len());
        for item in items {
            let Some(as_uuid) = item
                .as_str()
                .and_then(|text| uuid::Uuid::parse_str(text.trim()).ok())
            else {
                parsed.clear();
                break;
            };
            parsed.push(as_uuid);
        }
        if !parsed.is_empty() {
            query.push(" = ANY(").push_bind(parsed).push(")");
            return;
        }
    }

    let texts = items
        .iter()
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>();
    query.push("::text = ANY(").push_bind(texts).push(")");
}

fn infer_scalar_filter(filter_key: &str, value: &Value) -> ScalarFilter {
    match value {
        Value::Bool(flag) => ScalarFilter::Bool(*flag),
        Value::Number(number) => {
            if let Some(as_i64) = number.as_i64() {
                return ScalarFilter::I64(as_i64);
            }
            if let Some(as_f64) = number.as_f64() {
                return ScalarFilter::F64(as_f64);
            }
            ScalarFilter::Text(number.to_string())
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if is_uuid_identifier(filter_key) {
                if let Ok(parsed) = uuid::Uuid::parse_str(trimmed) {
                    return ScalarFilter::Uuid(parsed);
                }
            }
            if is_timestamp_identifier(filter_key) {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                    return ScalarFilter::Timestamp(parsed);
                }
            }
            if is_date_identifier(filter_key) {
                if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                    return ScalarFilter::Date(parsed);
                }
            }
            ScalarFilter::Text(text.clone())
        }
        _ => ScalarFilter::Text(value.to_string()),
    }
}

fn is_uuid_identifier(identifier: &str) -> bool {
    let normalized = identifier.trim();
    normalized == "id" || normalized.ends_with("_id")
}

fn is_date_identifier(identifier: &str) -> bool {
    identifier.trim().ends_with("_date")
}

fn is_timestamp_identifier(identifier: &str) -> bool {
    identifier.trim().ends_with("_at")
}

fn map_db_error(error: sqlx::Error) -> AppError {
    tracing::error!(db_error = %error, "Database query failed");
    AppError::Dependency("Database query failed.".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};
    use sqlx::{Postgres, QueryBuilder};

    use super::{
        parse_filter_key, push_filter_clause, validate_identifier, validate_table, FilterOperator,
        ID_BATCH_SIZE,
    };

    #[test]
    fn identifier_validation_rejects_injection_shapes() {
        assert!(validate_identifier("occurred_at").is_ok());
        assert!(validate_identifier("resident_id").is_ok());
        assert!(validate_identifier("1column").is_err());
        assert!(validate_identifier("amount; DROP TABLE houses").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("Amount").is_err());
    }

    #[test]
    fn only_brief_tables_are_readable() {
        assert!(validate_table("billing_transactions").is_ok());
        assert!(validate_table("funding_contracts").is_ok());
        assert!(validate_table("message_logs").is_err());
    }

    #[test]
    fn filter_keys_parse_operator_suffixes() {
        assert_eq!(
            parse_filter_key("occurred_at__gte").unwrap(),
            ("occurred_at", FilterOperator::Gte)
        );
        assert_eq!(
            parse_filter_key("occurred_at__lt").unwrap(),
            ("occurred_at", FilterOperator::Lt)
        );
        assert_eq!(
            parse_filter_key("end_date__lte").unwrap(),
            ("end_date", FilterOperator::Lte)
        );
        assert_eq!(
            parse_filter_key("house_id__is_null").unwrap(),
            ("house_id", FilterOperator::IsNull)
        );
        assert_eq!(
            parse_filter_key("status").unwrap(),
            ("status", FilterOperator::Eq)
        );
    }

    #[test]
    fn window_filters_assemble_expected_sql() {
        let mut query =
            QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM expenses t WHERE 1=1");
        let mut filters = Map::new();
        filters.insert(
            "organisation_id".to_string(),
            Value::String("550e8400-e29b-41d4-a716-446655440000".to_string()),
        );
        filters.insert(
            "occurred_at__gte".to_string(),
            Value::String("2026-08-05T14:00:00+00:00".to_string()),
        );
        filters.insert(
            "occurred_at__lt".to_string(),
            Value::String("2026-08-06T14:00:00+00:00".to_string()),
        );
        for (key, value) in &filters {
            push_filter_clause(&mut query, key, value).unwrap();
        }
        let sql = query.sql();
        assert!(sql.contains("t.organisation_id = "), "got: {sql}");
        assert!(sql.contains("t.occurred_at >= "), "got: {sql}");
        assert!(sql.contains("t.occurred_at < "), "got: {sql}");
    }

    #[test]
    fn id_list_filters_bind_as_any() {
        let mut query =
            QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM residents t WHERE 1=1");
        push_filter_clause(
            &mut query,
            "resident_id",
            &json!(["550e8400-e29b-41d4-a716-446655440000"]),
        )
        .unwrap();
        assert!(query.sql().contains("t.resident_id = ANY("));
    }

    #[test]
    fn empty_array_filters_are_no_ops() {
        let mut query =
            QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM residents t WHERE 1=1");
        push_filter_clause(&mut query, "resident_id", &json!([])).unwrap();
        assert_eq!(
            query.sql(),
            "SELECT row_to_json(t) AS row FROM residents t WHERE 1=1"
        );
    }

    #[test]
    fn id_batches_split_at_one_hundred() {
        let ids: Vec<String> = (0..250).map(|index| format!("resident-{index}")).collect();
        let sizes: Vec<usize> = ids.chunks(ID_BATCH_SIZE).map(<[String]>::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }
}
