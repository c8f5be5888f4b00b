//! Typed records for the entities the brief engine reads.
//!
//! Rows come back from the repository as `row_to_json` values; everything is
//! decoded here, at the boundary, so the aggregation code never touches raw
//! JSON. Decoding is tolerant: missing or null fields fall back to defaults,
//! monetary fields go through [`crate::money`], and a row that cannot be
//! decoded at all is logged and skipped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::money;

pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(table, %error, "skipping undecodable row");
                None
            }
        })
        .collect()
}

pub fn decode_row<T: DeserializeOwned>(table: &str, row: Value) -> Option<T> {
    match serde_json::from_value::<T>(row) {
        Ok(record) => Some(record),
        Err(error) => {
            warn!(table, %error, "undecodable row");
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganisationRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HouseRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub descriptor: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub bedroom_count: Option<i64>,
    #[serde(default)]
    pub status: String,
}

impl HouseRecord {
    /// Display label fallback chain: descriptor → address → suburb → "Unknown".
    pub fn label(&self) -> String {
        [&self.descriptor, &self.address, &self.suburb]
            .into_iter()
            .find_map(|field| {
                field
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
            })
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResidentRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub house_id: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl ResidentRecord {
    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingTransactionRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub resident_id: Option<String>,
    #[serde(default, deserialize_with = "money::decimal_or_zero")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "timestamp_or_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub organisation_id: String,
    #[serde(default)]
    pub house_id: Option<String>,
    #[serde(default, deserialize_with = "money::decimal_or_zero")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "timestamp_or_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub origin: Option<String>,
}

impl ExpenseRecord {
    pub fn is_organisation_scope(&self) -> bool {
        self.scope.trim().eq_ignore_ascii_case("organisation")
    }

    pub fn is_automated(&self) -> bool {
        self.origin
            .as_deref()
            .is_some_and(|origin| origin.trim().eq_ignore_ascii_case("automation"))
    }

    pub fn category_label(&self) -> String {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "other".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundingContractRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub resident_id: String,
    #[serde(default, deserialize_with = "money::decimal_or_zero")]
    pub original_amount: Decimal,
    #[serde(default, deserialize_with = "money::decimal_or_zero")]
    pub current_balance: Decimal,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "date_or_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "date_or_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub auto_bill_enabled: bool,
    #[serde(default, deserialize_with = "money::decimal_or_zero")]
    pub daily_support_cost: Decimal,
}

impl FundingContractRecord {
    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub organisation_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub automation_type: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default, deserialize_with = "timestamp_or_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

impl AutomationRecord {
    /// String parameter lookup inside the free-form `parameters` object.
    pub fn parameter(&self, key: &str) -> Option<String> {
        self.parameters
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|object| object.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationRunRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub automation_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "timestamp_or_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp_or_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl AutomationRunRecord {
    /// Flatten the error payload (text or structured) into one line for the
    /// alert list.
    pub fn error_summary(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "money::decimal_or_zero")]
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminUserRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub email: Option<String>,
}

fn date_or_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .map(str::trim)
        .and_then(|text| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()))
}

fn timestamp_or_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(parse_timestamp))
}

/// RFC 3339 with `Z` normalization, falling back to Postgres' naive
/// timestamp rendering (assumed UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut normalized = trimmed.to_string();
    if normalized.ends_with('Z') {
        normalized.truncate(normalized.len().saturating_sub(1));
        normalized.push_str("+00:00");
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
