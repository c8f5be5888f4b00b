//! Shared funding-contract fetch.
//!
//! Contracts hang off residents, not the organisation, so every consumer
//! (risk scans, outlook billing runs) scopes by the reference resident list
//! and inherits the same ≤100-id batching discipline as income.

use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::records::{decode_rows, FundingContractRecord};
use crate::repository::table_service::list_rows_chunked;
use crate::services::reference::ReferenceData;

pub async fn fetch_active_contracts(
    pool: &PgPool,
    reference: &ReferenceData,
    extra_filters: &[(&str, Value)],
    order_by: &str,
    per_chunk_limit: i64,
) -> AppResult<Vec<FundingContractRecord>> {
    let mut filters = Map::new();
    filters.insert("status".to_string(), Value::String("active".to_string()));
    for (key, value) in extra_filters {
        filters.insert((*key).to_string(), value.clone());
    }

    let rows = list_rows_chunked(
        pool,
        "funding_contracts",
        "resident_id",
        &reference.resident_ids,
        Some(&filters),
        per_chunk_limit,
        order_by,
        true,
    )
    .await?;

    Ok(decode_rows("funding_contracts", rows))
}
