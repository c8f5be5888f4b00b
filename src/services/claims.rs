//! Claim rollup: draft vs in-flight counts and totals.

use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::records::{decode_rows, ClaimRecord};
use crate::repository::table_service::list_rows;
use crate::schemas::ClaimsSummary;

const IN_FLIGHT_STATUSES: &[&str] = &["submitted", "in_progress", "processed", "auto_processed"];

pub async fn summarize_claims(pool: &PgPool, org_id: &str) -> AppResult<ClaimsSummary> {
    let mut filters = Map::new();
    filters.insert(
        "organisation_id".to_string(),
        Value::String(org_id.to_string()),
    );
    let rows = list_rows(pool, "claims", Some(&filters), 10_000, 0, "id", true).await?;
    let claims: Vec<ClaimRecord> = decode_rows("claims", rows);
    Ok(bucket_claims(&claims))
}

fn bucket_claims(claims: &[ClaimRecord]) -> ClaimsSummary {
    let mut summary = ClaimsSummary::default();
    for claim in claims {
        let status = claim.status.trim().to_ascii_lowercase();
        if status == "draft" {
            summary.draft_count += 1;
            summary.draft_amount += claim.total_amount;
        } else if IN_FLIGHT_STATUSES.contains(&status.as_str()) {
            summary.in_flight_count += 1;
            summary.in_flight_amount += claim.total_amount;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::bucket_claims;
    use crate::records::ClaimRecord;

    fn claim(status: &str, amount: &str) -> ClaimRecord {
        serde_json::from_value(json!({
            "id": "c",
            "status": status,
            "total_amount": amount,
        }))
        .unwrap()
    }

    #[test]
    fn statuses_bucket_into_draft_and_in_flight() {
        let summary = bucket_claims(&[
            claim("draft", "100"),
            claim("submitted", "200"),
            claim("in_progress", "50"),
            claim("auto_processed", "25"),
            claim("rejected", "999"),
        ]);
        assert_eq!(summary.draft_count, 1);
        assert_eq!(summary.draft_amount, dec!(100));
        assert_eq!(summary.in_flight_count, 3);
        assert_eq!(summary.in_flight_amount, dec!(275));
    }
}
