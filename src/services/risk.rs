//! Risk alerts: expiring contracts, failed automation runs, low-balance
//! contracts.
//!
//! The three scans are independent, run concurrently, and are individually
//! time-bounded. A scan that fails or times out degrades to an empty list —
//! it never takes the rest of the brief down with it.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::records::{decode_rows, AutomationRecord, AutomationRunRecord, FundingContractRecord};
use crate::repository::table_service::{list_rows, list_rows_chunked};
use crate::schemas::{ExpiringContractAlert, FailedRunAlert, LowBalanceAlert, RiskSummary};
use crate::services::contracts::fetch_active_contracts;
use crate::services::reference::ReferenceData;
use crate::services::soft_section;
use crate::services::windows::{local_midnight_utc, BriefWindows};

pub const RISK_RESULT_CAP: usize = 10;
pub const EXPIRING_WINDOW_DAYS: i64 = 30;
/// The low-balance scan examines only the 50 most-depleted active
/// contracts; see DESIGN.md on the preserved sort-then-filter ordering.
pub const LOW_BALANCE_CANDIDATE_CAP: usize = 50;
const LOW_BALANCE_THRESHOLD_PCT: Decimal = dec!(20);
const FAILED_RUN_LOOKBACK_HOURS: i64 = 24;

pub async fn detect_risks(
    pool: &PgPool,
    org_id: &str,
    reference: &ReferenceData,
    windows: &BriefWindows,
    now: DateTime<Utc>,
    scan_timeout: StdDuration,
) -> RiskSummary {
    let (expiring_contracts, failed_automation_runs, low_balance_contracts) = tokio::join!(
        soft_section(
            "expiring_contracts",
            scan_timeout,
            scan_expiring_contracts(pool, reference, windows, now),
            Vec::new(),
        ),
        soft_section(
            "failed_automation_runs",
            scan_timeout,
            scan_failed_runs(pool, org_id, now),
            Vec::new(),
        ),
        soft_section(
            "low_balance_contracts",
            scan_timeout,
            scan_low_balance_contracts(pool, reference),
            Vec::new(),
        ),
    );

    RiskSummary {
        expiring_contracts,
        failed_automation_runs,
        low_balance_contracts,
    }
}

/// Active contracts ending within the next 30 local-calendar days.
async fn scan_expiring_contracts(
    pool: &PgPool,
    reference: &ReferenceData,
    windows: &BriefWindows,
    now: DateTime<Utc>,
) -> AppResult<Vec<ExpiringContractAlert>> {
    let horizon = windows.today + Duration::days(EXPIRING_WINDOW_DAYS);
    let contracts = fetch_active_contracts(
        pool,
        reference,
        &[
            ("end_date__gte", Value::String(windows.today.to_string())),
            ("end_date__lte", Value::String(horizon.to_string())),
        ],
        "end_date",
        RISK_RESULT_CAP as i64,
    )
    .await?;

    Ok(select_expiring(&contracts, now, windows.tz()))
}

fn select_expiring(
    contracts: &[FundingContractRecord],
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<ExpiringContractAlert> {
    let mut candidates: Vec<(&FundingContractRecord, NaiveDate)> = contracts
        .iter()
        .filter_map(|contract| contract.end_date.map(|end_date| (contract, end_date)))
        .collect();
    candidates.sort_by_key(|(_, end_date)| *end_date);

    candidates
        .into_iter()
        .take(RISK_RESULT_CAP)
        .map(|(contract, end_date)| ExpiringContractAlert {
            contract_id: contract.id.clone(),
            resident_id: contract.resident_id.clone(),
            end_date,
            days_remaining: days_remaining(end_date, tz, now),
            current_balance: contract.current_balance,
        })
        .collect()
}

/// Whole days until the contract's end date (local midnight), rounded up.
fn days_remaining(end_date: NaiveDate, tz: Tz, now: DateTime<Utc>) -> i64 {
    let end_instant = local_midnight_utc(tz, end_date);
    let seconds = (end_instant - now).num_seconds();
    (seconds as f64 / 86_400.0).ceil() as i64
}

/// Failed runs started within the last 24 hours, most recent first.
async fn scan_failed_runs(
    pool: &PgPool,
    org_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Vec<FailedRunAlert>> {
    let mut automation_filters = Map::new();
    automation_filters.insert(
        "organisation_id".to_string(),
        Value::String(org_id.to_string()),
    );
    let automation_rows = list_rows(
        pool,
        "automations",
        Some(&automation_filters),
        1_000,
        0,
        "id",
        true,
    )
    .await?;
    let automations: Vec<AutomationRecord> = decode_rows("automations", automation_rows);
    let automation_names: HashMap<&str, &str> = automations
        .iter()
        .filter(|automation| !automation.name.trim().is_empty())
        .map(|automation| (automation.id.as_str(), automation.name.as_str()))
        .collect();
    let automation_ids: Vec<String> = automations
        .iter()
        .map(|automation| automation.id.clone())
        .collect();

    let since = now - Duration::hours(FAILED_RUN_LOOKBACK_HOURS);
    let mut run_filters = Map::new();
    run_filters.insert("status".to_string(), Value::String("failed".to_string()));
    run_filters.insert(
        "started_at__gte".to_string(),
        Value::String(since.to_rfc3339()),
    );
    let run_rows = list_rows_chunked(
        pool,
        "automation_runs",
        "automation_id",
        &automation_ids,
        Some(&run_filters),
        RISK_RESULT_CAP as i64,
        "started_at",
        false,
    )
    .await?;

    let runs: Vec<AutomationRunRecord> = decode_rows("automation_runs", run_rows);
    Ok(select_failed_runs(&runs, &automation_names))
}

fn select_failed_runs(
    runs: &[AutomationRunRecord],
    automation_names: &HashMap<&str, &str>,
) -> Vec<FailedRunAlert> {
    let mut candidates: Vec<(&AutomationRunRecord, DateTime<Utc>)> = runs
        .iter()
        .filter_map(|run| run.started_at.map(|started_at| (run, started_at)))
        .collect();
    candidates.sort_by_key(|(_, started_at)| std::cmp::Reverse(*started_at));

    candidates
        .into_iter()
        .take(RISK_RESULT_CAP)
        .map(|(run, started_at)| FailedRunAlert {
            run_id: run.id.clone(),
            automation_id: run.automation_id.clone(),
            automation_name: automation_names
                .get(run.automation_id.as_str())
                .map(|name| (*name).to_string()),
            started_at: started_at.to_rfc3339(),
            error: run.error_summary(),
        })
        .collect()
}

/// Active contracts under 20% of their original funding.
async fn scan_low_balance_contracts(
    pool: &PgPool,
    reference: &ReferenceData,
) -> AppResult<Vec<LowBalanceAlert>> {
    let candidates = fetch_active_contracts(
        pool,
        reference,
        &[],
        "current_balance",
        LOW_BALANCE_CANDIDATE_CAP as i64,
    )
    .await?;
    Ok(select_low_balance(candidates))
}

/// Sort ascending by balance, cap the candidate set, then apply the
/// percentage filter. The ordering biases the capped set toward the most
/// depleted contracts; it is preserved as-is from the original behaviour.
fn select_low_balance(mut candidates: Vec<FundingContractRecord>) -> Vec<LowBalanceAlert> {
    candidates.sort_by(|left, right| left.current_balance.cmp(&right.current_balance));
    candidates.truncate(LOW_BALANCE_CANDIDATE_CAP);

    candidates
        .into_iter()
        .filter_map(|contract| {
            if contract.original_amount <= Decimal::ZERO {
                return None;
            }
            let percent_remaining =
                contract.current_balance / contract.original_amount * dec!(100);
            if percent_remaining < Decimal::ZERO || percent_remaining >= LOW_BALANCE_THRESHOLD_PCT
            {
                return None;
            }
            Some(LowBalanceAlert {
                contract_id: contract.id,
                resident_id: contract.resident_id,
                original_amount: contract.original_amount,
                current_balance: contract.current_balance,
                percent_remaining: percent_remaining.round_dp(2),
            })
        })
        .take(RISK_RESULT_CAP)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::{days_remaining, select_expiring, select_failed_runs, select_low_balance};
    use crate::records::{AutomationRunRecord, FundingContractRecord};

    fn contract(id: &str, original: &str, balance: &str, end_date: Option<&str>) -> FundingContractRecord {
        serde_json::from_value(json!({
            "id": id,
            "resident_id": format!("resident-{id}"),
            "original_amount": original,
            "current_balance": balance,
            "status": "active",
            "end_date": end_date,
        }))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        "2026-08-06T02:00:00Z".parse().unwrap()
    }

    #[test]
    fn low_balance_threshold_is_strict() {
        let alerts = select_low_balance(vec![
            contract("depleted", "1000", "150", None),
            contract("borderline-in", "10000", "1999", None),
            contract("borderline-out", "1000", "200", None),
            contract("healthy", "1000", "250", None),
            contract("zero-original", "0", "50", None),
            contract("overdrawn", "1000", "-10", None),
        ]);
        let ids: Vec<&str> = alerts.iter().map(|alert| alert.contract_id.as_str()).collect();
        assert_eq!(ids, vec!["depleted", "borderline-in"]);
    }

    #[test]
    fn low_balance_percentages_round_to_two_places() {
        let alerts = select_low_balance(vec![contract("c1", "1000", "150", None)]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].percent_remaining, dec!(15.00));
    }

    #[test]
    fn candidate_cap_applies_before_the_percentage_filter() {
        // Fifty healthy contracts with the lowest balances crowd out a
        // genuinely depleted contract ranked 51st — the documented bias.
        let mut candidates: Vec<FundingContractRecord> = (1..=50)
            .map(|index| contract(&format!("healthy-{index}"), "30", &index.to_string(), None))
            .collect();
        candidates.push(contract("depleted", "10000", "100", None));

        let alerts = select_low_balance(candidates);
        assert!(alerts.is_empty());
    }

    #[test]
    fn expiring_contracts_sort_by_end_date_and_cap() {
        let contracts: Vec<FundingContractRecord> = (0..15)
            .map(|index| {
                contract(
                    &format!("c{index}"),
                    "1000",
                    "500",
                    Some(&format!("2026-08-{:02}", 30 - index)),
                )
            })
            .collect();
        let alerts = select_expiring(&contracts, now(), chrono_tz::Australia::Sydney);
        assert_eq!(alerts.len(), 10);
        assert_eq!(alerts[0].end_date.to_string(), "2026-08-16");
        assert!(alerts.windows(2).all(|pair| pair[0].end_date <= pair[1].end_date));
    }

    #[test]
    fn days_remaining_rounds_up_partial_days() {
        let tz = chrono_tz::Australia::Sydney;
        // 2026-08-10 00:00 AEST = 2026-08-09T14:00Z; 3.5 days out → 4.
        let at = "2026-08-06T02:00:00Z".parse().unwrap();
        assert_eq!(days_remaining("2026-08-10".parse().unwrap(), tz, at), 4);
        // Midnight already passed today → 0, never negative within the day.
        assert_eq!(days_remaining("2026-08-06".parse().unwrap(), tz, at), 0);
    }

    #[test]
    fn failed_runs_order_most_recent_first_and_cap() {
        let runs: Vec<AutomationRunRecord> = (0..12)
            .map(|index| {
                serde_json::from_value(json!({
                    "id": format!("run-{index}"),
                    "automation_id": "a1",
                    "status": "failed",
                    "started_at": format!("2026-08-05T{:02}:00:00Z", index),
                    "error": "boom",
                }))
                .unwrap()
            })
            .collect();
        let names = HashMap::from([("a1", "Nightly drawdown")]);

        let alerts = select_failed_runs(&runs, &names);
        assert_eq!(alerts.len(), 10);
        assert_eq!(alerts[0].run_id, "run-11");
        assert_eq!(alerts[0].automation_name.as_deref(), Some("Nightly drawdown"));
        assert_eq!(alerts[0].error.as_deref(), Some("boom"));
    }
}
