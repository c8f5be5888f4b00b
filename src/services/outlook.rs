//! Forward outlook: scheduled automations expanded into expected income and
//! costs over the forward window.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::warn;

use crate::error::AppResult;
use crate::records::{
    decode_row, decode_rows, AutomationRecord, BillingTransactionRecord, ExpenseRecord,
};
use crate::repository::table_service::{get_row, list_rows};
use crate::schemas::{OutlookSummary, UpcomingItem};
use crate::services::contracts::fetch_active_contracts;
use crate::services::reference::ReferenceData;
use crate::services::windows::BriefWindows;

/// Bound on expanded automations, against pathological schedule
/// configurations.
pub const OUTLOOK_AUTOMATION_CAP: i64 = 20;
pub const UPCOMING_ITEM_CAP: usize = 5;

const RECURRING_TRANSACTION: &str = "recurring_transaction";
const CONTRACT_BILLING_RUN: &str = "contract_billing_run";

/// Which rollup a projected amount lands in.
#[derive(Debug, Clone, PartialEq)]
enum Bucket {
    Income,
    Property,
    Organisation,
}

#[derive(Debug, Clone)]
struct Projection {
    date: NaiveDate,
    name: String,
    category: String,
    house: Option<String>,
    amount: Decimal,
    bucket: Bucket,
}

pub async fn project_outlook(
    pool: &PgPool,
    org_id: &str,
    reference: &ReferenceData,
    windows: &BriefWindows,
) -> AppResult<OutlookSummary> {
    let window = windows.outlook();
    let (start_utc, end_utc) = window.utc_bounds(windows.tz());

    let mut filters = Map::new();
    filters.insert(
        "organisation_id".to_string(),
        Value::String(org_id.to_string()),
    );
    filters.insert("enabled".to_string(), Value::Bool(true));
    filters.insert(
        "automation_type".to_string(),
        Value::Array(vec![
            Value::String(RECURRING_TRANSACTION.to_string()),
            Value::String(CONTRACT_BILLING_RUN.to_string()),
        ]),
    );
    filters.insert(
        "next_run_at__gte".to_string(),
        Value::String(start_utc.to_rfc3339()),
    );
    filters.insert(
        "next_run_at__lt".to_string(),
        Value::String(end_utc.to_rfc3339()),
    );

    let rows = list_rows(
        pool,
        "automations",
        Some(&filters),
        OUTLOOK_AUTOMATION_CAP,
        0,
        "next_run_at",
        true,
    )
    .await?;
    let automations: Vec<AutomationRecord> = decode_rows("automations", rows);

    // One billing run covers every auto-billed contract; the batch total is
    // fetched once and reused for each occurrence in the window.
    let mut billing_run_total: Option<Decimal> = None;
    let mut projections = Vec::with_capacity(automations.len());

    for automation in &automations {
        let Some(next_run_at) = automation.next_run_at else {
            continue;
        };
        let run_date = next_run_at.with_timezone(&windows.tz()).date_naive();

        let projection = if automation.automation_type == CONTRACT_BILLING_RUN {
            let total = match billing_run_total {
                Some(total) => total,
                None => {
                    let total = auto_billed_daily_total(pool, reference).await;
                    billing_run_total = Some(total);
                    total
                }
            };
            Projection {
                date: run_date,
                name: automation_label(automation),
                category: "drawdown".to_string(),
                house: None,
                amount: total,
                bucket: Bucket::Income,
            }
        } else {
            resolve_recurring(pool, automation, reference, run_date).await
        };

        projections.push(projection);
    }

    Ok(assemble_outlook(window.start, window.end, projections))
}

/// Resolve a recurring automation's template into a projected amount. A
/// template that cannot be resolved still yields a zero-amount, label-only
/// entry so the schedule stays visible.
async fn resolve_recurring(
    pool: &PgPool,
    automation: &AutomationRecord,
    reference: &ReferenceData,
    run_date: NaiveDate,
) -> Projection {
    let name = automation_label(automation);

    if let Some(expense_id) = automation.parameter("expense_template_id") {
        let template = match get_row(pool, "expenses", &expense_id, "id").await {
            Ok(row) => decode_row::<ExpenseRecord>("expenses", row),
            Err(error) => {
                warn!(automation_id = %automation.id, %error, "expense template lookup failed");
                None
            }
        };
        return match template {
            Some(expense) if expense.is_organisation_scope() => Projection {
                date: run_date,
                name,
                category: expense.category_label(),
                house: None,
                amount: expense.amount,
                bucket: Bucket::Organisation,
            },
            Some(expense) => Projection {
                date: run_date,
                name,
                category: expense.category_label(),
                house: expense
                    .house_id
                    .as_deref()
                    .and_then(|house_id| reference.house_label(house_id)),
                amount: expense.amount,
                bucket: Bucket::Property,
            },
            None => unresolved(run_date, name),
        };
    }

    if let Some(transaction_id) = automation.parameter("transaction_template_id") {
        let template = match get_row(pool, "billing_transactions", &transaction_id, "id").await {
            Ok(row) => decode_row::<BillingTransactionRecord>("billing_transactions", row),
            Err(error) => {
                warn!(automation_id = %automation.id, %error, "transaction template lookup failed");
                None
            }
        };
        return match template {
            Some(transaction) => Projection {
                date: run_date,
                name,
                category: "income".to_string(),
                house: None,
                amount: transaction.amount,
                bucket: Bucket::Income,
            },
            None => unresolved(run_date, name),
        };
    }

    warn!(automation_id = %automation.id, "recurring automation references no template");
    unresolved(run_date, name)
}

fn unresolved(date: NaiveDate, name: String) -> Projection {
    Projection {
        date,
        name,
        category: "unresolved".to_string(),
        house: None,
        amount: Decimal::ZERO,
        bucket: Bucket::Income,
    }
}

/// Daily support-item cost summed across active auto-billed contracts. A
/// fetch failure degrades the billing-run projection to zero.
async fn auto_billed_daily_total(pool: &PgPool, reference: &ReferenceData) -> Decimal {
    match fetch_active_contracts(
        pool,
        reference,
        &[("auto_bill_enabled", Value::Bool(true))],
        "id",
        10_000,
    )
    .await
    {
        Ok(contracts) => contracts
            .iter()
            .map(|contract| contract.daily_support_cost)
            .sum(),
        Err(error) => {
            warn!(%error, "auto-billed contract fetch failed, projecting zero");
            Decimal::ZERO
        }
    }
}

fn automation_label(automation: &AutomationRecord) -> String {
    let trimmed = automation.name.trim();
    if trimmed.is_empty() {
        "Scheduled automation".to_string()
    } else {
        trimmed.to_string()
    }
}

fn assemble_outlook(
    from: NaiveDate,
    to: NaiveDate,
    mut projections: Vec<Projection>,
) -> OutlookSummary {
    projections.sort_by_key(|projection| projection.date);

    let mut summary = OutlookSummary::empty(from, to);
    for projection in projections {
        match projection.bucket {
            Bucket::Income => summary.expected_income += projection.amount,
            Bucket::Property => summary.expected_property_costs += projection.amount,
            Bucket::Organisation => summary.expected_org_costs += projection.amount,
        }
        if summary.upcoming.len() < UPCOMING_ITEM_CAP {
            summary.upcoming.push(UpcomingItem {
                date: projection.date,
                name: projection.name,
                category: projection.category,
                house: projection.house,
                amount: projection.amount,
            });
        }
    }
    summary.projected_net =
        summary.expected_income - summary.expected_property_costs - summary.expected_org_costs;
    summary
}
