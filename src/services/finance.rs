//! Income and cost aggregation for one organisation over one
//! local-calendar window.
//!
//! Income lives against residents, not the organisation, so the resident id
//! list is batched (≤100 ids per query) and the batches merged by addition.
//! Expenses are fetched directly by organisation id. All status filtering
//! and bucketing happens here, after the typed decode.

use std::collections::HashMap;

use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::records::{decode_rows, BillingTransactionRecord, ExpenseRecord};
use crate::repository::table_service::{list_rows, list_rows_chunked};
use crate::schemas::{CategoryTotal, FinancialSummary, HouseFinancial};
use crate::services::reference::ReferenceData;
use crate::services::windows::DateWindow;

/// Income statuses that contribute nothing to any sum.
const EXCLUDED_INCOME_STATUSES: &[&str] = &["rejected", "cancelled"];
const CANCELLED_EXPENSE_STATUS: &str = "cancelled";

pub async fn aggregate_window(
    pool: &PgPool,
    org_id: &str,
    reference: &ReferenceData,
    window: DateWindow,
    tz: Tz,
) -> AppResult<FinancialSummary> {
    let (start_utc, end_utc) = window.utc_bounds(tz);

    let mut window_filters = Map::new();
    window_filters.insert(
        "occurred_at__gte".to_string(),
        Value::String(start_utc.to_rfc3339()),
    );
    window_filters.insert(
        "occurred_at__lt".to_string(),
        Value::String(end_utc.to_rfc3339()),
    );

    let mut expense_filters = window_filters.clone();
    expense_filters.insert(
        "organisation_id".to_string(),
        Value::String(org_id.to_string()),
    );

    let (income_rows, expense_rows) = tokio::try_join!(
        list_rows_chunked(
            pool,
            "billing_transactions",
            "resident_id",
            &reference.resident_ids,
            Some(&window_filters),
            10_000,
            "occurred_at",
            true,
        ),
        list_rows(pool, "expenses", Some(&expense_filters), 10_000, 0, "occurred_at", true),
    )?;

    let income = decode_rows::<BillingTransactionRecord>("billing_transactions", income_rows);
    let expenses = decode_rows::<ExpenseRecord>("expenses", expense_rows);
    Ok(summarize_window(window, &income, &expenses, reference))
}

/// Pure fold of decoded records into the window summary.
pub fn summarize_window(
    window: DateWindow,
    income: &[BillingTransactionRecord],
    expenses: &[ExpenseRecord],
    reference: &ReferenceData,
) -> FinancialSummary {
    let mut income_total = Decimal::ZERO;
    let mut house_income: HashMap<String, Decimal> = HashMap::new();

    for transaction in income {
        if is_excluded_income_status(&transaction.status) {
            continue;
        }
        income_total += transaction.amount;
        let house_id = transaction
            .resident_id
            .as_deref()
            .and_then(|resident_id| reference.resident_house.get(resident_id));
        if let Some(house_id) = house_id {
            *house_income.entry(house_id.clone()).or_default() += transaction.amount;
        }
    }

    let mut property_costs = Decimal::ZERO;
    let mut org_costs = Decimal::ZERO;
    let mut house_expenses: HashMap<String, Decimal> = HashMap::new();
    let mut categories: HashMap<String, Decimal> = HashMap::new();
    let mut automated_expense_count = 0_i64;
    let mut manual_expense_count = 0_i64;

    for expense in expenses {
        if expense
            .status
            .trim()
            .eq_ignore_ascii_case(CANCELLED_EXPENSE_STATUS)
        {
            continue;
        }
        if expense.is_organisation_scope() {
            // Organisation-wide costs never land in a house bucket, even
            // when the record carries a stray house reference.
            org_costs += expense.amount;
        } else {
            property_costs += expense.amount;
            if let Some(house_id) = expense
                .house_id
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                *house_expenses.entry(house_id.to_string()).or_default() += expense.amount;
            }
        }
        *categories.entry(expense.category_label()).or_default() += expense.amount;
        if expense.is_automated() {
            automated_expense_count += 1;
        } else {
            manual_expense_count += 1;
        }
    }

    let mut house_ids: Vec<String> = house_income
        .keys()
        .chain(house_expenses.keys())
        .cloned()
        .collect();
    house_ids.sort_unstable();
    house_ids.dedup();

    let mut houses: Vec<HouseFinancial> = house_ids
        .into_iter()
        .map(|house_id| HouseFinancial {
            label: reference
                .house_label(&house_id)
                .unwrap_or_else(|| "Unknown".to_string()),
            income: house_income.get(&house_id).copied().unwrap_or_default(),
            expenses: house_expenses.get(&house_id).copied().unwrap_or_default(),
            house_id,
        })
        .collect();
    houses.sort_by(|left, right| {
        left.label
            .cmp(&right.label)
            .then_with(|| left.house_id.cmp(&right.house_id))
    });

    let mut expense_categories: Vec<CategoryTotal> = categories
        .into_iter()
        .map(|(category, total)| CategoryTotal { category, total })
        .collect();
    expense_categories.sort_by(|left, right| left.category.cmp(&right.category));

    FinancialSummary {
        from: window.start,
        to: window.end,
        net: income_total - property_costs - org_costs,
        income: income_total,
        property_costs,
        org_costs,
        houses,
        expense_categories,
        automated_expense_count,
        manual_expense_count,
    }
}

fn is_excluded_income_status(status: &str) -> bool {
    let normalized = status.trim().to_ascii_lowercase();
    EXCLUDED_INCOME_STATUSES.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::summarize_window;
    use crate::records::{BillingTransactionRecord, ExpenseRecord};
    use crate::services::reference::ReferenceData;
    use crate::services::windows::DateWindow;

    fn window() -> DateWindow {
        DateWindow {
            start: "2026-08-06".parse().unwrap(),
            end: "2026-08-06".parse().unwrap(),
        }
    }

    fn reference() -> ReferenceData {
        let mut data = ReferenceData::default();
        data.house_labels
            .insert("h1".to_string(), "Banksia House".to_string());
        data.house_labels
            .insert("h2".to_string(), "Grevillea House".to_string());
        data.resident_house
            .insert("r1".to_string(), "h1".to_string());
        data.resident_ids = vec!["r1".to_string(), "r2".to_string()];
        data.total_bedrooms = 8;
        data.occupied_bedrooms = 6;
        data
    }

    fn transaction(resident: Option<&str>, amount: &str, status: &str) -> BillingTransactionRecord {
        serde_json::from_value(json!({
            "id": "t",
            "resident_id": resident,
            "amount": amount,
            "status": status,
        }))
        .unwrap()
    }

    fn expense(house: Option<&str>, amount: &str, scope: &str, status: &str) -> ExpenseRecord {
        serde_json::from_value(json!({
            "id": "e",
            "organisation_id": "o1",
            "house_id": house,
            "amount": amount,
            "scope": scope,
            "category": "utilities",
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn yesterday_scenario_nets_out() {
        let summary = summarize_window(
            window(),
            &[transaction(Some("r1"), "500", "paid")],
            &[
                expense(Some("h1"), "120", "property", "approved"),
                expense(None, "80", "organisation", "approved"),
            ],
            &reference(),
        );
        assert_eq!(summary.income, dec!(500));
        assert_eq!(summary.property_costs, dec!(120));
        assert_eq!(summary.org_costs, dec!(80));
        assert_eq!(summary.net, dec!(300));
        assert_eq!(summary.houses.len(), 1);
        assert_eq!(summary.houses[0].label, "Banksia House");
        assert_eq!(summary.houses[0].income, dec!(500));
        assert_eq!(summary.houses[0].expenses, dec!(120));
    }

    #[test]
    fn excluded_statuses_change_totals_by_exactly_their_amount() {
        let base = summarize_window(
            window(),
            &[
                transaction(Some("r1"), "500", "paid"),
                transaction(Some("r1"), "75.50", "pending"),
            ],
            &[],
            &reference(),
        );
        let with_excluded = summarize_window(
            window(),
            &[
                transaction(Some("r1"), "500", "paid"),
                transaction(Some("r1"), "75.50", "pending"),
                transaction(Some("r1"), "200", "rejected"),
                transaction(Some("r1"), "90", "cancelled"),
            ],
            &[],
            &reference(),
        );
        assert_eq!(base.income, dec!(575.50));
        assert_eq!(with_excluded.income, base.income);
    }

    #[test]
    fn cancelled_expenses_contribute_zero() {
        let summary = summarize_window(
            window(),
            &[],
            &[
                expense(Some("h1"), "120", "property", "approved"),
                expense(Some("h1"), "9999", "property", "cancelled"),
            ],
            &reference(),
        );
        assert_eq!(summary.property_costs, dec!(120));
    }

    #[test]
    fn organisation_scope_ignores_stray_house_references() {
        let summary = summarize_window(
            window(),
            &[],
            &[expense(Some("h1"), "80", "organisation", "approved")],
            &reference(),
        );
        assert_eq!(summary.org_costs, dec!(80));
        assert_eq!(summary.property_costs, dec!(0));
        assert!(summary.houses.is_empty());
    }

    #[test]
    fn unhoused_residents_count_toward_income_but_no_breakdown() {
        let summary = summarize_window(
            window(),
            &[transaction(Some("r2"), "150", "paid")],
            &[],
            &reference(),
        );
        assert_eq!(summary.income, dec!(150));
        assert!(summary.houses.is_empty());
    }

    #[test]
    fn batched_partial_results_sum_to_the_whole() {
        let reference = {
            let mut data = ReferenceData::default();
            data.resident_ids = (0..250).map(|index| format!("r{index}")).collect();
            data
        };
        let transactions: Vec<_> = (0..250)
            .map(|index| transaction(Some(&format!("r{index}")), "2", "paid"))
            .collect();

        let whole = summarize_window(window(), &transactions, &[], &reference);

        let mut merged = dec!(0);
        for batch in transactions.chunks(100) {
            merged += summarize_window(window(), batch, &[], &reference).income;
        }
        assert_eq!(whole.income, dec!(500));
        assert_eq!(merged, whole.income);
    }

    #[test]
    fn summaries_are_deterministic_across_runs() {
        let income = [
            transaction(Some("r1"), "500", "paid"),
            transaction(Some("r2"), "42.10", "paid"),
        ];
        let costs = [
            expense(Some("h1"), "120", "property", "approved"),
            expense(Some("h2"), "15", "property", "approved"),
            expense(None, "80", "organisation", "approved"),
        ];
        let first = summarize_window(window(), &income, &costs, &reference());
        let second = summarize_window(window(), &income, &costs, &reference());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        // Money crosses the transport boundary as decimal strings.
        assert!(serde_json::to_string(&first).unwrap().contains("\"542.10\""));
    }

    #[test]
    fn origin_tags_split_descriptive_counts() {
        let mut automated = expense(None, "10", "organisation", "approved");
        automated.origin = Some("automation".to_string());
        let manual = expense(None, "20", "organisation", "approved");

        let summary = summarize_window(window(), &[], &[automated, manual], &reference());
        assert_eq!(summary.automated_expense_count, 1);
        assert_eq!(summary.manual_expense_count, 1);
        assert_eq!(summary.expense_categories.len(), 1);
        assert_eq!(summary.expense_categories[0].total, dec!(30));
    }
}
