//! The snapshot shapes handed to the rendering/delivery collaborators.
//!
//! Everything is fully resolved and serializable: dates as calendar strings,
//! timestamps as RFC 3339, money as decimal strings. Nothing here lazily
//! references the data source.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// One organisation's daily brief: yesterday's results, the 7-day trend,
/// the forward outlook, risk alerts, claims, and the resolved recipients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBriefData {
    pub organisation_id: String,
    pub organisation_name: String,
    pub timezone: String,
    /// Today in the organisation's local calendar.
    pub report_date: NaiveDate,
    pub generated_at: String,
    pub yesterday: FinancialSummary,
    pub occupancy: OccupancySummary,
    pub trend: TrendSummary,
    pub outlook: OutlookSummary,
    pub risks: RiskSummary,
    pub claims: ClaimsSummary,
    /// Empty is valid — "nothing to send", not an error.
    pub recipients: Vec<String>,
}

/// Income and cost rollup over one inclusive local-calendar window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub income: Decimal,
    pub property_costs: Decimal,
    pub org_costs: Decimal,
    pub net: Decimal,
    /// Houses with no activity in the window are absent, not zero-padded.
    pub houses: Vec<HouseFinancial>,
    pub expense_categories: Vec<CategoryTotal>,
    pub automated_expense_count: i64,
    pub manual_expense_count: i64,
}

impl FinancialSummary {
    pub fn totals(&self) -> PeriodTotals {
        PeriodTotals {
            from: self.from,
            to: self.to,
            income: self.income,
            property_costs: self.property_costs,
            org_costs: self.org_costs,
            net: self.net,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseFinancial {
    pub house_id: String,
    pub label: String,
    pub income: Decimal,
    pub expenses: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancySummary {
    pub total_bedrooms: i64,
    pub occupied_bedrooms: i64,
    pub vacant_bedrooms: i64,
    /// Omitted (not zero) when the organisation has no active bedroom
    /// capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy_pct: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub income: Decimal,
    pub property_costs: Decimal,
    pub org_costs: Decimal,
    pub net: Decimal,
}

impl PeriodTotals {
    pub fn empty(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from,
            to,
            income: Decimal::ZERO,
            property_costs: Decimal::ZERO,
            org_costs: Decimal::ZERO,
            net: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub last_seven_days: PeriodTotals,
    pub prior_seven_days: PeriodTotals,
    pub change_amount: Decimal,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlookSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub expected_income: Decimal,
    pub expected_property_costs: Decimal,
    pub expected_org_costs: Decimal,
    pub projected_net: Decimal,
    /// First five scheduled items, chronological.
    pub upcoming: Vec<UpcomingItem>,
}

impl OutlookSummary {
    pub fn empty(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from,
            to,
            expected_income: Decimal::ZERO,
            expected_property_costs: Decimal::ZERO,
            expected_org_costs: Decimal::ZERO,
            projected_net: Decimal::ZERO,
            upcoming: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingItem {
    /// Organisation-local calendar date of the scheduled run.
    pub date: NaiveDate,
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<String>,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RiskSummary {
    pub expiring_contracts: Vec<ExpiringContractAlert>,
    pub failed_automation_runs: Vec<FailedRunAlert>,
    pub low_balance_contracts: Vec<LowBalanceAlert>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiringContractAlert {
    pub contract_id: String,
    pub resident_id: String,
    pub end_date: NaiveDate,
    pub days_remaining: i64,
    pub current_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRunAlert {
    pub run_id: String,
    pub automation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_name: Option<String>,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowBalanceAlert {
    pub contract_id: String,
    pub resident_id: String,
    pub original_amount: Decimal,
    pub current_balance: Decimal,
    pub percent_remaining: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClaimsSummary {
    pub draft_count: i64,
    pub draft_amount: Decimal,
    pub in_flight_count: i64,
    pub in_flight_amount: Decimal,
}
