//! Week-over-week trend: the aggregator run over two adjacent 7-day
//! windows, with the delta classified against a ±50 deadband so noise is
//! not reported as a reversal.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::schemas::{PeriodTotals, TrendDirection, TrendSummary};
use crate::services::reference::ReferenceData;
use crate::services::windows::BriefWindows;
use crate::services::finance;

const TREND_DEADBAND: Decimal = dec!(50);

pub async fn analyze_trend(
    pool: &PgPool,
    org_id: &str,
    reference: &ReferenceData,
    windows: &BriefWindows,
) -> AppResult<TrendSummary> {
    let (last, prior) = tokio::try_join!(
        finance::aggregate_window(pool, org_id, reference, windows.last_seven(), windows.tz()),
        finance::aggregate_window(pool, org_id, reference, windows.prior_seven(), windows.tz()),
    )?;
    Ok(build_trend(last.totals(), prior.totals()))
}

pub fn build_trend(last: PeriodTotals, prior: PeriodTotals) -> TrendSummary {
    let change_amount = last.net - prior.net;
    TrendSummary {
        direction: classify_direction(change_amount),
        change_amount,
        last_seven_days: last,
        prior_seven_days: prior,
    }
}

/// `up`/`down` only outside the ±50 deadband; the boundaries themselves are
/// flat.
pub fn classify_direction(change_amount: Decimal) -> TrendDirection {
    if change_amount > TREND_DEADBAND {
        TrendDirection::Up
    } else if change_amount < -TREND_DEADBAND {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    }
}

/// Fallback when either window's aggregation fails: zeroed totals, flat
/// direction, real window dates.
pub fn empty_trend(windows: &BriefWindows) -> TrendSummary {
    let last = windows.last_seven();
    let prior = windows.prior_seven();
    build_trend(
        PeriodTotals::empty(last.start, last.end),
        PeriodTotals::empty(prior.start, prior.end),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::{build_trend, classify_direction, empty_trend};
    use crate::schemas::{PeriodTotals, TrendDirection};
    use crate::services::windows::BriefWindows;

    #[test]
    fn deadband_boundaries_are_exclusive() {
        assert_eq!(classify_direction(dec!(51)), TrendDirection::Up);
        assert_eq!(classify_direction(dec!(50)), TrendDirection::Flat);
        assert_eq!(classify_direction(dec!(0)), TrendDirection::Flat);
        assert_eq!(classify_direction(dec!(-50)), TrendDirection::Flat);
        assert_eq!(classify_direction(dec!(-51)), TrendDirection::Down);
    }

    #[test]
    fn change_amount_is_last_minus_prior_net() {
        let last = PeriodTotals {
            net: dec!(900),
            income: dec!(1000),
            property_costs: dec!(60),
            org_costs: dec!(40),
            from: "2026-07-30".parse().unwrap(),
            to: "2026-08-05".parse().unwrap(),
        };
        let prior = PeriodTotals {
            net: dec!(700),
            income: dec!(800),
            property_costs: dec!(60),
            org_costs: dec!(40),
            from: "2026-07-23".parse().unwrap(),
            to: "2026-07-29".parse().unwrap(),
        };
        let trend = build_trend(last, prior);
        assert_eq!(trend.change_amount, dec!(200));
        assert_eq!(trend.direction, TrendDirection::Up);
    }

    #[test]
    fn degraded_trend_is_flat_with_real_dates() {
        let windows = BriefWindows::resolve(
            "Australia/Sydney",
            "2026-08-06T16:00:00Z".parse().unwrap(),
            1,
            7,
        );
        let trend = empty_trend(&windows);
        assert_eq!(trend.direction, TrendDirection::Flat);
        assert_eq!(trend.change_amount, dec!(0));
        assert_eq!(trend.last_seven_days.from, windows.seven_days_ago);
    }
}
