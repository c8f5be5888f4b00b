//! Calendar boundaries for one brief run, resolved in the organisation's
//! local timezone.
//!
//! Every downstream timestamp comparison goes through these boundaries, so
//! "yesterday" always means the organisation's local yesterday no matter
//! where the job itself runs. Two organisations in different timezones never
//! share boundary values.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// An inclusive local-calendar day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Half-open UTC instants covering the window: local midnight of the
    /// first day up to (exclusive) local midnight of the day after the last.
    pub fn utc_bounds(&self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            local_midnight_utc(tz, self.start),
            local_midnight_utc(tz, self.end + Duration::days(1)),
        )
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BriefWindows {
    pub today: NaiveDate,
    pub yesterday_start: NaiveDate,
    pub yesterday_end: NaiveDate,
    pub seven_days_ago: NaiveDate,
    pub fourteen_days_ago: NaiveDate,
    pub future_end: NaiveDate,
    tz: Tz,
}

impl BriefWindows {
    pub fn resolve(timezone: &str, now: DateTime<Utc>, lookback_days: i64, forward_days: i64) -> Self {
        let tz = timezone
            .trim()
            .parse::<Tz>()
            .unwrap_or(chrono_tz::Australia::Sydney);
        let today = now.with_timezone(&tz).date_naive();
        Self {
            today,
            yesterday_start: today - Duration::days(lookback_days.max(1)),
            yesterday_end: today - Duration::days(1),
            seven_days_ago: today - Duration::days(7),
            fourteen_days_ago: today - Duration::days(14),
            future_end: today + Duration::days(forward_days.max(0)),
            tz,
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn yesterday(&self) -> DateWindow {
        DateWindow {
            start: self.yesterday_start,
            end: self.yesterday_end,
        }
    }

    pub fn last_seven(&self) -> DateWindow {
        DateWindow {
            start: self.seven_days_ago,
            end: self.yesterday_end,
        }
    }

    /// Adjacent to [`Self::last_seven`]: ends the day before its start, so
    /// the two windows never overlap.
    pub fn prior_seven(&self) -> DateWindow {
        DateWindow {
            start: self.fourteen_days_ago,
            end: self.seven_days_ago - Duration::days(1),
        }
    }

    pub fn outlook(&self) -> DateWindow {
        DateWindow {
            start: self.today,
            end: self.future_end,
        }
    }
}

/// Local midnight of `date` as a UTC instant. On the rare day where a DST
/// transition removes midnight, the first existing hour is used.
pub fn local_midnight_utc(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    for hour in 0..=3 {
        if let Some(local) = tz
            .with_ymd_and_hms(date.year(), date.month(), date.day(), hour, 0, 0)
            .earliest()
        {
            return local.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}
