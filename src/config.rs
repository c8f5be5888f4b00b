use std::env;
use std::time::Duration;

/// Platform-wide fallback when neither the organisation record nor the
/// caller supplies a usable IANA timezone.
pub const DEFAULT_ORG_TIMEZONE: &str = "Australia/Sydney";

/// Configuration for one brief run, passed explicitly to
/// [`generate_daily_brief`](crate::services::daily_brief::generate_daily_brief).
///
/// The organisation record's own timezone takes precedence over `timezone`;
/// the field is the fallback for organisations that never set one.
#[derive(Debug, Clone)]
pub struct BriefConfig {
    pub timezone: String,
    pub lookback_days: i64,
    pub forward_days: i64,
    /// When set, used verbatim (minus blank entries) instead of querying
    /// active admin users.
    pub recipient_override: Option<Vec<String>>,
    /// Upper bound for each non-critical section (trend, outlook, each risk
    /// scan, claims, recipient lookup). A section that exceeds it degrades
    /// to an empty result.
    pub scan_timeout_seconds: u64,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_ORG_TIMEZONE.to_string(),
            lookback_days: 1,
            forward_days: 7,
            recipient_override: None,
            scan_timeout_seconds: 10,
        }
    }
}

impl BriefConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timezone: env_or("BRIEF_TIMEZONE", DEFAULT_ORG_TIMEZONE),
            lookback_days: env_parse_or("BRIEF_LOOKBACK_DAYS", defaults.lookback_days),
            forward_days: env_parse_or("BRIEF_FORWARD_DAYS", defaults.forward_days),
            recipient_override: env_opt("BRIEF_RECIPIENT_OVERRIDE")
                .map(|raw| parse_csv(&raw))
                .filter(|entries| !entries.is_empty()),
            scan_timeout_seconds: env_parse_or(
                "BRIEF_SCAN_TIMEOUT_SECONDS",
                defaults.scan_timeout_seconds,
            ),
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_seconds.max(1))
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
