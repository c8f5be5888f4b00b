use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AppResult;

pub mod claims;
pub mod contracts;
pub mod daily_brief;
pub mod finance;
pub mod occupancy;
pub mod outlook;
pub mod reference;
pub mod risk;
pub mod trend;
pub mod windows;

/// Run a non-critical section under a time bound. Errors and timeouts
/// degrade to the fallback with a warning; they never abort the brief.
pub(crate) async fn soft_section<T, F>(
    section: &'static str,
    limit: Duration,
    future: F,
    fallback: T,
) -> T
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            warn!(section, %error, "brief section degraded to its empty result");
            fallback
        }
        Err(_) => {
            warn!(section, timeout_secs = limit.as_secs(), "brief section timed out");
            fallback
        }
    }
}
