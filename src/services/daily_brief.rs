//! The brief engine entry point: resolve the organisation, fan the section
//! queries out, join, and compose the snapshot.
//!
//! Fan-out shape: organisation and reference data load first (everything
//! else depends on the resident list and house labels), then yesterday's
//! financials, the trend, the outlook, the risk scans, claims, and the
//! recipient list all run concurrently. Only yesterday's financials are
//! critical — every other section degrades to an empty result on failure.

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::info;

use crate::config::BriefConfig;
use crate::error::{AppError, AppResult};
use crate::records::{decode_row, decode_rows, AdminUserRecord, OrganisationRecord};
use crate::repository::table_service::{get_row, list_rows};
use crate::schemas::{ClaimsSummary, DailyBriefData, OutlookSummary};
use crate::services::windows::BriefWindows;
use crate::services::{claims, finance, occupancy, outlook, reference, risk, soft_section, trend};

pub async fn generate_daily_brief(
    pool: &PgPool,
    org_id: &str,
    config: &BriefConfig,
) -> AppResult<DailyBriefData> {
    let now = Utc::now();

    let organisation = fetch_organisation(pool, org_id).await?;
    let timezone = resolve_timezone(&organisation, config);
    let windows = BriefWindows::resolve(&timezone, now, config.lookback_days, config.forward_days);

    let reference_data = reference::load_reference_data(pool, org_id).await?;
    let occupancy = occupancy::summarize(&reference_data);
    let scan_timeout = config.scan_timeout();

    let (yesterday, trend_summary, outlook_summary, risks, claims_summary, recipients) = tokio::join!(
        finance::aggregate_window(pool, org_id, &reference_data, windows.yesterday(), windows.tz()),
        soft_section(
            "trend",
            scan_timeout,
            trend::analyze_trend(pool, org_id, &reference_data, &windows),
            trend::empty_trend(&windows),
        ),
        soft_section(
            "outlook",
            scan_timeout,
            outlook::project_outlook(pool, org_id, &reference_data, &windows),
            OutlookSummary::empty(windows.today, windows.future_end),
        ),
        risk::detect_risks(pool, org_id, &reference_data, &windows, now, scan_timeout),
        soft_section(
            "claims",
            scan_timeout,
            claims::summarize_claims(pool, org_id),
            ClaimsSummary::default(),
        ),
        resolve_recipients(pool, org_id, config),
    );
    // Yesterday's numbers are the report; a partial summary is never sent.
    let yesterday = yesterday?;

    info!(
        org_id,
        report_date = %windows.today,
        net = %yesterday.net,
        recipients = recipients.len(),
        "daily brief assembled"
    );

    Ok(DailyBriefData {
        organisation_id: org_id.to_string(),
        organisation_name: organisation.name,
        timezone,
        report_date: windows.today,
        generated_at: now.to_rfc3339(),
        yesterday,
        occupancy,
        trend: trend_summary,
        outlook: outlook_summary,
        risks,
        claims: claims_summary,
        recipients,
    })
}

async fn fetch_organisation(pool: &PgPool, org_id: &str) -> AppResult<OrganisationRecord> {
    let row = get_row(pool, "organisations", org_id, "id").await?;
    decode_row("organisations", row)
        .ok_or_else(|| AppError::Internal("Organisation record could not be decoded.".to_string()))
}

/// The organisation's own timezone wins; the config value is the fallback
/// for organisations that never set one.
fn resolve_timezone(organisation: &OrganisationRecord, config: &BriefConfig) -> String {
    organisation
        .timezone
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| config.timezone.clone())
}

/// Explicit override used verbatim minus blank entries; otherwise active
/// admin users. Zero recipients is a valid "nothing to send" outcome.
async fn resolve_recipients(pool: &PgPool, org_id: &str, config: &BriefConfig) -> Vec<String> {
    if let Some(explicit) = &config.recipient_override {
        return filter_recipients(explicit);
    }
    soft_section(
        "recipients",
        config.scan_timeout(),
        fetch_admin_recipients(pool, org_id),
        Vec::new(),
    )
    .await
}

async fn fetch_admin_recipients(pool: &PgPool, org_id: &str) -> AppResult<Vec<String>> {
    let mut filters = Map::new();
    filters.insert(
        "organisation_id".to_string(),
        Value::String(org_id.to_string()),
    );
    filters.insert("role".to_string(), Value::String("admin".to_string()));
    filters.insert("is_active".to_string(), Value::Bool(true));

    let rows = list_rows(pool, "admin_users", Some(&filters), 1_000, 0, "email", true).await?;
    let admins: Vec<AdminUserRecord> = decode_rows("admin_users", rows);

    let mut emails: Vec<String> = admins
        .into_iter()
        .filter_map(|admin| admin.email)
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .collect();
    emails.sort_unstable();
    emails.dedup();
    Ok(emails)
}

fn filter_recipients(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}
