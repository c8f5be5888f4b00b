//! Daily operational brief engine for the Wattle residential-care platform.
//!
//! One call per organisation per scheduled period: pull yesterday's billing
//! and expenses, the 7-day trend, the forward outlook from scheduled
//! automations, risk alerts, and claims, and reduce them into a single
//! serializable [`DailyBriefData`] snapshot for the (external) rendering and
//! delivery layers. All reads, no writes; safe to retry.

pub mod config;
pub mod error;
pub mod money;
pub mod records;
pub mod repository;
pub mod schemas;
pub mod services;

pub use config::BriefConfig;
pub use error::{AppError, AppResult};
pub use schemas::DailyBriefData;
pub use services::daily_brief::generate_daily_brief;
