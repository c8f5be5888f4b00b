//! Organisation reference data: houses, residents, and the lookups every
//! other brief section depends on.

use std::collections::HashMap;

use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::records::{decode_rows, HouseRecord, ResidentRecord};
use crate::repository::table_service::list_rows;

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// house id → display label, for every house regardless of status.
    pub house_labels: HashMap<String, String>,
    /// resident id → house id, for residents with a house reference.
    pub resident_house: HashMap<String, String>,
    /// Every resident id, sorted — the join key for income batching.
    pub resident_ids: Vec<String>,
    /// Bedroom capacity across active houses only.
    pub total_bedrooms: i64,
    /// Active residents with a house reference.
    pub occupied_bedrooms: i64,
}

impl ReferenceData {
    pub fn house_label(&self, house_id: &str) -> Option<String> {
        self.house_labels.get(house_id).cloned()
    }
}

/// Load houses and residents concurrently and derive the lookups.
///
/// Empty result sets are fine (everything downstream reads as zero); a
/// failing query is critical and aborts the run.
pub async fn load_reference_data(pool: &PgPool, org_id: &str) -> AppResult<ReferenceData> {
    let filters = org_filter(org_id);
    let (house_rows, resident_rows) = tokio::try_join!(
        list_rows(pool, "houses", Some(&filters), 5_000, 0, "id", true),
        list_rows(pool, "residents", Some(&filters), 10_000, 0, "id", true),
    )?;

    let houses: Vec<HouseRecord> = decode_rows("houses", house_rows);
    let residents: Vec<ResidentRecord> = decode_rows("residents", resident_rows);
    Ok(build_reference(houses, residents))
}

fn build_reference(houses: Vec<HouseRecord>, residents: Vec<ResidentRecord>) -> ReferenceData {
    let mut data = ReferenceData::default();

    for house in &houses {
        if house.id.is_empty() {
            continue;
        }
        data.house_labels.insert(house.id.clone(), house.label());
        if house.is_active() {
            data.total_bedrooms += house.bedroom_count.unwrap_or(0).max(0);
        }
    }

    for resident in &residents {
        if resident.id.is_empty() {
            continue;
        }
        data.resident_ids.push(resident.id.clone());
        if let Some(house_id) = resident
            .house_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            data.resident_house
                .insert(resident.id.clone(), house_id.to_string());
            if resident.is_active() {
                data.occupied_bedrooms += 1;
            }
        }
    }

    data.resident_ids.sort_unstable();
    data
}

fn org_filter(org_id: &str) -> Map<String, Value> {
    let mut filters = Map::new();
    filters.insert(
        "organisation_id".to_string(),
        Value::String(org_id.to_string()),
    );
    filters
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::build_reference;
    use crate::records::{HouseRecord, ResidentRecord};

    fn house(id: &str, bedrooms: i64, status: &str) -> HouseRecord {
        serde_json::from_value(json!({
            "id": id,
            "descriptor": format!("House {id}"),
            "bedroom_count": bedrooms,
            "status": status,
        }))
        .unwrap()
    }

    fn resident(id: &str, house_id: Option<&str>, status: &str) -> ResidentRecord {
        serde_json::from_value(json!({
            "id": id,
            "house_id": house_id,
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn capacity_counts_active_houses_only() {
        let data = build_reference(
            vec![
                house("h1", 5, "active"),
                house("h2", 3, "active"),
                house("h3", 4, "draft"),
                house("h4", 2, "deactivated"),
            ],
            vec![],
        );
        assert_eq!(data.total_bedrooms, 8);
        // Labels exist even for inactive houses so breakdowns can name them.
        assert_eq!(data.house_labels.len(), 4);
    }

    #[test]
    fn occupancy_counts_active_residents_with_a_house() {
        let data = build_reference(
            vec![house("h1", 5, "active")],
            vec![
                resident("r1", Some("h1"), "active"),
                resident("r2", Some("h1"), "active"),
                resident("r3", None, "active"),
                resident("r4", Some("h1"), "exited"),
            ],
        );
        assert_eq!(data.occupied_bedrooms, 2);
        // Every resident stays a billing join key, housed or not.
        assert_eq!(data.resident_ids.len(), 4);
        assert_eq!(data.resident_house.len(), 3);
    }

    #[test]
    fn empty_reference_reads_as_zero() {
        let data = build_reference(vec![], vec![]);
        assert_eq!(data.total_bedrooms, 0);
        assert_eq!(data.occupied_bedrooms, 0);
        assert!(data.resident_ids.is_empty());
    }
}
