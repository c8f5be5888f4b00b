//! Bed capacity vs. active occupancy, derived purely from reference data.

use crate::schemas::OccupancySummary;
use crate::services::reference::ReferenceData;

pub fn summarize(reference: &ReferenceData) -> OccupancySummary {
    let total = reference.total_bedrooms.max(0);
    let occupied = reference.occupied_bedrooms.max(0);
    OccupancySummary {
        total_bedrooms: total,
        occupied_bedrooms: occupied,
        // Stale data can leave more housed residents than beds; never
        // report negative vacancy.
        vacant_bedrooms: (total - occupied).max(0),
        occupancy_pct: (total > 0)
            .then(|| ((occupied as f64 / total as f64) * 100.0).round() as i64),
    }
}
