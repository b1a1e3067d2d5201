use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Availability record for one barber. The `active_booking` field is the
/// single source of truth for whether the barber can take new work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarberPresence {
    pub barber_id: Uuid,
    pub name: String,
    pub online: bool,
    pub location: GeoPoint,
    pub radius_km: f64,
    pub active_booking: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl BarberPresence {
    pub fn new(barber_id: Uuid, name: String, location: GeoPoint, radius_km: f64) -> Self {
        Self {
            barber_id,
            name,
            online: false,
            location,
            radius_km,
            active_booking: None,
            updated_at: Utc::now(),
        }
    }
}
