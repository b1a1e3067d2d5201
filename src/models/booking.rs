use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::barber::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Assigned,
    Expired,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Prepaid,
    Cod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub line: String,
    pub point: GeoPoint,
}

/// One instant-booking request. Mutated only by the dispatch coordinator
/// and the completion trigger; archived, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub service_id: Uuid,
    pub service_name: String,
    /// Price in minor currency units.
    pub price: i64,
    pub payment_method: PaymentMethod,
    pub pickup: Address,
    pub status: BookingStatus,
    pub assigned_barber: Option<Uuid>,
    pub payment_collected: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
