use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    /// Service completed; net amount owed to the barber.
    Payout,
    /// Booking expired or was cancelled; amount owed back to the customer.
    Refund,
}

/// The single money-movement signal this subsystem emits. The wallet
/// collaborator is its only consumer; ledger mechanics live there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub barber_id: Option<Uuid>,
    pub kind: SettlementKind,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub fine: i64,
    pub net_amount: i64,
    pub emitted_at: DateTime<Utc>,
}

impl SettlementEvent {
    pub fn payout(
        booking_id: Uuid,
        customer_id: Uuid,
        barber_id: Uuid,
        gross: i64,
        fee: i64,
    ) -> Self {
        Self {
            booking_id,
            customer_id,
            barber_id: Some(barber_id),
            kind: SettlementKind::Payout,
            gross_amount: gross,
            platform_fee: fee,
            fine: 0,
            net_amount: gross - fee,
            emitted_at: Utc::now(),
        }
    }

    pub fn refund(booking_id: Uuid, customer_id: Uuid, gross: i64, fine: i64) -> Self {
        Self {
            booking_id,
            customer_id,
            barber_id: None,
            kind: SettlementKind::Refund,
            gross_amount: gross,
            platform_fee: 0,
            fine,
            net_amount: gross - fine,
            emitted_at: Utc::now(),
        }
    }
}
