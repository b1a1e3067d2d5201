use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeState {
    AwaitingBarberArrival,
    AwaitingCustomerResponse,
    Ready,
    WaitRequested,
}

/// Short-lived negotiation between barber and customer once travel hits
/// ARRIVED. At most one per booking; removed once the booking closes.
#[derive(Debug)]
pub struct ConfirmationHandshake {
    pub booking_id: Uuid,
    pub state: HandshakeState,
    pub deadline_at: Option<DateTime<Utc>>,
    /// Response/grace timer; aborted when the handshake resolves.
    pub timer: Option<AbortHandle>,
}

impl ConfirmationHandshake {
    pub fn new(booking_id: Uuid) -> Self {
        Self {
            booking_id,
            state: HandshakeState::AwaitingBarberArrival,
            deadline_at: None,
            timer: None,
        }
    }
}
