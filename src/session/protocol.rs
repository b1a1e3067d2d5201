use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::travel::TravelStage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Barber,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeAction {
    Ready,
    Wait,
}

/// Inbound frame wrapper. `seq` increases per session; the server drops
/// any frame whose seq it has already applied, since the transport does
/// not guarantee exactly-once delivery across reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub seq: u64,
    #[serde(flatten)]
    pub frame: ClientFrame,
}

/// Frames a client may send. One frame = one JSON object with a `type`
/// discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Heartbeat,
    ToggleOnline {
        is_online: bool,
    },
    AcceptBooking {
        booking_id: Uuid,
    },
    RejectBooking {
        booking_id: Uuid,
    },
    TravelUpdate {
        booking_id: Uuid,
        next_state: TravelStage,
    },
    ServiceResponse {
        booking_id: Uuid,
        action: HandshakeAction,
    },
}

/// Frames the coordinator pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    HeartbeatResponse {
        timestamp: DateTime<Utc>,
    },
    NewBookingRequest {
        booking_id: Uuid,
        customer_id: Uuid,
        customer_name: String,
        service: String,
        address: String,
        total_amount: i64,
    },
    RemoveBooking {
        booking_id: Uuid,
        message: String,
    },
    BookingConfirmed {
        booking_id: Uuid,
        barber_id: Uuid,
        message: String,
    },
    OnlineStatusUpdated {
        is_online: bool,
    },
    NoBarbersAvailable {
        booking_id: Uuid,
        message: String,
    },
    TravelUpdate {
        booking_id: Uuid,
        travel_status: TravelStage,
    },
    ServiceRequest {
        booking_id: Uuid,
    },
    ServiceResponse {
        booking_id: Uuid,
        action: HandshakeAction,
    },
    BookingCancelled {
        booking_id: Uuid,
        message: String,
    },
    ServiceCompleted {
        booking_id: Uuid,
        message: String,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_carry_type_discriminator() {
        let raw = r#"{"seq":3,"type":"accept_booking","booking_id":"00000000-0000-0000-0000-000000000001"}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.seq, 3);
        assert!(matches!(envelope.frame, ClientFrame::AcceptBooking { .. }));
    }

    #[test]
    fn travel_update_uses_wire_stage_names() {
        let raw = r#"{"seq":9,"type":"travel_update","booking_id":"00000000-0000-0000-0000-000000000001","next_state":"ON_THE_WAY"}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        match envelope.frame {
            ClientFrame::TravelUpdate { next_state, .. } => {
                assert_eq!(next_state, TravelStage::OnTheWay)
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn server_frames_round_trip() {
        let frame = ServerFrame::RemoveBooking {
            booking_id: Uuid::from_u128(7),
            message: "This booking was accepted by another barber.".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"remove_booking\""));
        let parsed: ServerFrame = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ServerFrame::RemoveBooking { .. }));
    }
}
