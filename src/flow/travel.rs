use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::BookingStatus;
use crate::models::handshake::ConfirmationHandshake;
use crate::models::travel::TravelStage;
use crate::session::protocol::ServerFrame;
use crate::state::AppState;

/// Advances the customer-visible travel progress. Only the assigned
/// barber may advance, and only to the immediate next stage; the progress
/// bar stays monotonic and gapless.
pub fn advance(
    state: &AppState,
    booking_id: Uuid,
    barber_id: Uuid,
    next: TravelStage,
) -> Result<TravelStage, AppError> {
    let customer_id = {
        let booking = state
            .bookings
            .get(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        if booking.status != BookingStatus::Assigned {
            return Err(AppError::BadRequest("booking is not active".to_string()));
        }
        if booking.assigned_barber != Some(barber_id) {
            return Err(AppError::NotAssignedBarber);
        }
        booking.customer_id
    };

    {
        let mut progress = state
            .travel
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("no travel progress for {booking_id}")))?;

        let expected = progress.stage.next().ok_or(AppError::NotSequential)?;
        if next != expected {
            warn!(
                booking_id = %booking_id,
                current = ?progress.stage,
                requested = ?next,
                "rejected out-of-sequence travel update"
            );
            return Err(AppError::NotSequential);
        }

        progress.stage = next;
        progress.updated_at = Utc::now();
    }

    state.sessions.send_to(
        &customer_id,
        ServerFrame::TravelUpdate {
            booking_id,
            travel_status: next,
        },
    );

    // Arrival is the sole trigger that opens the confirmation handshake.
    if next == TravelStage::Arrived {
        state
            .handshakes
            .entry(booking_id)
            .or_insert_with(|| ConfirmationHandshake::new(booking_id));
    }

    info!(booking_id = %booking_id, stage = ?next, "travel progress advanced");
    Ok(next)
}

/// Polling fallback for stale or disconnected customer sessions; push via
/// `travel_update` frames is the primary path.
pub fn current_stage(state: &AppState, booking_id: Uuid) -> Result<TravelStage, AppError> {
    state
        .travel
        .get(&booking_id)
        .map(|progress| progress.stage)
        .ok_or_else(|| AppError::NotFound(format!("no travel progress for {booking_id}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::config::Config;
    use crate::models::booking::{Address, BookingRequest, PaymentMethod};
    use crate::models::travel::TravelProgress;
    use crate::state::AppState;

    fn assigned_booking() -> (Arc<AppState>, Uuid, Uuid) {
        let (state, _rx) = AppState::new(Config::for_tests());
        let state = Arc::new(state);

        let booking_id = Uuid::from_u128(1);
        let barber_id = Uuid::from_u128(2);
        let booking = BookingRequest {
            id: booking_id,
            customer_id: Uuid::from_u128(3),
            customer_name: "test-customer".to_string(),
            service_id: Uuid::from_u128(4),
            service_name: "haircut".to_string(),
            price: 50_000,
            payment_method: PaymentMethod::Prepaid,
            pickup: Address {
                line: "12 MG Road".to_string(),
                point: crate::models::barber::GeoPoint {
                    lat: 12.9716,
                    lng: 77.5946,
                },
            },
            status: BookingStatus::Assigned,
            assigned_barber: Some(barber_id),
            payment_collected: true,
            created_at: chrono::Utc::now(),
            completed_at: None,
        };
        state.bookings.insert(booking_id, booking);
        state.travel.insert(booking_id, TravelProgress::new(booking_id));

        (state, booking_id, barber_id)
    }

    #[tokio::test]
    async fn advances_only_to_the_immediate_successor() {
        let (state, booking_id, barber_id) = assigned_booking();

        assert!(matches!(
            advance(&state, booking_id, barber_id, TravelStage::Arrived),
            Err(AppError::NotSequential)
        ));

        advance(&state, booking_id, barber_id, TravelStage::Started).unwrap();

        // From STARTED, only ON_THE_WAY is acceptable.
        assert!(matches!(
            advance(&state, booking_id, barber_id, TravelStage::Arrived),
            Err(AppError::NotSequential)
        ));
        assert!(matches!(
            advance(&state, booking_id, barber_id, TravelStage::NotStarted),
            Err(AppError::NotSequential)
        ));

        advance(&state, booking_id, barber_id, TravelStage::OnTheWay).unwrap();
        advance(&state, booking_id, barber_id, TravelStage::AlmostNear).unwrap();
        advance(&state, booking_id, barber_id, TravelStage::Arrived).unwrap();

        // No stage follows ARRIVED.
        assert!(matches!(
            advance(&state, booking_id, barber_id, TravelStage::Arrived),
            Err(AppError::NotSequential)
        ));
        assert_eq!(current_stage(&state, booking_id).unwrap(), TravelStage::Arrived);
    }

    #[tokio::test]
    async fn only_the_assigned_barber_may_advance() {
        let (state, booking_id, _barber_id) = assigned_booking();

        assert!(matches!(
            advance(&state, booking_id, Uuid::from_u128(99), TravelStage::Started),
            Err(AppError::NotAssignedBarber)
        ));
        assert_eq!(
            current_stage(&state, booking_id).unwrap(),
            TravelStage::NotStarted
        );
    }

    #[tokio::test]
    async fn arrival_opens_the_confirmation_handshake() {
        let (state, booking_id, barber_id) = assigned_booking();

        for stage in [
            TravelStage::Started,
            TravelStage::OnTheWay,
            TravelStage::AlmostNear,
        ] {
            advance(&state, booking_id, barber_id, stage).unwrap();
            assert!(!state.handshakes.contains_key(&booking_id));
        }

        advance(&state, booking_id, barber_id, TravelStage::Arrived).unwrap();
        assert!(state.handshakes.contains_key(&booking_id));
    }

    #[tokio::test]
    async fn progress_is_frozen_once_the_booking_closes() {
        let (state, booking_id, barber_id) = assigned_booking();
        advance(&state, booking_id, barber_id, TravelStage::Started).unwrap();

        state.bookings.get_mut(&booking_id).unwrap().status = BookingStatus::Cancelled;

        assert!(matches!(
            advance(&state, booking_id, barber_id, TravelStage::OnTheWay),
            Err(AppError::BadRequest(_))
        ));
    }
}
