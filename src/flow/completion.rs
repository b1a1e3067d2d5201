use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{BookingStatus, PaymentMethod};
use crate::models::settlement::SettlementEvent;
use crate::session::protocol::ServerFrame;
use crate::state::AppState;

/// Records cash collection for a cash-on-completion booking. Prepaid
/// bookings never need this step.
pub fn collect_payment(state: &AppState, booking_id: Uuid) -> Result<(), AppError> {
    let mut booking = state
        .bookings
        .get_mut(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    if booking.status != BookingStatus::Assigned {
        return Err(AppError::BadRequest("booking is not active".to_string()));
    }

    booking.payment_collected = true;
    info!(booking_id = %booking_id, "payment collected");
    Ok(())
}

/// Finalizes the booking: frees the barber for new dispatches and emits
/// the one settlement event the wallet collaborator consumes.
pub fn complete_service(
    state: &AppState,
    booking_id: Uuid,
    barber_id: Uuid,
) -> Result<(), AppError> {
    let booking = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        if booking.status != BookingStatus::Assigned {
            return Err(AppError::BadRequest("booking is not active".to_string()));
        }
        if booking.assigned_barber != Some(barber_id) {
            return Err(AppError::NotAssignedBarber);
        }
        if booking.payment_method == PaymentMethod::Cod && !booking.payment_collected {
            return Err(AppError::PaymentNotCollected);
        }

        booking.status = BookingStatus::Completed;
        booking.completed_at = Some(Utc::now());
        booking.clone()
    };

    if let Some((_, handshake)) = state.handshakes.remove(&booking_id) {
        if let Some(timer) = handshake.timer {
            timer.abort();
        }
    }

    state.presence.release(&barber_id);

    state.sessions.send_to(
        &barber_id,
        ServerFrame::ServiceCompleted {
            booking_id,
            message: "Service completed. Ready for new bookings!".to_string(),
        },
    );
    state.sessions.send_to(
        &booking.customer_id,
        ServerFrame::ServiceCompleted {
            booking_id,
            message: "Thank you for choosing Groomnet. Your service has been completed."
                .to_string(),
        },
    );

    let fee = booking.price * state.config.platform_fee_percent / 100;
    let event = SettlementEvent::payout(
        booking_id,
        booking.customer_id,
        barber_id,
        booking.price,
        fee,
    );
    let _ = state.settlement_tx.send(event);

    state
        .metrics
        .settlements_total
        .with_label_values(&["payout"])
        .inc();
    state
        .metrics
        .dispatches_total
        .with_label_values(&["completed"])
        .inc();

    info!(
        booking_id = %booking_id,
        barber_id = %barber_id,
        amount = booking.price,
        fee,
        "service completed; settlement emitted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::config::Config;
    use crate::models::barber::{BarberPresence, GeoPoint};
    use crate::models::booking::{Address, BookingRequest};
    use crate::models::settlement::SettlementKind;

    fn assigned_booking(payment_method: PaymentMethod) -> (Arc<AppState>, Uuid, Uuid) {
        let (state, _rx) = AppState::new(Config::for_tests());
        let state = Arc::new(state);

        let booking_id = Uuid::from_u128(1);
        let barber_id = Uuid::from_u128(2);

        state.presence.register(BarberPresence::new(
            barber_id,
            "test-barber".to_string(),
            GeoPoint {
                lat: 12.9716,
                lng: 77.5946,
            },
            10.0,
        ));
        state.presence.assign(&barber_id, booking_id);

        let booking = BookingRequest {
            id: booking_id,
            customer_id: Uuid::from_u128(3),
            customer_name: "test-customer".to_string(),
            service_id: Uuid::from_u128(4),
            service_name: "haircut".to_string(),
            price: 50_000,
            payment_method,
            pickup: Address {
                line: "12 MG Road".to_string(),
                point: GeoPoint {
                    lat: 12.9716,
                    lng: 77.5946,
                },
            },
            status: BookingStatus::Assigned,
            assigned_barber: Some(barber_id),
            payment_collected: payment_method == PaymentMethod::Prepaid,
            created_at: Utc::now(),
            completed_at: None,
        };
        state.bookings.insert(booking_id, booking);

        (state, booking_id, barber_id)
    }

    #[tokio::test]
    async fn cod_completion_requires_collected_payment() {
        let (state, booking_id, barber_id) = assigned_booking(PaymentMethod::Cod);

        assert!(matches!(
            complete_service(&state, booking_id, barber_id),
            Err(AppError::PaymentNotCollected)
        ));

        collect_payment(&state, booking_id).unwrap();
        complete_service(&state, booking_id, barber_id).unwrap();

        assert_eq!(
            state.bookings.get(&booking_id).unwrap().status,
            BookingStatus::Completed
        );
    }

    #[tokio::test]
    async fn completion_frees_the_barber_and_emits_one_payout() {
        let (state, booking_id, barber_id) = assigned_booking(PaymentMethod::Prepaid);
        let mut settlements = state.settlement_tx.subscribe();

        complete_service(&state, booking_id, barber_id).unwrap();

        assert!(state
            .presence
            .get(&barber_id)
            .unwrap()
            .active_booking
            .is_none());

        let payout = settlements.try_recv().unwrap();
        assert_eq!(payout.kind, SettlementKind::Payout);
        assert_eq!(payout.gross_amount, 50_000);
        assert_eq!(payout.platform_fee, 5_000);
        assert_eq!(payout.net_amount, 45_000);
        assert!(settlements.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_the_assigned_barber_may_complete() {
        let (state, booking_id, barber_id) = assigned_booking(PaymentMethod::Prepaid);

        assert!(matches!(
            complete_service(&state, booking_id, Uuid::from_u128(99)),
            Err(AppError::NotAssignedBarber)
        ));

        complete_service(&state, booking_id, barber_id).unwrap();

        // Completion is terminal; a repeat call finds the booking closed.
        assert!(matches!(
            complete_service(&state, booking_id, barber_id),
            Err(AppError::BadRequest(_))
        ));
    }
}
