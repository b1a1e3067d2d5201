use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::BookingStatus;
use crate::models::handshake::HandshakeState;
use crate::session::protocol::{HandshakeAction, ServerFrame};
use crate::state::AppState;

/// The barber reports arrival: the customer is prompted with a
/// `service_request` and a response deadline starts. If the deadline
/// elapses with no response, the handshake auto-proceeds to READY.
pub fn notify_arrived(
    state: &Arc<AppState>,
    booking_id: Uuid,
    barber_id: Uuid,
) -> Result<(), AppError> {
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

    let window = state.config.handshake_window;
    {
        let mut handshake = state
            .handshakes
            .get_mut(&booking_id)
            .ok_or(AppError::NotAwaitingResponse)?;

        if handshake.state != HandshakeState::AwaitingBarberArrival {
            return Err(AppError::NotAwaitingResponse);
        }

        handshake.state = HandshakeState::AwaitingCustomerResponse;
        handshake.deadline_at =
            Some(Utc::now() + ChronoDuration::seconds(window.as_secs() as i64));
    }

    state
        .sessions
        .send_to(&customer_id, ServerFrame::ServiceRequest { booking_id });

    arm_timer(
        state,
        booking_id,
        window,
        HandshakeState::AwaitingCustomerResponse,
    );

    info!(booking_id = %booking_id, "arrival reported; awaiting customer response");
    Ok(())
}

/// Customer response to the arrival prompt. `ready` releases the barber
/// to start; `wait` buys the customer a grace period, after which the
/// handshake auto-proceeds to READY.
pub fn respond(
    state: &Arc<AppState>,
    booking_id: Uuid,
    customer_id: Uuid,
    action: HandshakeAction,
) -> Result<HandshakeState, AppError> {
    let barber_id = {
        let booking = state
            .bookings
            .get(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        if booking.status != BookingStatus::Assigned || booking.customer_id != customer_id {
            return Err(AppError::NotAwaitingResponse);
        }
        booking
            .assigned_barber
            .ok_or_else(|| AppError::Internal("assigned booking without barber".to_string()))?
    };

    let grace = state.config.wait_grace;
    let (new_state, timer) = {
        let mut handshake = state
            .handshakes
            .get_mut(&booking_id)
            .ok_or(AppError::NotAwaitingResponse)?;

        if handshake.state != HandshakeState::AwaitingCustomerResponse {
            return Err(AppError::NotAwaitingResponse);
        }

        let new_state = match action {
            HandshakeAction::Ready => HandshakeState::Ready,
            HandshakeAction::Wait => HandshakeState::WaitRequested,
        };
        handshake.state = new_state;
        handshake.deadline_at = match new_state {
            HandshakeState::WaitRequested => {
                Some(Utc::now() + ChronoDuration::seconds(grace.as_secs() as i64))
            }
            _ => None,
        };
        (new_state, handshake.timer.take())
    };

    if let Some(timer) = timer {
        timer.abort();
    }

    state.sessions.send_to(
        &barber_id,
        ServerFrame::ServiceResponse { booking_id, action },
    );

    if new_state == HandshakeState::WaitRequested {
        arm_timer(state, booking_id, grace, HandshakeState::WaitRequested);
    }

    info!(booking_id = %booking_id, response = ?action, "customer responded to arrival");
    Ok(new_state)
}

/// Arms the deadline for the given handshake phase. The timer is aborted
/// the moment the handshake resolves, so it can never fire on a state
/// that has already moved on.
fn arm_timer(
    state: &Arc<AppState>,
    booking_id: Uuid,
    window: std::time::Duration,
    expected: HandshakeState,
) {
    let timer_state = state.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(window).await;
        if auto_ready(&timer_state, booking_id, expected) {
            info!(booking_id = %booking_id, from = ?expected, "handshake auto-proceeded to ready");
        }
    });

    match state.handshakes.get_mut(&booking_id) {
        Some(mut handshake) if handshake.state == expected => {
            handshake.timer = Some(timer.abort_handle());
        }
        _ => timer.abort(),
    }
}

/// Timeout policy: both an unanswered prompt and an elapsed wait grace
/// period proceed to READY rather than re-prompting.
fn auto_ready(state: &AppState, booking_id: Uuid, from: HandshakeState) -> bool {
    let timer = {
        let mut handshake = match state.handshakes.get_mut(&booking_id) {
            Some(handshake) => handshake,
            None => return false,
        };

        if handshake.state != from {
            return false;
        }

        handshake.state = HandshakeState::Ready;
        handshake.deadline_at = None;
        handshake.timer.take()
    };

    if let Some(timer) = timer {
        timer.abort();
    }

    let (customer_id, barber_id) = match state.bookings.get(&booking_id) {
        Some(booking) => (booking.customer_id, booking.assigned_barber),
        None => return false,
    };

    if let Some(barber_id) = barber_id {
        state.sessions.send_to(
            &barber_id,
            ServerFrame::ServiceResponse {
                booking_id,
                action: HandshakeAction::Ready,
            },
        );
    } else {
        warn!(booking_id = %booking_id, "handshake resolved on booking without barber");
    }
    state.sessions.send_to(
        &customer_id,
        ServerFrame::ServiceResponse {
            booking_id,
            action: HandshakeAction::Ready,
        },
    );

    true
}

pub fn current_state(state: &AppState, booking_id: Uuid) -> Option<HandshakeState> {
    state
        .handshakes
        .get(&booking_id)
        .map(|handshake| handshake.state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::flow::travel;
    use crate::models::booking::{Address, BookingRequest, PaymentMethod};
    use crate::models::travel::{TravelProgress, TravelStage};

    fn arrived_booking() -> (Arc<AppState>, Uuid, Uuid, Uuid) {
        let (state, _rx) = AppState::new(Config::for_tests());
        let state = Arc::new(state);

        let booking_id = Uuid::from_u128(1);
        let barber_id = Uuid::from_u128(2);
        let customer_id = Uuid::from_u128(3);
        let booking = BookingRequest {
            id: booking_id,
            customer_id,
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
            created_at: Utc::now(),
            completed_at: None,
        };
        state.bookings.insert(booking_id, booking);
        state.travel.insert(booking_id, TravelProgress::new(booking_id));

        for stage in [
            TravelStage::Started,
            TravelStage::OnTheWay,
            TravelStage::AlmostNear,
            TravelStage::Arrived,
        ] {
            travel::advance(&state, booking_id, barber_id, stage).unwrap();
        }

        (state, booking_id, barber_id, customer_id)
    }

    #[tokio::test]
    async fn ready_response_resolves_the_handshake() {
        let (state, booking_id, barber_id, customer_id) = arrived_booking();

        notify_arrived(&state, booking_id, barber_id).unwrap();
        let resolved = respond(&state, booking_id, customer_id, HandshakeAction::Ready).unwrap();

        assert_eq!(resolved, HandshakeState::Ready);
        assert_eq!(current_state(&state, booking_id), Some(HandshakeState::Ready));
    }

    #[tokio::test]
    async fn respond_requires_an_outstanding_prompt() {
        let (state, booking_id, barber_id, customer_id) = arrived_booking();

        // Barber has not reported arrival yet.
        assert!(matches!(
            respond(&state, booking_id, customer_id, HandshakeAction::Ready),
            Err(AppError::NotAwaitingResponse)
        ));

        notify_arrived(&state, booking_id, barber_id).unwrap();

        // Someone other than the booking's customer cannot respond.
        assert!(matches!(
            respond(&state, booking_id, Uuid::from_u128(99), HandshakeAction::Ready),
            Err(AppError::NotAwaitingResponse)
        ));

        respond(&state, booking_id, customer_id, HandshakeAction::Ready).unwrap();

        // A duplicate response finds nothing awaiting.
        assert!(matches!(
            respond(&state, booking_id, customer_id, HandshakeAction::Wait),
            Err(AppError::NotAwaitingResponse)
        ));
    }

    #[tokio::test]
    async fn second_arrival_report_is_rejected() {
        let (state, booking_id, barber_id, _customer_id) = arrived_booking();

        notify_arrived(&state, booking_id, barber_id).unwrap();
        assert!(matches!(
            notify_arrived(&state, booking_id, barber_id),
            Err(AppError::NotAwaitingResponse)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_auto_proceeds_to_ready_after_the_grace_period() {
        let (state, booking_id, barber_id, customer_id) = arrived_booking();

        notify_arrived(&state, booking_id, barber_id).unwrap();
        let resolved = respond(&state, booking_id, customer_id, HandshakeAction::Wait).unwrap();
        assert_eq!(resolved, HandshakeState::WaitRequested);

        tokio::time::sleep(state.config.wait_grace + Duration::from_secs(1)).await;

        assert_eq!(current_state(&state, booking_id), Some(HandshakeState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_customer_auto_proceeds_to_ready_at_the_deadline() {
        let (state, booking_id, barber_id, customer_id) = arrived_booking();

        notify_arrived(&state, booking_id, barber_id).unwrap();
        tokio::time::sleep(state.config.handshake_window + Duration::from_secs(1)).await;

        assert_eq!(current_state(&state, booking_id), Some(HandshakeState::Ready));

        // Too late to answer now.
        assert!(matches!(
            respond(&state, booking_id, customer_id, HandshakeAction::Wait),
            Err(AppError::NotAwaitingResponse)
        ));
    }
}
