use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{BookingRequest, BookingStatus};
use crate::models::dispatch::{AttemptResolution, DispatchAttempt};
use crate::models::settlement::SettlementEvent;
use crate::models::travel::{TravelProgress, TravelStage};
use crate::session::protocol::ServerFrame;
use crate::state::AppState;

/// Single consumer of the booking queue. All dispatch decisions for a
/// booking start here, so the race core stays ordinary sequential code.
pub async fn run_dispatch_engine(
    state: Arc<AppState>,
    mut booking_rx: mpsc::Receiver<BookingRequest>,
) {
    info!("dispatch engine started");

    while let Some(booking) = booking_rx.recv().await {
        state.metrics.bookings_in_queue.dec();

        let start = Instant::now();
        match dispatch(state.clone(), booking).await {
            Ok(()) => {
                let elapsed = start.elapsed().as_secs_f64();
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&["success"])
                    .observe(elapsed);
            }
            Err(err) => {
                let elapsed = start.elapsed().as_secs_f64();
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&["error"])
                    .observe(elapsed);
                error!(error = %err, "failed to dispatch booking");
            }
        }
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Broadcasts a pending booking to every eligible barber and arms the
/// acceptance deadline. Barbers without a live session at broadcast time
/// never see the request; the deadline is the sole recovery mechanism.
pub async fn dispatch(state: Arc<AppState>, booking: BookingRequest) -> Result<(), AppError> {
    let booking_id = booking.id;

    // The customer may have cancelled while the booking sat in the queue.
    match state.bookings.get(&booking_id) {
        Some(current) if current.status == BookingStatus::Pending => {}
        Some(_) => {
            debug!(booking_id = %booking_id, "skipping dispatch: booking no longer pending");
            return Ok(());
        }
        None => return Err(AppError::NotFound(format!("booking {booking_id} not found"))),
    }

    let candidates = state.presence.eligible_for(&booking);

    if candidates.is_empty() {
        warn!(booking_id = %booking_id, "no eligible barbers; expiring booking");
        expire_without_candidates(&state, &booking);
        return Ok(());
    }

    let attempt = DispatchAttempt::new(booking_id, candidates.clone());
    state.attempts.insert(booking_id, attempt);

    // Cancel raced with the attempt insertion above: retract and stop.
    if state
        .bookings
        .get(&booking_id)
        .map(|current| current.status != BookingStatus::Pending)
        .unwrap_or(true)
    {
        if let Some(mut attempt) = state.attempts.get_mut(&booking_id) {
            attempt.resolution = AttemptResolution::Cancelled;
            attempt.resolved_at = Some(Utc::now());
        }
        return Ok(());
    }

    let mut notified = 0usize;
    for barber_id in &candidates {
        let delivered = state.sessions.send_to(
            barber_id,
            ServerFrame::NewBookingRequest {
                booking_id,
                customer_id: booking.customer_id,
                customer_name: booking.customer_name.clone(),
                service: booking.service_name.clone(),
                address: booking.pickup.line.clone(),
                total_amount: booking.price,
            },
        );
        if delivered {
            notified += 1;
        }
    }

    info!(
        booking_id = %booking_id,
        candidates = candidates.len(),
        notified,
        "booking dispatched"
    );

    let deadline_state = state.clone();
    let window = state.config.accept_window;
    let timer = tokio::spawn(async move {
        tokio::time::sleep(window).await;
        if expire(&deadline_state, booking_id).is_ok() {
            info!(booking_id = %booking_id, "acceptance window elapsed; booking expired");
        }
    });

    match state.attempts.get_mut(&booking_id) {
        Some(mut attempt) if attempt.is_open() => {
            attempt.deadline = Some(timer.abort_handle());
        }
        // Resolved before the timer was attached; it must never fire.
        _ => timer.abort(),
    }

    Ok(())
}

/// First accept wins. The resolution flip is a single compare-and-set
/// under the attempt map's shard lock; eligibility is deliberately not
/// rechecked here.
pub fn accept(state: &AppState, booking_id: Uuid, barber_id: Uuid) -> Result<(), AppError> {
    let (candidates, deadline) = {
        let mut attempt = state
            .attempts
            .get_mut(&booking_id)
            .ok_or(AppError::AttemptExpired)?;

        match attempt.resolution {
            AttemptResolution::Open => {
                attempt.resolution = AttemptResolution::Assigned(barber_id);
                attempt.resolved_at = Some(Utc::now());
                (attempt.candidates.clone(), attempt.deadline.take())
            }
            AttemptResolution::Assigned(_) => {
                state
                    .metrics
                    .race_accepts_total
                    .with_label_values(&["lost"])
                    .inc();
                return Err(AppError::RaceLost);
            }
            AttemptResolution::Expired | AttemptResolution::Cancelled => {
                state
                    .metrics
                    .race_accepts_total
                    .with_label_values(&["late"])
                    .inc();
                return Err(AppError::AttemptExpired);
            }
        }
    };

    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let customer_id = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::Internal(format!("booking {booking_id} vanished")))?;

        // A cancel that landed before the attempt existed leaves the
        // booking non-pending; the win is void.
        if booking.status != BookingStatus::Pending {
            drop(booking);
            if let Some(mut attempt) = state.attempts.get_mut(&booking_id) {
                attempt.resolution = AttemptResolution::Cancelled;
            }
            return Err(AppError::AttemptExpired);
        }

        booking.status = BookingStatus::Assigned;
        booking.assigned_barber = Some(barber_id);
        booking.customer_id
    };

    state.presence.assign(&barber_id, booking_id);
    state
        .travel
        .insert(booking_id, TravelProgress::new(booking_id));

    let accepted_by = state
        .presence
        .get(&barber_id)
        .map(|presence| presence.name)
        .unwrap_or_else(|| "your barber".to_string());

    state.sessions.send_to(
        &barber_id,
        ServerFrame::BookingConfirmed {
            booking_id,
            barber_id,
            message: "Booking accepted successfully.".to_string(),
        },
    );
    state.sessions.send_to(
        &customer_id,
        ServerFrame::BookingConfirmed {
            booking_id,
            barber_id,
            message: format!("{accepted_by} accepted your booking."),
        },
    );

    for candidate in candidates.iter().filter(|id| **id != barber_id) {
        state.sessions.send_to(
            candidate,
            ServerFrame::RemoveBooking {
                booking_id,
                message: "This booking was accepted by another barber.".to_string(),
            },
        );
    }

    state
        .metrics
        .race_accepts_total
        .with_label_values(&["won"])
        .inc();
    state
        .metrics
        .dispatches_total
        .with_label_values(&["assigned"])
        .inc();

    info!(booking_id = %booking_id, barber_id = %barber_id, "booking assigned");
    Ok(())
}

/// A reject only removes that barber from the running attempt; once every
/// candidate has rejected, the attempt expires early.
pub fn reject(state: &AppState, booking_id: Uuid, barber_id: Uuid) -> Result<(), AppError> {
    let all_rejected = {
        let mut attempt = match state.attempts.get_mut(&booking_id) {
            Some(attempt) => attempt,
            None => return Ok(()),
        };

        if !attempt.is_open() {
            return Ok(());
        }

        attempt.rejected.insert(barber_id);
        attempt
            .candidates
            .iter()
            .all(|candidate| attempt.rejected.contains(candidate))
    };

    debug!(booking_id = %booking_id, barber_id = %barber_id, "barber rejected booking");

    if all_rejected {
        let _ = expire(state, booking_id);
    }

    Ok(())
}

/// Deadline path. The same CAS as `accept` guards it, so an expiry can
/// never race a win and the refund signal fires exactly once.
pub fn expire(state: &AppState, booking_id: Uuid) -> Result<(), AppError> {
    let (candidates, deadline) = {
        let mut attempt = state
            .attempts
            .get_mut(&booking_id)
            .ok_or(AppError::AttemptExpired)?;

        if !attempt.is_open() {
            return Err(AppError::AttemptExpired);
        }

        attempt.resolution = AttemptResolution::Expired;
        attempt.resolved_at = Some(Utc::now());
        (attempt.candidates.clone(), attempt.deadline.take())
    };

    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let booking = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::Internal(format!("booking {booking_id} vanished")))?;

        if booking.status != BookingStatus::Pending {
            return Err(AppError::AttemptExpired);
        }

        booking.status = BookingStatus::Expired;
        booking.clone()
    };

    for candidate in &candidates {
        state.sessions.send_to(
            candidate,
            ServerFrame::RemoveBooking {
                booking_id,
                message: "This booking request has expired.".to_string(),
            },
        );
    }

    state.sessions.send_to(
        &booking.customer_id,
        ServerFrame::BookingCancelled {
            booking_id,
            message: "No barbers accepted your booking. Your payment will be refunded."
                .to_string(),
        },
    );

    emit_refund(state, &booking, 0);
    state
        .metrics
        .dispatches_total
        .with_label_values(&["expired"])
        .inc();

    info!(booking_id = %booking_id, "booking expired without acceptance");
    Ok(())
}

/// Customer cancellation, permitted strictly before the barber arrives.
pub fn cancel(state: &AppState, booking_id: Uuid) -> Result<(), AppError> {
    let status = state
        .bookings
        .get(&booking_id)
        .map(|booking| booking.status)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    match status {
        BookingStatus::Pending => cancel_pending(state, booking_id),
        BookingStatus::Assigned => cancel_assigned(state, booking_id),
        _ => Err(AppError::BadRequest(
            "booking is already closed".to_string(),
        )),
    }
}

fn cancel_pending(state: &AppState, booking_id: Uuid) -> Result<(), AppError> {
    // Resolve the live attempt first; its CAS decides whether we beat a
    // concurrent accept.
    let retract = {
        match state.attempts.get_mut(&booking_id) {
            Some(mut attempt) => match attempt.resolution {
                AttemptResolution::Open => {
                    attempt.resolution = AttemptResolution::Cancelled;
                    attempt.resolved_at = Some(Utc::now());
                    Some((attempt.candidates.clone(), attempt.deadline.take()))
                }
                // A barber won in the meantime; cancel as assigned.
                AttemptResolution::Assigned(_) => {
                    drop(attempt);
                    return cancel_assigned(state, booking_id);
                }
                _ => return Err(AppError::BadRequest("booking is already closed".to_string())),
            },
            None => None,
        }
    };

    let booking = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::Internal(format!("booking {booking_id} vanished")))?;

        if booking.status != BookingStatus::Pending {
            return Err(AppError::BadRequest(
                "booking is already closed".to_string(),
            ));
        }

        booking.status = BookingStatus::Cancelled;
        booking.clone()
    };

    if let Some((candidates, deadline)) = retract {
        if let Some(deadline) = deadline {
            deadline.abort();
        }
        for candidate in &candidates {
            state.sessions.send_to(
                candidate,
                ServerFrame::RemoveBooking {
                    booking_id,
                    message: "The customer cancelled this booking.".to_string(),
                },
            );
        }
    }

    state.sessions.send_to(
        &booking.customer_id,
        ServerFrame::BookingCancelled {
            booking_id,
            message: "Your booking was cancelled.".to_string(),
        },
    );

    emit_refund(state, &booking, 0);
    state
        .metrics
        .dispatches_total
        .with_label_values(&["cancelled"])
        .inc();

    info!(booking_id = %booking_id, "pending booking cancelled by customer");
    Ok(())
}

fn cancel_assigned(state: &AppState, booking_id: Uuid) -> Result<(), AppError> {
    let stage = state
        .travel
        .get(&booking_id)
        .map(|progress| progress.stage)
        .unwrap_or(TravelStage::NotStarted);

    if stage == TravelStage::Arrived {
        return Err(AppError::CancellationTooLate);
    }

    let (booking, barber_id) = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::Internal(format!("booking {booking_id} vanished")))?;

        if booking.status != BookingStatus::Assigned {
            return Err(AppError::BadRequest(
                "booking is already closed".to_string(),
            ));
        }

        booking.status = BookingStatus::Cancelled;
        let barber_id = booking
            .assigned_barber
            .ok_or_else(|| AppError::Internal("assigned booking without barber".to_string()))?;
        (booking.clone(), barber_id)
    };

    state.presence.release(&barber_id);

    state.sessions.send_to(
        &barber_id,
        ServerFrame::BookingCancelled {
            booking_id,
            message: "The customer cancelled this booking.".to_string(),
        },
    );
    state.sessions.send_to(
        &booking.customer_id,
        ServerFrame::BookingCancelled {
            booking_id,
            message: "Your booking was cancelled.".to_string(),
        },
    );

    let fine = booking.price * state.config.cancel_fine_percent / 100;
    emit_refund(state, &booking, fine);
    state
        .metrics
        .dispatches_total
        .with_label_values(&["cancelled"])
        .inc();

    info!(
        booking_id = %booking_id,
        barber_id = %barber_id,
        stage = ?stage,
        "assigned booking cancelled by customer"
    );
    Ok(())
}

fn expire_without_candidates(state: &AppState, booking: &BookingRequest) {
    if let Some(mut stored) = state.bookings.get_mut(&booking.id) {
        if stored.status != BookingStatus::Pending {
            return;
        }
        stored.status = BookingStatus::Expired;
    }

    state.sessions.send_to(
        &booking.customer_id,
        ServerFrame::NoBarbersAvailable {
            booking_id: booking.id,
            message: "No barbers available to accept your booking right now. Please try again later."
                .to_string(),
        },
    );

    emit_refund(state, booking, 0);
    state
        .metrics
        .dispatches_total
        .with_label_values(&["no_candidates"])
        .inc();
}

fn emit_refund(state: &AppState, booking: &BookingRequest, fine: i64) {
    let event = SettlementEvent::refund(booking.id, booking.customer_id, booking.price, fine);
    let _ = state.settlement_tx.send(event);
    state
        .metrics
        .settlements_total
        .with_label_values(&["refund"])
        .inc();
}
