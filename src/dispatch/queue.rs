use crate::error::AppError;
use crate::models::booking::BookingRequest;
use crate::state::AppState;

pub async fn enqueue_booking(state: &AppState, booking: BookingRequest) -> Result<(), AppError> {
    state
        .booking_tx
        .send(booking)
        .await
        .map_err(|err| AppError::Internal(format!("booking queue send failed: {err}")))?;

    state.metrics.bookings_in_queue.inc();
    Ok(())
}
