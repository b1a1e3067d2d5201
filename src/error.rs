use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("barber has an active booking")]
    HasActiveBooking,

    #[error("booking already assigned to another barber")]
    RaceLost,

    #[error("booking request has expired")]
    AttemptExpired,

    #[error("travel status must advance one step at a time")]
    NotSequential,

    #[error("caller is not the assigned barber")]
    NotAssignedBarber,

    #[error("no service confirmation is awaiting a response")]
    NotAwaitingResponse,

    #[error("payment has not been collected for this booking")]
    PaymentNotCollected,

    #[error("cannot cancel: barber has already arrived")]
    CancellationTooLate,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable reason code surfaced to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::HasActiveBooking => "HAS_ACTIVE_BOOKING",
            AppError::RaceLost => "ALREADY_ASSIGNED",
            AppError::AttemptExpired => "EXPIRED",
            AppError::NotSequential => "NOT_SEQUENTIAL",
            AppError::NotAssignedBarber => "NOT_ASSIGNED_BARBER",
            AppError::NotAwaitingResponse => "NOT_AWAITING_RESPONSE",
            AppError::PaymentNotCollected => "PAYMENT_NOT_COLLECTED",
            AppError::CancellationTooLate => "CANCELLATION_TOO_LATE",
            AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::HasActiveBooking => StatusCode::CONFLICT,
            AppError::RaceLost => StatusCode::CONFLICT,
            AppError::AttemptExpired => StatusCode::GONE,
            AppError::NotSequential => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotAssignedBarber => StatusCode::FORBIDDEN,
            AppError::NotAwaitingResponse => StatusCode::CONFLICT,
            AppError::PaymentNotCollected => StatusCode::PAYMENT_REQUIRED,
            AppError::CancellationTooLate => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
