use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dispatch::coordinator;
use crate::dispatch::queue::enqueue_booking;
use crate::error::AppError;
use crate::flow::{completion, handshake, travel};
use crate::models::booking::{Address, BookingRequest, BookingStatus, PaymentMethod};
use crate::session::protocol::HandshakeAction;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/travel", get(get_travel_status))
        .route("/bookings/:id/accept", post(accept_booking))
        .route("/bookings/:id/reject", post(reject_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/arrived", post(notify_arrived))
        .route("/bookings/:id/respond", post(respond_to_arrival))
        .route("/bookings/:id/payment", post(collect_payment))
        .route("/bookings/:id/complete", post(complete_service))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub service_id: Uuid,
    pub service_name: String,
    pub price: i64,
    pub payment_method: PaymentMethod,
    pub pickup: Address,
}

#[derive(Deserialize)]
pub struct BarberActionRequest {
    pub barber_id: Uuid,
}

#[derive(Deserialize)]
pub struct CustomerResponseRequest {
    pub customer_id: Uuid,
    pub action: HandshakeAction,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<BookingRequest>, AppError> {
    if payload.price <= 0 {
        return Err(AppError::BadRequest("price must be > 0".to_string()));
    }

    if payload.pickup.line.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup address cannot be empty".to_string(),
        ));
    }

    let booking = BookingRequest {
        id: Uuid::new_v4(),
        customer_id: payload.customer_id,
        customer_name: payload.customer_name,
        service_id: payload.service_id,
        service_name: payload.service_name,
        price: payload.price,
        payment_method: payload.payment_method,
        pickup: payload.pickup,
        status: BookingStatus::Pending,
        assigned_barber: None,
        // Prepaid bookings arrive already paid; COD is collected at the door.
        payment_collected: payload.payment_method == PaymentMethod::Prepaid,
        created_at: Utc::now(),
        completed_at: None,
    };

    state.bookings.insert(booking.id, booking.clone());
    enqueue_booking(&state, booking.clone()).await?;

    Ok(Json(booking))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingRequest>, AppError> {
    let booking = state
        .bookings
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;

    Ok(Json(booking.value().clone()))
}

async fn get_travel_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let stage = travel::current_stage(&state, id)?;
    Ok(Json(json!({ "travel_status": stage })))
}

async fn accept_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BarberActionRequest>,
) -> Result<Json<Value>, AppError> {
    coordinator::accept(&state, id, payload.barber_id)?;

    Ok(Json(json!({
        "message": "Booking accepted successfully.",
        "booking_id": id,
        "status": "success",
    })))
}

async fn reject_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BarberActionRequest>,
) -> Result<Json<Value>, AppError> {
    coordinator::reject(&state, id, payload.barber_id)?;

    Ok(Json(json!({
        "message": "Booking rejected successfully.",
        "status": "success",
    })))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    coordinator::cancel(&state, id)?;

    Ok(Json(json!({
        "message": "Booking cancelled.",
        "booking_id": id,
    })))
}

async fn notify_arrived(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BarberActionRequest>,
) -> Result<Json<Value>, AppError> {
    handshake::notify_arrived(&state, id, payload.barber_id)?;

    Ok(Json(json!({
        "message": "Customer notified of arrival.",
        "booking_id": id,
    })))
}

async fn respond_to_arrival(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CustomerResponseRequest>,
) -> Result<Json<Value>, AppError> {
    let new_state = handshake::respond(&state, id, payload.customer_id, payload.action)?;

    Ok(Json(json!({
        "booking_id": id,
        "handshake_state": new_state,
    })))
}

async fn collect_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    completion::collect_payment(&state, id)?;

    Ok(Json(json!({
        "message": "Payment recorded.",
        "booking_id": id,
    })))
}

async fn complete_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BarberActionRequest>,
) -> Result<Json<Value>, AppError> {
    completion::complete_service(&state, id, payload.barber_id)?;

    Ok(Json(json!({
        "status": "Service completion and payment done",
        "booking_id": id,
    })))
}
