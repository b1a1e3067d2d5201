use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::barber::{BarberPresence, GeoPoint};
use crate::session::protocol::ServerFrame;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/barbers", post(register_barber).get(list_barbers))
        .route("/barbers/:id/status", patch(update_status))
        .route("/barbers/:id/location", patch(update_location))
}

#[derive(Deserialize)]
pub struct RegisterBarberRequest {
    pub name: String,
    pub location: GeoPoint,
    pub radius_km: f64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub is_online: bool,
    pub location: Option<GeoPoint>,
    pub radius_km: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn register_barber(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterBarberRequest>,
) -> Result<Json<BarberPresence>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.radius_km <= 0.0 {
        return Err(AppError::BadRequest("radius must be > 0".to_string()));
    }

    let presence = BarberPresence::new(
        Uuid::new_v4(),
        payload.name,
        payload.location,
        payload.radius_km,
    );

    state.presence.register(presence.clone());
    Ok(Json(presence))
}

async fn list_barbers(State(state): State<Arc<AppState>>) -> Json<Vec<BarberPresence>> {
    Json(state.presence.list())
}

/// Online/offline toggle. Going offline is rejected mid-booking; the
/// client surfaces that as a user-facing block.
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<BarberPresence>, AppError> {
    if payload.is_online {
        state
            .presence
            .set_online(&id, payload.location, payload.radius_km)?;
    } else {
        state.presence.set_offline(&id)?;
    }

    state
        .metrics
        .online_barbers
        .set(state.presence.online_count() as i64);

    state.sessions.send_to(
        &id,
        ServerFrame::OnlineStatusUpdated {
            is_online: payload.is_online,
        },
    );

    let presence = state
        .presence
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("barber {id} not found")))?;
    Ok(Json(presence))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<BarberPresence>, AppError> {
    state.presence.update_location(&id, payload.location)?;

    let presence = state
        .presence
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("barber {id} not found")))?;
    Ok(Json(presence))
}
