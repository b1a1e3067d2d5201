use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::session::protocol::Role;
use crate::state::AppState;

/// Sweeps sessions whose heartbeat has gone quiet for longer than 3x the
/// heartbeat interval and closes them server-side.
pub async fn run_heartbeat_monitor(state: Arc<AppState>) {
    let interval = state.config.heartbeat_interval;
    let window = interval * 3;
    let mut ticker = tokio::time::interval(interval);

    info!(window_secs = window.as_secs(), "heartbeat monitor started");

    loop {
        ticker.tick().await;

        for user_id in state.sessions.stale(window) {
            if let Some(handle) = state.sessions.force_close(&user_id) {
                warn!(user_id = %user_id, "heartbeat timed out; closing session");
                disconnect_cleanup(&state, handle.user_id, handle.role);
            }
        }

        state
            .metrics
            .connected_sessions
            .set(state.sessions.len() as i64);
    }
}

/// Cleanup shared by explicit disconnects and heartbeat timeouts. A
/// barber holding an active booking is NOT set offline; their channel is
/// expected back via reconnect.
pub fn disconnect_cleanup(state: &AppState, user_id: Uuid, role: Role) {
    if role != Role::Barber {
        return;
    }

    match state.presence.set_offline(&user_id) {
        Ok(()) => debug!(barber_id = %user_id, "barber offline after disconnect"),
        Err(AppError::HasActiveBooking) => {
            debug!(barber_id = %user_id, "barber disconnected mid-booking; presence kept")
        }
        Err(_) => {}
    }

    state
        .metrics
        .online_barbers
        .set(state.presence.online_count() as i64);
}
