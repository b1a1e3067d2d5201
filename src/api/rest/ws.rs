use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::dispatch::coordinator;
use crate::error::AppError;
use crate::flow::{handshake, travel};
use crate::session::auth::{verify_token, Claims};
use crate::session::monitor::disconnect_cleanup;
use crate::session::protocol::{ClientFrame, Envelope, Role, ServerFrame};
use crate::session::SessionHandle;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// Auth happens once, before the upgrade; a bad token never reaches the
/// socket layer and must not be retried by the caller.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_token(&state.config.jwt_secret, &params.token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, claims: Claims) {
    let (handle, mut rx) = state.sessions.register(claims.sub, claims.role);
    state
        .metrics
        .connected_sessions
        .set(state.sessions.len() as i64);

    info!(user_id = %claims.sub, role = ?claims.role, "websocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize frame for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }

        let _ = sender.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            // Heartbeat monitor or a replacing reconnect closed us.
            _ = handle.wait_closed() => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_text(&state, &handle, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(error = %err, "websocket read error");
                    break;
                }
            },
        }
    }

    send_task.abort();

    if state.sessions.unregister(&handle) {
        disconnect_cleanup(&state, handle.user_id, handle.role);
    }
    state
        .metrics
        .connected_sessions
        .set(state.sessions.len() as i64);

    info!(user_id = %claims.sub, "websocket client disconnected");
}

fn handle_text(state: &Arc<AppState>, session: &Arc<SessionHandle>, text: &str) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) => {
            session.send(ServerFrame::Error {
                message: "Invalid JSON format".to_string(),
            });
            return;
        }
    };

    // Heartbeats bypass the dedup gate; they carry no state change.
    if matches!(envelope.frame, ClientFrame::Heartbeat) {
        session.mark_heartbeat();
        session.send(ServerFrame::HeartbeatResponse {
            timestamp: Utc::now(),
        });
        return;
    }

    if !session.should_apply(envelope.seq) {
        debug!(
            user_id = %session.user_id,
            seq = envelope.seq,
            "dropping already-applied frame"
        );
        return;
    }

    match envelope.frame {
        // Handled before the dedup gate.
        ClientFrame::Heartbeat => {}
        ClientFrame::ToggleOnline { is_online } => {
            if session.role != Role::Barber {
                session.send(ServerFrame::Error {
                    message: "Only barbers can update online status".to_string(),
                });
                return;
            }

            let result = if is_online {
                state.presence.set_online(&session.user_id, None, None)
            } else {
                state.presence.set_offline(&session.user_id)
            };

            match result {
                Ok(()) => {
                    state
                        .metrics
                        .online_barbers
                        .set(state.presence.online_count() as i64);
                    session.send(ServerFrame::OnlineStatusUpdated { is_online });
                }
                Err(err) => {
                    session.send(ServerFrame::Error {
                        message: err.to_string(),
                    });
                }
            }
        }
        ClientFrame::AcceptBooking { booking_id } => {
            if session.role != Role::Barber {
                session.send(ServerFrame::Error {
                    message: "Only barbers can accept bookings".to_string(),
                });
                return;
            }

            match coordinator::accept(state, booking_id, session.user_id) {
                Ok(()) => {}
                // Race lost is informational, not an error: the client
                // retracts the request from view.
                Err(AppError::RaceLost) => {
                    session.send(ServerFrame::RemoveBooking {
                        booking_id,
                        message: "This booking was accepted by another barber.".to_string(),
                    });
                }
                Err(AppError::AttemptExpired) => {
                    session.send(ServerFrame::RemoveBooking {
                        booking_id,
                        message: "This booking request has expired.".to_string(),
                    });
                }
                Err(err) => {
                    session.send(ServerFrame::Error {
                        message: err.to_string(),
                    });
                }
            }
        }
        ClientFrame::RejectBooking { booking_id } => {
            if session.role != Role::Barber {
                session.send(ServerFrame::Error {
                    message: "Only barbers can reject bookings".to_string(),
                });
                return;
            }

            if let Err(err) = coordinator::reject(state, booking_id, session.user_id) {
                session.send(ServerFrame::Error {
                    message: err.to_string(),
                });
            }
        }
        ClientFrame::TravelUpdate {
            booking_id,
            next_state,
        } => {
            if session.role != Role::Barber {
                session.send(ServerFrame::Error {
                    message: "Only barbers can update travel status".to_string(),
                });
                return;
            }

            // Reaching ARRIVED opens the handshake; the barber then sends
            // the explicit arrival report to prompt the customer.
            if let Err(err) = travel::advance(state, booking_id, session.user_id, next_state) {
                session.send(ServerFrame::Error {
                    message: err.to_string(),
                });
            }
        }
        ClientFrame::ServiceResponse { booking_id, action } => {
            if session.role != Role::Customer {
                session.send(ServerFrame::Error {
                    message: "Only customers can respond to a service request".to_string(),
                });
                return;
            }

            if let Err(err) = handshake::respond(state, booking_id, session.user_id, action) {
                session.send(ServerFrame::Error {
                    message: err.to_string(),
                });
            }
        }
    }
}
