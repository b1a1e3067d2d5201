use std::sync::Arc;

use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use groomnet_dispatch::{api, config, dispatch, error, session, state};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let (app_state, booking_rx) = state::AppState::new(config.clone());
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(dispatch::coordinator::run_dispatch_engine(
        shared_state.clone(),
        booking_rx,
    ));
    tokio::spawn(session::monitor::run_heartbeat_monitor(shared_state.clone()));

    // Wallet collaborator boundary: settlement events leave this process
    // here. The ledger itself lives elsewhere.
    let settlement_rx = shared_state.settlement_tx.subscribe();
    tokio::spawn(async move {
        let mut events = BroadcastStream::new(settlement_rx);
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => tracing::info!(
                    booking_id = %event.booking_id,
                    kind = ?event.kind,
                    net_amount = event.net_amount,
                    "settlement event emitted"
                ),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "settlement consumer lagged")
                }
            }
        }
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
