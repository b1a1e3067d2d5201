use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::models::booking::BookingRequest;
use crate::models::dispatch::DispatchAttempt;
use crate::models::handshake::ConfirmationHandshake;
use crate::models::settlement::SettlementEvent;
use crate::models::travel::TravelProgress;
use crate::observability::metrics::Metrics;
use crate::presence::PresenceRegistry;
use crate::session::SessionRegistry;

/// Shared state handed by reference into every component. Lifecycle is
/// tied to process start; there are no ambient globals.
pub struct AppState {
    pub config: Config,
    pub bookings: DashMap<Uuid, BookingRequest>,
    pub attempts: DashMap<Uuid, DispatchAttempt>,
    pub travel: DashMap<Uuid, TravelProgress>,
    pub handshakes: DashMap<Uuid, ConfirmationHandshake>,
    pub presence: PresenceRegistry,
    pub sessions: SessionRegistry,
    pub booking_tx: mpsc::Sender<BookingRequest>,
    pub settlement_tx: broadcast::Sender<SettlementEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<BookingRequest>) {
        let (booking_tx, booking_rx) = mpsc::channel(config.booking_queue_size);
        let (settlement_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        (
            Self {
                config,
                bookings: DashMap::new(),
                attempts: DashMap::new(),
                travel: DashMap::new(),
                handshakes: DashMap::new(),
                presence: PresenceRegistry::new(),
                sessions: SessionRegistry::new(),
                booking_tx,
                settlement_tx,
                metrics: Metrics::new(),
            },
            booking_rx,
        )
    }
}
