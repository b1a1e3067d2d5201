pub mod auth;
pub mod client;
pub mod monitor;
pub mod protocol;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::session::protocol::{Role, ServerFrame};

/// One live connection. Ephemeral; dies with the socket.
pub struct SessionHandle {
    pub user_id: Uuid,
    pub role: Role,
    tx: mpsc::UnboundedSender<ServerFrame>,
    closed: Notify,
    last_heartbeat_ms: AtomicI64,
    last_applied_seq: AtomicU64,
}

impl SessionHandle {
    fn new(user_id: Uuid, role: Role, tx: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self {
            user_id,
            role,
            tx,
            closed: Notify::new(),
            last_heartbeat_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            last_applied_seq: AtomicU64::new(0),
        }
    }

    pub fn send(&self, frame: ServerFrame) -> bool {
        self.tx.send(frame).is_ok()
    }

    pub fn mark_heartbeat(&self) {
        self.last_heartbeat_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Idempotent-delivery gate: returns true exactly once per seq value,
    /// in increasing order. Replayed and reordered frames return false.
    pub fn should_apply(&self, seq: u64) -> bool {
        self.last_applied_seq
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                if seq > last {
                    Some(seq)
                } else {
                    None
                }
            })
            .is_ok()
    }

    pub async fn wait_closed(&self) {
        self.closed.notified().await;
    }

    fn close(&self) {
        // notify_one stores a permit, so a close signalled between polls
        // is still observed by the read loop.
        self.closed.notify_one();
    }

    fn heartbeat_age(&self) -> Duration {
        let last = self.last_heartbeat_ms.load(Ordering::Relaxed);
        let age_ms = (Utc::now().timestamp_millis() - last).max(0);
        Duration::from_millis(age_ms as u64)
    }
}

/// Registry of live sessions, one per connected user. Passed by handle
/// through `AppState`; there is no module-level socket state.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Registers a session for the user, replacing (and closing) any
    /// previous one; the newest connection wins.
    pub fn register(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> (Arc<SessionHandle>, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(SessionHandle::new(user_id, role, tx));

        if let Some(previous) = self.sessions.insert(user_id, handle.clone()) {
            previous.close();
        }

        (handle, rx)
    }

    /// Removes the session, but only if the registry still holds this
    /// exact handle; a reconnect may already have replaced it.
    pub fn unregister(&self, session: &Arc<SessionHandle>) -> bool {
        self.sessions
            .remove_if(&session.user_id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    pub fn force_close(&self, user_id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(user_id).map(|(_, handle)| {
            handle.close();
            handle
        })
    }

    pub fn send_to(&self, user_id: &Uuid, frame: ServerFrame) -> bool {
        match self.sessions.get(user_id) {
            Some(handle) => handle.send(frame),
            None => false,
        }
    }

    pub fn is_connected(&self, user_id: &Uuid) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions whose last heartbeat is older than the given window.
    pub fn stale(&self, window: Duration) -> Vec<Uuid> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().heartbeat_age() > window)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_seq_is_dropped() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = registry.register(Uuid::from_u128(1), Role::Barber);

        assert!(handle.should_apply(1));
        assert!(handle.should_apply(2));
        assert!(!handle.should_apply(2));
        assert!(!handle.should_apply(1));
        assert!(handle.should_apply(3));
    }

    #[test]
    fn newest_connection_wins() {
        let registry = SessionRegistry::new();
        let user = Uuid::from_u128(1);

        let (first, _rx1) = registry.register(user, Role::Customer);
        let (_second, _rx2) = registry.register(user, Role::Customer);

        // The stale handle can no longer unregister the live session.
        assert!(!registry.unregister(&first));
        assert!(registry.is_connected(&user));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn send_to_delivers_to_live_session() {
        let registry = SessionRegistry::new();
        let user = Uuid::from_u128(9);
        let (_handle, mut rx) = registry.register(user, Role::Customer);

        assert!(registry.send_to(
            &user,
            ServerFrame::OnlineStatusUpdated { is_online: true }
        ));
        assert!(matches!(
            rx.recv().await,
            Some(ServerFrame::OnlineStatusUpdated { is_online: true })
        ));
        assert!(!registry.send_to(
            &Uuid::from_u128(10),
            ServerFrame::OnlineStatusUpdated { is_online: true }
        ));
    }
}
