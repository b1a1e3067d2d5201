use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResolution {
    Open,
    Assigned(Uuid),
    Expired,
    Cancelled,
}

/// The live race for one pending booking. Exists only between broadcast
/// and resolution; addressed by its booking id since at most one attempt
/// per booking is ever live.
#[derive(Debug)]
pub struct DispatchAttempt {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub candidates: Vec<Uuid>,
    pub rejected: HashSet<Uuid>,
    pub resolution: AttemptResolution,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Deadline timer; aborted the instant the attempt resolves.
    pub deadline: Option<AbortHandle>,
}

impl DispatchAttempt {
    pub fn new(booking_id: Uuid, candidates: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            candidates,
            rejected: HashSet::new(),
            resolution: AttemptResolution::Open,
            started_at: Utc::now(),
            resolved_at: None,
            deadline: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolution == AttemptResolution::Open
    }
}
