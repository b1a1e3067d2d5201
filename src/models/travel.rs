use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Travel milestones, strictly ordered. The customer-visible progress bar
/// depends on this sequence being gapless and monotonic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelStage {
    NotStarted,
    Started,
    OnTheWay,
    AlmostNear,
    Arrived,
}

impl TravelStage {
    /// The only stage `advance` may accept next, `None` once arrived.
    pub fn next(self) -> Option<TravelStage> {
        match self {
            TravelStage::NotStarted => Some(TravelStage::Started),
            TravelStage::Started => Some(TravelStage::OnTheWay),
            TravelStage::OnTheWay => Some(TravelStage::AlmostNear),
            TravelStage::AlmostNear => Some(TravelStage::Arrived),
            TravelStage::Arrived => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelProgress {
    pub booking_id: Uuid,
    pub stage: TravelStage,
    pub updated_at: DateTime<Utc>,
}

impl TravelProgress {
    pub fn new(booking_id: Uuid) -> Self {
        Self {
            booking_id,
            stage: TravelStage::NotStarted,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TravelStage;

    #[test]
    fn stages_advance_in_order() {
        assert_eq!(TravelStage::NotStarted.next(), Some(TravelStage::Started));
        assert_eq!(TravelStage::Started.next(), Some(TravelStage::OnTheWay));
        assert_eq!(TravelStage::OnTheWay.next(), Some(TravelStage::AlmostNear));
        assert_eq!(TravelStage::AlmostNear.next(), Some(TravelStage::Arrived));
    }

    #[test]
    fn arrived_is_terminal() {
        assert_eq!(TravelStage::Arrived.next(), None);
    }

    #[test]
    fn wire_names_are_screaming_snake() {
        let json = serde_json::to_string(&TravelStage::OnTheWay).unwrap();
        assert_eq!(json, "\"ON_THE_WAY\"");
        let parsed: TravelStage = serde_json::from_str("\"ALMOST_NEAR\"").unwrap();
        assert_eq!(parsed, TravelStage::AlmostNear);
    }
}
