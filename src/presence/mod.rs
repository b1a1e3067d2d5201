use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::within_radius;
use crate::models::barber::{BarberPresence, GeoPoint};
use crate::models::booking::BookingRequest;

/// Tracks which barbers are online, where they are, and whether they hold
/// an active booking. Every component consults this registry for barber
/// availability; nothing else keeps its own notion of it.
pub struct PresenceRegistry {
    entries: DashMap<Uuid, BarberPresence>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn register(&self, presence: BarberPresence) {
        self.entries.insert(presence.barber_id, presence);
    }

    /// Going online is blocked mid-booking: the barber must complete the
    /// active booking first.
    pub fn set_online(
        &self,
        barber_id: &Uuid,
        location: Option<GeoPoint>,
        radius_km: Option<f64>,
    ) -> Result<(), AppError> {
        let mut entry = self
            .entries
            .get_mut(barber_id)
            .ok_or_else(|| AppError::NotFound(format!("barber {barber_id} not found")))?;

        if entry.active_booking.is_some() {
            return Err(AppError::HasActiveBooking);
        }

        entry.online = true;
        if let Some(location) = location {
            entry.location = location;
        }
        if let Some(radius_km) = radius_km {
            entry.radius_km = radius_km;
        }
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Rejected while an active booking is held; callers surface this as
    /// a user-facing block, not a silent no-op.
    pub fn set_offline(&self, barber_id: &Uuid) -> Result<(), AppError> {
        let mut entry = self
            .entries
            .get_mut(barber_id)
            .ok_or_else(|| AppError::NotFound(format!("barber {barber_id} not found")))?;

        if entry.active_booking.is_some() {
            return Err(AppError::HasActiveBooking);
        }

        entry.online = false;
        entry.updated_at = Utc::now();
        Ok(())
    }

    pub fn update_location(&self, barber_id: &Uuid, location: GeoPoint) -> Result<(), AppError> {
        let mut entry = self
            .entries
            .get_mut(barber_id)
            .ok_or_else(|| AppError::NotFound(format!("barber {barber_id} not found")))?;

        entry.location = location;
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Barbers that may race for this booking: online, within their own
    /// travel radius of the pickup point, not holding an active booking.
    /// Sorted ascending by id so broadcasts are reproducible.
    pub fn eligible_for(&self, booking: &BookingRequest) -> Vec<Uuid> {
        let mut eligible: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|entry| {
                let presence = entry.value();
                presence.online
                    && presence.active_booking.is_none()
                    && within_radius(
                        &presence.location,
                        &booking.pickup.point,
                        presence.radius_km,
                    )
            })
            .map(|entry| *entry.key())
            .collect();

        eligible.sort();
        eligible
    }

    pub fn assign(&self, barber_id: &Uuid, booking_id: Uuid) {
        if let Some(mut entry) = self.entries.get_mut(barber_id) {
            entry.active_booking = Some(booking_id);
            entry.updated_at = Utc::now();
        }
    }

    pub fn release(&self, barber_id: &Uuid) {
        if let Some(mut entry) = self.entries.get_mut(barber_id) {
            entry.active_booking = None;
            entry.updated_at = Utc::now();
        }
    }

    pub fn get(&self, barber_id: &Uuid) -> Option<BarberPresence> {
        self.entries.get(barber_id).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<BarberPresence> {
        self.entries.iter().map(|entry| entry.clone()).collect()
    }

    pub fn online_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.online).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::{Address, BookingStatus, PaymentMethod};

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    fn barber(seed: u128, lat: f64, lng: f64, radius_km: f64) -> BarberPresence {
        BarberPresence::new(
            Uuid::from_u128(seed),
            format!("barber-{seed}"),
            point(lat, lng),
            radius_km,
        )
    }

    fn booking_at(lat: f64, lng: f64) -> BookingRequest {
        BookingRequest {
            id: Uuid::from_u128(1000),
            customer_id: Uuid::from_u128(2000),
            customer_name: "test-customer".to_string(),
            service_id: Uuid::from_u128(3000),
            service_name: "haircut".to_string(),
            price: 50_000,
            payment_method: PaymentMethod::Prepaid,
            pickup: Address {
                line: "12 MG Road".to_string(),
                point: point(lat, lng),
            },
            status: BookingStatus::Pending,
            assigned_barber: None,
            payment_collected: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn eligibility_requires_online_in_radius_and_free() {
        let registry = PresenceRegistry::new();
        registry.register(barber(1, 12.9716, 77.5946, 5.0));
        registry.register(barber(2, 12.9716, 77.5946, 5.0));
        registry.register(barber(3, 12.2958, 76.6394, 5.0)); // far away

        registry.set_online(&Uuid::from_u128(1), None, None).unwrap();
        registry.set_online(&Uuid::from_u128(3), None, None).unwrap();
        // barber 2 stays offline

        let eligible = registry.eligible_for(&booking_at(12.9750, 77.6000));
        assert_eq!(eligible, vec![Uuid::from_u128(1)]);
    }

    #[test]
    fn busy_barber_never_appears_eligible_and_cannot_go_offline() {
        let registry = PresenceRegistry::new();
        let id = Uuid::from_u128(7);
        registry.register(barber(7, 12.9716, 77.5946, 10.0));
        registry.set_online(&id, None, None).unwrap();

        registry.assign(&id, Uuid::from_u128(555));

        assert!(registry.eligible_for(&booking_at(12.9716, 77.5946)).is_empty());
        assert!(matches!(
            registry.set_offline(&id),
            Err(AppError::HasActiveBooking)
        ));
        assert!(matches!(
            registry.set_online(&id, None, None),
            Err(AppError::HasActiveBooking)
        ));

        registry.release(&id);
        assert!(registry.set_offline(&id).is_ok());
    }

    #[test]
    fn eligibility_ordering_is_deterministic() {
        let registry = PresenceRegistry::new();
        for seed in [9u128, 3, 6] {
            registry.register(barber(seed, 12.9716, 77.5946, 10.0));
            registry
                .set_online(&Uuid::from_u128(seed), None, None)
                .unwrap();
        }

        let eligible = registry.eligible_for(&booking_at(12.9716, 77.5946));
        assert_eq!(
            eligible,
            vec![Uuid::from_u128(3), Uuid::from_u128(6), Uuid::from_u128(9)]
        );
    }
}
