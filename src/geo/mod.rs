use crate::models::barber::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Radius check used by barber eligibility.
pub fn within_radius(barber: &GeoPoint, pickup: &GeoPoint, radius_km: f64) -> bool {
    haversine_km(barber, pickup) <= radius_km
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, within_radius};
    use crate::models::barber::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        assert!(haversine_km(&p, &p) < 1e-9);
    }

    #[test]
    fn bengaluru_to_mysuru_is_around_128_km() {
        let bengaluru = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        let mysuru = GeoPoint {
            lat: 12.2958,
            lng: 76.6394,
        };
        let distance = haversine_km(&bengaluru, &mysuru);
        assert!((distance - 128.0).abs() < 5.0);
    }

    #[test]
    fn radius_check_bounds_eligibility() {
        let barber = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        let near_pickup = GeoPoint {
            lat: 12.9800,
            lng: 77.6000,
        };
        let far_pickup = GeoPoint {
            lat: 12.2958,
            lng: 76.6394,
        };
        assert!(within_radius(&barber, &near_pickup, 5.0));
        assert!(!within_radius(&barber, &far_pickup, 5.0));
    }
}
