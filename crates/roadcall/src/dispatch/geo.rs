use super::domain::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance in kilometers between two coordinate pairs, via the
/// haversine formula. Callers are expected to pass validated points.
pub fn great_circle_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let half_dlat = (lat_b - lat_a) / 2.0;
    let half_dlng = (b.lng - a.lng).to_radians() / 2.0;

    let h = half_dlat.sin().powi(2) + lat_a.cos() * lat_b.cos() * half_dlng.sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}
