//! Great-circle distance, used to flag impossible-travel logins.

/// Mean Earth radius, in kilometers, used for the Haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Compute the great-circle distance between two points, in kilometers.
///
/// Returns `0.0` (skipping impossible-travel detection for the call site)
/// if any coordinate is non-finite or outside the valid range of
/// `[-90, 90]` latitude / `[-180, 180]` longitude.
#[must_use]
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if !coords_valid(lat1, lon1) || !coords_valid(lat2, lon2) {
        return 0.0;
    }

    let (lat1_r, lon1_r) = (lat1.to_radians(), lon1.to_radians());
    let (lat2_r, lon2_r) = (lat2.to_radians(), lon2.to_radians());

    let d_lat = lat2_r - lat1_r;
    let d_lon = lon2_r - lon1_r;

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

fn coords_valid(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}
