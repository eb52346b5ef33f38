//! Distance between two coordinates.
//!
//! Uses the WGS-84 ellipsoidal geodesic (Vincenty's inverse formula). For
//! nearly antipodal points the iteration may not converge; those fall back to
//! the spherical haversine distance, which is within 0.5% there.

use foodgrid_state::GeoPoint;
use thiserror::Error;

/// WGS-84 semi-major axis in meters.
const WGS84_A: f64 = 6_378_137.0;
/// WGS-84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// Mean earth radius in kilometers (IUGG).
const MEAN_RADIUS_KM: f64 = 6_371.008_8;

const MAX_ITERATIONS: usize = 200;
const CONVERGENCE: f64 = 1e-12;

/// Errors raised by the geo scorer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("invalid location ({lat}, {lon})")]
    InvalidLocation { lat: f64, lon: f64 },
}

/// Reject coordinates that are non-finite or outside the valid ranges.
pub fn validate(point: &GeoPoint) -> Result<(), GeoError> {
    let valid = point.lat.is_finite()
        && point.lon.is_finite()
        && (-90.0..=90.0).contains(&point.lat)
        && (-180.0..=180.0).contains(&point.lon);
    if valid {
        Ok(())
    } else {
        Err(GeoError::InvalidLocation {
            lat: point.lat,
            lon: point.lon,
        })
    }
}

/// Distance in kilometers between two points.
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> Result<f64, GeoError> {
    validate(a)?;
    validate(b)?;
    Ok(vincenty_km(a, b).unwrap_or_else(|| haversine_km(a, b)))
}

/// Spherical great-circle distance in kilometers.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (phi1, phi2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * MEAN_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Ellipsoidal distance in kilometers, or `None` if the iteration did not converge.
fn vincenty_km(a: &GeoPoint, b: &GeoPoint) -> Option<f64> {
    let semi_minor = (1.0 - WGS84_F) * WGS84_A;

    let l = (b.lon - a.lon).to_radians();
    let u1 = ((1.0 - WGS84_F) * a.lat.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * b.lat.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // Coincident points.
            return Some(0.0);
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // Equatorial line: cos_sq_alpha is zero.
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));

        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        if !lambda.is_finite() || lambda.abs() > std::f64::consts::PI * 2.0 {
            return None;
        }

        if (lambda - previous).abs() < CONVERGENCE {
            let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - semi_minor * semi_minor)
                / (semi_minor * semi_minor);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                                * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
            let meters = semi_minor * big_a * (sigma - delta_sigma);
            return meters.is_finite().then_some(meters / 1000.0);
        }
    }

    None
}
