use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WGS-84 ellipsoid
// ---------------------------------------------------------------------------

pub const WGS84_A: f64 = 6_378_137.0;             // semi-major axis, m
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;   // flattening
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F); // semi-minor axis, m
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

const VINCENTY_TOL: f64 = 1e-12;
const VINCENTY_MAX_ITER: usize = 200;

/// Geodetic position: latitude/longitude in degrees, altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Lla {
    pub lat: f64, // deg
    pub lon: f64, // deg
    pub alt: f64, // m
}

impl Lla {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    /// Same horizontal point within `tol` degrees. Altitude is ignored.
    pub fn same_latlon(&self, other: &Lla, tol: f64) -> bool {
        (self.lat - other.lat).abs() < tol && (self.lon - other.lon).abs() < tol
    }
}

/// Wrap an angle into [-pi, pi].
pub fn normalize_pi(angle_rad: f64) -> f64 {
    let a = angle_rad.rem_euclid(std::f64::consts::TAU);
    if a > std::f64::consts::PI {
        a - std::f64::consts::TAU
    } else {
        a
    }
}

/// Wrap an angle into [-180, 180] degrees.
pub fn normalize_deg(angle_deg: f64) -> f64 {
    let a = angle_deg.rem_euclid(360.0);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Meridian and prime-vertical radii of curvature at `lat_deg`, m.
pub fn radii_of_curvature(lat_deg: f64) -> (f64, f64) {
    let sin_lat = lat_deg.to_radians().sin();
    let w2 = 1.0 - WGS84_E2 * sin_lat * sin_lat;
    let normal = WGS84_A / w2.sqrt();
    let meridian = normal * (1.0 - WGS84_E2) / w2;
    (meridian, normal)
}

/// Move `p` by a local north/east/up displacement, m.
pub fn offset_ned(p: &Lla, north_m: f64, east_m: f64, up_m: f64) -> Lla {
    let (meridian, normal) = radii_of_curvature(p.lat);
    let cos_lat = p.lat.to_radians().cos().max(1e-9);
    Lla {
        lat: p.lat + (north_m / (meridian + p.alt)).to_degrees(),
        lon: p.lon + (east_m / ((normal + p.alt) * cos_lat)).to_degrees(),
        alt: p.alt + up_m,
    }
}

/// Earth-centered, earth-fixed position, m.
pub fn lla_to_ecef(p: &Lla) -> Vector3<f64> {
    let (sin_lat, cos_lat) = p.lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = p.lon.to_radians().sin_cos();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    Vector3::new(
        (n + p.alt) * cos_lat * cos_lon,
        (n + p.alt) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + p.alt) * sin_lat,
    )
}

/// Rotation from ECEF to local north-east-down at `p`. Rows are the N, E, D
/// axes expressed in ECEF.
pub fn ned_transform(p: &Lla) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = p.lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = p.lon.to_radians().sin_cos();
    Matrix3::new(
        -sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat,
        -sin_lon,           cos_lon,            0.0,
        -cos_lat * cos_lon, -cos_lat * sin_lon, -sin_lat,
    )
}

// ---------------------------------------------------------------------------
// Vincenty geodesics
// ---------------------------------------------------------------------------

/// Result of the inverse problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geodesic {
    pub distance_m: f64,
    pub start_heading_rad: f64,
    pub end_heading_rad: f64,
}

fn delta_sigma(b: f64, sin_sigma: f64, cos_sigma: f64, cos_2sm: f64) -> f64 {
    b * sin_sigma
        * (cos_2sm
            + b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos_2sm * cos_2sm)
                    - b / 6.0
                        * cos_2sm
                        * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                        * (-3.0 + 4.0 * cos_2sm * cos_2sm)))
}

fn series_ab(cos2_alpha: f64) -> (f64, f64) {
    let u2 = cos2_alpha * (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let a = 1.0 + u2 / 16384.0 * (4096.0 + u2 * (-768.0 + u2 * (320.0 - 175.0 * u2)));
    let b = u2 / 1024.0 * (256.0 + u2 * (-128.0 + u2 * (74.0 - 47.0 * u2)));
    (a, b)
}

/// Ellipsoidal distance and start/end headings between two points.
///
/// Coincident points give zero distance and zero headings. Near-antipodal
/// pairs that fail to converge fall back to a spherical estimate.
pub fn vincenty_inverse(start: &Lla, end: &Lla) -> Geodesic {
    let l = (end.lon - start.lon).to_radians();
    let u1 = ((1.0 - WGS84_F) * start.lat.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * end.lat.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    let mut converged = false;
    let (mut sin_sigma, mut cos_sigma, mut sigma) = (0.0, 0.0, 0.0);
    let (mut cos2_alpha, mut cos_2sm) = (0.0, 0.0);

    for _ in 0..VINCENTY_MAX_ITER {
        let (sin_l, cos_l) = lambda.sin_cos();
        sin_sigma = ((cos_u2 * sin_l).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_l).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            return Geodesic { distance_m: 0.0, start_heading_rad: 0.0, end_heading_rad: 0.0 };
        }
        cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_l;
        sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_l / sin_sigma;
        cos2_alpha = 1.0 - sin_alpha * sin_alpha;
        cos_2sm = if cos2_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos2_alpha
        } else {
            0.0 // equatorial line
        };
        let c = WGS84_F / 16.0 * cos2_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos2_alpha));
        let prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma + c * sin_sigma * (cos_2sm + c * cos_sigma * (-1.0 + 2.0 * cos_2sm * cos_2sm)));
        if (lambda - prev).abs() < VINCENTY_TOL {
            converged = true;
            break;
        }
    }

    if !converged {
        return spherical_inverse(start, end);
    }

    let (a, b) = series_ab(cos2_alpha);
    let ds = delta_sigma(b, sin_sigma, cos_sigma, cos_2sm);
    let (sin_l, cos_l) = lambda.sin_cos();

    Geodesic {
        distance_m: WGS84_B * a * (sigma - ds),
        start_heading_rad: (cos_u2 * sin_l).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_l),
        end_heading_rad: (cos_u1 * sin_l).atan2(-sin_u1 * cos_u2 + cos_u1 * sin_u2 * cos_l),
    }
}

fn spherical_inverse(start: &Lla, end: &Lla) -> Geodesic {
    let (lat1, lat2) = (start.lat.to_radians(), end.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (end.lon - start.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let radius = (2.0 * WGS84_A + WGS84_B) / 3.0;
    Geodesic {
        distance_m: 2.0 * radius * h.sqrt().atan2((1.0 - h).sqrt()),
        start_heading_rad: initial_heading_rad(start, end),
        end_heading_rad: normalize_pi(initial_heading_rad(end, start) + std::f64::consts::PI),
    }
}

/// Position reached by travelling `distance_m` along the geodesic that
/// leaves `start` at `heading_rad`.
pub fn vincenty_direct(start: &Lla, heading_rad: f64, distance_m: f64) -> Lla {
    let (sin_a1, cos_a1) = heading_rad.sin_cos();
    let tan_u1 = (1.0 - WGS84_F) * start.lat.to_radians().tan();
    let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
    let sin_u1 = tan_u1 * cos_u1;
    let sigma1 = tan_u1.atan2(cos_a1);
    let sin_alpha = cos_u1 * sin_a1;
    let cos2_alpha = 1.0 - sin_alpha * sin_alpha;
    let (a, b) = series_ab(cos2_alpha);

    let base = distance_m / (WGS84_B * a);
    let mut sigma = base;
    for _ in 0..VINCENTY_MAX_ITER {
        let cos_2sm = (2.0 * sigma1 + sigma).cos();
        let (sin_s, cos_s) = sigma.sin_cos();
        let next = base + delta_sigma(b, sin_s, cos_s, cos_2sm);
        let done = (next - sigma).abs() < VINCENTY_TOL;
        sigma = next;
        if done {
            break;
        }
    }

    let cos_2sm = (2.0 * sigma1 + sigma).cos();
    let (sin_s, cos_s) = sigma.sin_cos();
    let tmp = sin_u1 * sin_s - cos_u1 * cos_s * cos_a1;
    let lat = (sin_u1 * cos_s + cos_u1 * sin_s * cos_a1)
        .atan2((1.0 - WGS84_F) * (sin_alpha * sin_alpha + tmp * tmp).sqrt());
    let lambda = (sin_s * sin_a1).atan2(cos_u1 * cos_s - sin_u1 * sin_s * cos_a1);
    let c = WGS84_F / 16.0 * cos2_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos2_alpha));
    let dlon = lambda
        - (1.0 - c)
            * WGS84_F
            * sin_alpha
            * (sigma + c * sin_s * (cos_2sm + c * cos_s * (-1.0 + 2.0 * cos_2sm * cos_2sm)));

    let mut lon = start.lon + dlon.to_degrees();
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon < -180.0 {
        lon += 360.0;
    }
    Lla::new(lat.to_degrees(), lon, start.alt)
}

/// Initial great-circle heading from `start` to `end`, rad in (-pi, pi].
/// Identical points give 0.
pub fn initial_heading_rad(start: &Lla, end: &Lla) -> f64 {
    if start == end {
        return 0.0;
    }
    let (s_lat, e_lat) = (start.lat.to_radians(), end.lat.to_radians());
    let dlon = (end.lon - start.lon).to_radians();
    let (sin_dlon, cos_dlon) = dlon.sin_cos();
    (sin_dlon * e_lat.cos()).atan2(s_lat.cos() * e_lat.sin() - s_lat.sin() * e_lat.cos() * cos_dlon)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_wrapping() {
        assert!((normalize_deg(270.0) + 90.0).abs() < 1e-12);
        assert!((normalize_deg(-190.0) - 170.0).abs() < 1e-12);
        assert!((normalize_pi(3.0 * std::f64::consts::FRAC_PI_2) + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(normalize_deg(45.0), 45.0);
    }

    #[test]
    fn equator_prime_meridian_ecef() {
        let r = lla_to_ecef(&Lla::new(0.0, 0.0, 0.0));
        assert!((r.x - WGS84_A).abs() < 1e-6);
        assert!(r.y.abs() < 1e-6 && r.z.abs() < 1e-6);
    }

    #[test]
    fn pole_ecef_is_semi_minor_axis() {
        let r = lla_to_ecef(&Lla::new(90.0, 0.0, 0.0));
        assert!((r.z - WGS84_B).abs() < 1e-6, "z = {}", r.z);
    }

    #[test]
    fn ned_is_orthonormal() {
        let m = ned_transform(&Lla::new(37.0, -122.0, 0.0));
        let i = m * m.transpose();
        assert!((i - Matrix3::identity()).norm() < 1e-12);
    }

    #[test]
    fn ned_north_points_north() {
        let p = Lla::new(10.0, 20.0, 0.0);
        let q = Lla::new(10.001, 20.0, 0.0);
        let d = ned_transform(&p) * (lla_to_ecef(&q) - lla_to_ecef(&p));
        assert!(d.x > 100.0 && d.y.abs() < 1e-3, "ned = {:?}", d);
    }

    #[test]
    fn one_degree_of_longitude_on_equator() {
        let g = vincenty_inverse(&Lla::new(0.0, 0.0, 0.0), &Lla::new(0.0, 1.0, 0.0));
        assert!((g.distance_m - 111_319.49).abs() < 0.1, "d = {}", g.distance_m);
        assert!((g.start_heading_rad - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn coincident_points_give_zero() {
        let p = Lla::new(45.0, 7.0, 100.0);
        let g = vincenty_inverse(&p, &p);
        assert_eq!(g.distance_m, 0.0);
    }

    #[test]
    fn direct_inverts_inverse() {
        let a = Lla::new(33.9, -118.4, 0.0);
        let b = Lla::new(34.6, -117.2, 0.0);
        let g = vincenty_inverse(&a, &b);
        let c = vincenty_direct(&a, g.start_heading_rad, g.distance_m);
        assert!((c.lat - b.lat).abs() < 1e-9 && (c.lon - b.lon).abs() < 1e-9, "{:?}", c);
    }

    #[test]
    fn initial_heading_cardinal_directions() {
        let o = Lla::new(0.0, 0.0, 0.0);
        assert!(initial_heading_rad(&o, &Lla::new(1.0, 0.0, 0.0)).abs() < 1e-12);
        let east = initial_heading_rad(&o, &Lla::new(0.0, 1.0, 0.0));
        assert!((east - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(initial_heading_rad(&o, &o), 0.0);
    }

    #[test]
    fn ned_offset_matches_vincenty() {
        let start = Lla::new(35.0, -117.0, 1_000.0);
        let moved = offset_ned(&start, 1_000.0, 0.0, 50.0);
        assert!((moved.alt - 1_050.0).abs() < 1e-9);
        let g = vincenty_inverse(&start, &moved);
        assert!((g.distance_m - 1_000.0).abs() < 1.0, "distance {}", g.distance_m);
    }
}
