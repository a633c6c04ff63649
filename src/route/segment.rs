use nalgebra::{Matrix3, Vector3};

use crate::physics::geodesy::{self, lla_to_ecef, ned_transform};
use super::waypoint::Waypoint;

// ---------------------------------------------------------------------------
// Route segment: per-leg geometry, computed once per route
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RouteSegment {
    pub track_distance_m: f64,
    pub track_start_hdg_rad: f64,
    pub track_end_hdg_rad: f64,
    pub slope_rad: f64,
    pub slant_range_m: f64,
    pub prev_ecef: Vector3<f64>,   // m
    pub curr_ecef: Vector3<f64>,   // m
    pub earth_ned: Matrix3<f64>,   // ECEF -> NED at the current waypoint
    pub track_ned: Vector3<f64>,   // prev - curr, in NED at the current waypoint
}

impl RouteSegment {
    /// Geometry of the leg flown from `prev` to `curr`.
    pub fn between(prev: &Waypoint, curr: &Waypoint) -> Self {
        let g = geodesy::vincenty_inverse(&prev.position, &curr.position);
        let d_alt = curr.position.alt - prev.position.alt;
        let slope_rad = d_alt.atan2(g.distance_m);
        let cos_slope = slope_rad.cos();
        let slant_range_m = if g.distance_m > 0.0 && cos_slope != 0.0 {
            g.distance_m / cos_slope
        } else {
            d_alt.abs()
        };

        let prev_ecef = lla_to_ecef(&prev.position);
        let curr_ecef = lla_to_ecef(&curr.position);
        let earth_ned = ned_transform(&curr.position);
        let track_ned = earth_ned * (prev_ecef - curr_ecef);

        Self {
            track_distance_m: g.distance_m,
            track_start_hdg_rad: g.start_heading_rad,
            track_end_hdg_rad: g.end_heading_rad,
            slope_rad,
            slant_range_m,
            prev_ecef,
            curr_ecef,
            earth_ned,
            track_ned,
        }
    }
}
