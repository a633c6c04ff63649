use std::f64::consts::{FRAC_PI_2, FRAC_PI_3, FRAC_PI_4};

use nalgebra::Vector2;
use serde::Serialize;

use crate::physics::geodesy::{self, lla_to_ecef, normalize_pi, Lla};
use crate::physics::units::{G0, M_PER_FT};
use super::segment::RouteSegment;
use super::waypoint::{TurnG, Waypoint};
use super::{Route, WaypointRefs};

const MIN_TURN_RADIUS_M: f64 = 10.0;
const TAXI_ALLOWABLE_ANGLE_ERROR_RAD: f64 = 1.0 * std::f64::consts::PI / 180.0;
const TAXI_LEAD_GAIN: f64 = 1.05;

// ---------------------------------------------------------------------------
// Navigation state carried between ticks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NavData {
    pub aim_heading_rad: f64,
    pub commanded_bank_rad: f64,
    pub range_track_m: f64,     // negative once the waypoint is passed
    pub range_rate_mps: f64,    // positive while closing
    pub turn_lead_dist_m: f64,
    pub delta_alt_m: f64,       // waypoint minus vehicle
    pub vert_speed_mps: f64,
    pub execute_turn: bool,
}

/// Horizontal state of the vehicle as the route geometry sees it.
#[derive(Debug, Clone, Copy)]
pub struct VehicleTrack {
    pub position: Lla,
    pub vel_ne_mps: Vector2<f64>, // north, east
    pub heading_rad: f64,
    pub speed_mps: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct BankTurnParams {
    pub roll_in_multiplier: f64,
    pub allowable_angle_error_rad: f64,
    pub max_bank_rad: f64,
    pub max_roll_rate_rad_s: f64,
    pub max_g: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct YawTurnParams {
    pub allowable_angle_error_rad: f64,
    pub max_g: f64,
}

// ---------------------------------------------------------------------------
// Leg resolution: waypoint handles -> borrowed geometry
// ---------------------------------------------------------------------------

/// Waypoints and segments of the leg being flown, borrowed from a [`Route`].
#[derive(Debug, Clone, Copy)]
pub struct RouteLeg<'a> {
    pub prev: &'a Waypoint,
    pub curr: &'a Waypoint,
    pub next: Option<&'a Waypoint>,
    pub curr_segment: &'a RouteSegment, // prev -> curr
    pub next_segment: Option<&'a RouteSegment>, // curr -> next
}

impl<'a> RouteLeg<'a> {
    /// None when there is no previous or current waypoint, or the route has
    /// no segment for the leg.
    pub fn resolve(route: &'a Route, refs: &WaypointRefs) -> Option<Self> {
        let prev_id = refs.prev?;
        let curr_id = refs.curr?;
        let prev = route.waypoint(prev_id)?;
        let curr = route.waypoint(curr_id)?;
        let curr_segment = route.segment(prev_id)?;
        let next = refs.next.and_then(|id| route.waypoint(id));
        let next_segment = next.and_then(|_| route.segment(curr_id));
        Some(Self { prev, curr, next, curr_segment, next_segment })
    }

    /// Heading flown after the waypoint: start of the next leg, or the end
    /// heading of this leg when it is the last one.
    fn next_track_start_hdg_rad(&self) -> f64 {
        match self.next_segment {
            Some(seg) => seg.track_start_hdg_rad,
            None => self.curr_segment.track_end_hdg_rad,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared track projection
// ---------------------------------------------------------------------------

struct TrackSample {
    passed: bool,
    range_track_m: f64,
    range_rate_mps: f64,
    cross_track_m: f64,     // positive right of track
    to_wpt_start_hdg_rad: f64,
}

fn sample_track(leg: &RouteLeg, track: &VehicleTrack) -> TrackSample {
    let seg = leg.curr_segment;
    let pos_ecef = lla_to_ecef(&track.position);

    let rel_ned = seg.earth_ned * (pos_ecef - seg.curr_ecef);
    let trk2d = Vector2::new(seg.track_ned.x, seg.track_ned.y);
    let passed = Vector2::new(rel_ned.x, rel_ned.y).dot(&trk2d) < 0.0;

    let to_wpt = geodesy::vincenty_inverse(&track.position, &leg.curr.position);
    let range_track_m = if passed { -to_wpt.distance_m } else { to_wpt.distance_m };

    let trk_unit = trk2d.try_normalize(f64::MIN_POSITIVE).unwrap_or_else(Vector2::zeros);
    let range_rate_mps = -trk_unit.dot(&track.vel_ne_mps);

    let cross_track_m = match seg.prev_ecef.cross(&seg.curr_ecef).try_normalize(f64::MIN_POSITIVE) {
        Some(normal) => -(pos_ecef - seg.prev_ecef).dot(&normal),
        None => 0.0,
    };

    TrackSample {
        passed,
        range_track_m,
        range_rate_mps,
        cross_track_m,
        to_wpt_start_hdg_rad: to_wpt.start_heading_rad,
    }
}

/// Symmetric limit that tolerates a bad (negative or NaN) bound.
fn limit(value: f64, bound: f64) -> f64 {
    value.max(-bound).min(bound)
}

/// Intercept angle toward the track, saturating at `approach_rad` one turn
/// radius off track.
fn approach_offset_rad(cross_track_m: f64, turn_radius_m: f64, approach_rad: f64) -> f64 {
    if !(turn_radius_m > 0.0) {
        return 0.0;
    }
    let bounded = limit(cross_track_m, turn_radius_m);
    let mut ratio = bounded / turn_radius_m;
    if ratio < 0.0 {
        ratio *= 2.0 + ratio;
    } else {
        ratio *= 2.0 - ratio;
    }
    approach_rad * ratio
}

/// Heading of the great-circle track at the vehicle's along-track position.
fn track_heading_at(leg: &RouteLeg, sample: &TrackSample, alt_m: f64) -> f64 {
    let seg = leg.curr_segment;
    let travelled_m = seg.track_distance_m - sample.range_track_m;
    let mut along = geodesy::vincenty_direct(&leg.prev.position, seg.track_start_hdg_rad, travelled_m);
    along.alt = alt_m;
    geodesy::initial_heading_rad(&along, &leg.curr.position)
}

fn store_sample(nav: &mut NavData, leg: &RouteLeg, track: &VehicleTrack, sample: &TrackSample, lead_m: f64) {
    nav.range_track_m = sample.range_track_m;
    nav.turn_lead_dist_m = lead_m;
    nav.range_rate_mps = sample.range_rate_mps;
    nav.delta_alt_m = leg.curr.position.alt - track.position.alt;
}

// ---------------------------------------------------------------------------
// Aim heading: bank-to-turn
// ---------------------------------------------------------------------------

/// Aim heading and commanded bank for a bank-to-turn vehicle following the
/// leg. Returns true when the waypoint is achieved this step, at which point
/// the aim switches to the next track and a turn is flagged.
///
/// Directly over the waypoint nothing is updated and false is returned.
pub fn aim_heading_and_bank_angle(
    leg: &RouteLeg,
    track: &VehicleTrack,
    nav: &mut NavData,
    params: &BankTurnParams,
    dt: f64,
) -> bool {
    if track.position.same_latlon(&leg.curr.position, f64::EPSILON) {
        return false;
    }

    let approach_rad = if leg.prev.on_passing { FRAC_PI_3 } else { FRAC_PI_4 };
    let next_hdg = leg.next_track_start_hdg_rad();
    let sample = sample_track(leg, track);

    let pilot_g = match leg.curr.max_turn_g {
        TurnG::Lateral(g) => limit((g * g + 1.0).sqrt(), params.max_g),
        TurnG::Pilot(g) => limit(g, params.max_g),
    };
    let bank_rad = if pilot_g > 1.0 {
        limit((1.0 / pilot_g).acos(), params.max_bank_rad)
    } else {
        0.0
    };

    let radius_m = turn_radius_m(track.speed_mps, bank_rad);
    let radius_m = if radius_m.is_finite() { radius_m.max(MIN_TURN_RADIUS_M) } else { MIN_TURN_RADIUS_M };

    // Distance covered while rolling into the turn
    let roll_lead_m = if params.max_roll_rate_rad_s > 0.0 {
        bank_rad / (0.5 * params.max_roll_rate_rad_s) * sample.range_rate_mps * params.roll_in_multiplier
    } else {
        0.0
    };

    let turn_angle_rad = normalize_pi(next_hdg - sample.to_wpt_start_hdg_rad);
    let lead_m = turn_lead_distance_m(turn_angle_rad, radius_m) + roll_lead_m;
    let offset_rad = approach_offset_rad(sample.cross_track_m, radius_m, approach_rad);

    let mut aim_rad = track.heading_rad;
    let mut hdg_err_rad = 0.0;
    if !sample.passed {
        let track_hdg = track_heading_at(leg, &sample, track.position.alt);
        hdg_err_rad = normalize_pi(track_hdg - track.heading_rad);
        if !nav.execute_turn {
            aim_rad = if sample.range_rate_mps > 0.0 { track_hdg - offset_rad } else { track_hdg };
        }
    }

    store_sample(nav, leg, track, &sample, lead_m);
    if !nav.execute_turn {
        nav.aim_heading_rad = aim_rad;
        nav.commanded_bank_rad = bank_rad;
    }

    if hdg_err_rad.abs() < params.allowable_angle_error_rad && nav.execute_turn {
        nav.commanded_bank_rad = bank_rad;
        nav.execute_turn = false;
    }

    let achieved = achieved_waypoint(dt, nav, leg.curr, leg.next);
    if achieved {
        nav.execute_turn = true;
        nav.aim_heading_rad = next_hdg;
        nav.commanded_bank_rad = bank_rad;
    }
    achieved
}

// ---------------------------------------------------------------------------
// Aim heading: yaw-to-turn and taxi
// ---------------------------------------------------------------------------

/// Aim heading for a yaw-to-turn vehicle. The waypoint's turn g is treated
/// as lateral acceleration; a lateral spec is additionally limited to
/// `max_g`.
pub fn yaw_aim_heading_angle(
    leg: &RouteLeg,
    track: &VehicleTrack,
    nav: &mut NavData,
    params: &YawTurnParams,
    dt: f64,
) -> bool {
    if track.position.same_latlon(&leg.curr.position, f64::EPSILON) {
        return false;
    }

    let g = match leg.curr.max_turn_g {
        TurnG::Lateral(g) => limit(g, params.max_g),
        TurnG::Pilot(g) => g,
    };
    let radius = turn_radius_from_lateral_g_m(track.speed_mps, g);
    let radius = if radius.is_finite() && g > 0.0 {
        radius.max(MIN_TURN_RADIUS_M)
    } else {
        MIN_TURN_RADIUS_M
    };

    let sample = sample_track(leg, track);
    let turn_angle_rad = normalize_pi(leg.next_track_start_hdg_rad() - sample.to_wpt_start_hdg_rad);
    let lead_m = turn_lead_distance_m(turn_angle_rad, radius);

    steer_to_track(leg, track, nav, &sample, radius, lead_m, params.allowable_angle_error_rad, false, dt)
}

/// Ground-handling aim heading: fixed turn radius from the desired taxi
/// radius and a fixed 1 degree allowable heading error.
pub fn taxi_aim_heading(
    leg: &RouteLeg,
    track: &VehicleTrack,
    nav: &mut NavData,
    turn_radius_ft: f64,
    dt: f64,
) -> bool {
    if track.position.same_latlon(&leg.curr.position, f32::EPSILON as f64) {
        return false;
    }

    let radius = turn_radius_ft * M_PER_FT;
    let sample = sample_track(leg, track);
    let turn_angle_rad = normalize_pi(leg.next_track_start_hdg_rad() - sample.to_wpt_start_hdg_rad);
    // Extra lead gives time to ramp in steering
    let lead_m = turn_lead_distance_m(turn_angle_rad, radius) * TAXI_LEAD_GAIN;

    steer_to_track(leg, track, nav, &sample, radius, lead_m, TAXI_ALLOWABLE_ANGLE_ERROR_RAD, true, dt)
}

/// Yaw and taxi steering: hard-over aims while a turn is still far from
/// the new track, intercept otherwise.
#[allow(clippy::too_many_arguments)]
fn steer_to_track(
    leg: &RouteLeg,
    track: &VehicleTrack,
    nav: &mut NavData,
    sample: &TrackSample,
    radius_m: f64,
    lead_m: f64,
    allowable_rad: f64,
    taxi: bool,
    dt: f64,
) -> bool {
    let offset_rad = approach_offset_rad(sample.cross_track_m, radius_m, FRAC_PI_4);

    let mut aim_rad = track.heading_rad;
    let mut hdg_err_rad = 0.0;
    if !sample.passed {
        let track_hdg = track_heading_at(leg, sample, track.position.alt);
        hdg_err_rad = normalize_pi(track_hdg - track.heading_rad);

        if sample.range_rate_mps > 0.0 {
            if nav.execute_turn && hdg_err_rad.abs() > allowable_rad {
                if hdg_err_rad > allowable_rad {
                    aim_rad = track.heading_rad + FRAC_PI_2;
                    if taxi {
                        nav.execute_turn = false;
                    }
                } else {
                    aim_rad = track.heading_rad - FRAC_PI_2;
                    nav.execute_turn = false;
                }
            } else {
                aim_rad = track_hdg - offset_rad;
            }
        } else {
            aim_rad = track_hdg;
        }
    }

    store_sample(nav, leg, track, sample, lead_m);
    nav.aim_heading_rad = aim_rad;

    if hdg_err_rad.abs() < allowable_rad {
        nav.execute_turn = false;
    }

    let achieved = achieved_waypoint(dt, nav, leg.curr, leg.next);
    if achieved {
        nav.execute_turn = true;
    }
    achieved
}

// ---------------------------------------------------------------------------
// Waypoint predicates and vertical track
// ---------------------------------------------------------------------------

/// Climb or descent rate that reaches the waypoint altitude on arrival.
pub fn vertical_speed(nav: &mut NavData) {
    let travel_s = nav.range_track_m.abs() / nav.range_rate_mps;
    nav.vert_speed_mps = if nav.delta_alt_m.abs() <= f32::EPSILON as f64 || !travel_s.is_finite() {
        0.0
    } else {
        nav.delta_alt_m / travel_s
    };
}

/// True once the waypoint is behind the vehicle or will be within `dt`.
pub fn passed_waypoint(dt: f64, nav: &NavData) -> bool {
    let eps = f32::EPSILON as f64;
    nav.range_track_m <= eps || nav.range_track_m <= nav.range_rate_mps * dt + eps
}

/// Fly-by waypoints are achieved at the turn lead distance; fly-over and
/// final waypoints must be passed.
pub fn achieved_waypoint(dt: f64, nav: &NavData, waypoint: &Waypoint, next: Option<&Waypoint>) -> bool {
    if next.is_none() || waypoint.on_passing {
        return passed_waypoint(dt, nav);
    }
    nav.range_track_m <= nav.turn_lead_dist_m
        || nav.range_track_m + nav.range_rate_mps * dt <= nav.turn_lead_dist_m
}

// ---------------------------------------------------------------------------
// Turn helpers
// ---------------------------------------------------------------------------

pub fn turn_radius_m(speed_mps: f64, bank_rad: f64) -> f64 {
    speed_mps * speed_mps / (G0 * bank_rad.abs().tan())
}

pub fn turn_radius_from_lateral_g_m(speed_mps: f64, lateral_g: f64) -> f64 {
    speed_mps * speed_mps / (G0 * lateral_g)
}

pub fn turn_lead_distance_m(turn_angle_rad: f64, turn_radius_m: f64) -> f64 {
    (turn_angle_rad * 0.5).abs().tan() * turn_radius_m
}

/// Ellipsoidal distance plus start and end headings (rad).
pub fn distance_between_m(start: &Lla, end: &Lla) -> (f64, f64, f64) {
    let g = geodesy::vincenty_inverse(start, end);
    (g.distance_m, g.start_heading_rad, g.end_heading_rad)
}

pub use geodesy::initial_heading_rad;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // North along lon 0, then east.
    fn corner_route() -> Route {
        Route::from_waypoints([
            Waypoint::new(0.0, 0.0, 1_000.0),
            Waypoint::new(0.2, 0.0, 1_000.0),
            Waypoint::new(0.2, 0.2, 1_000.0),
        ])
    }

    fn track_at(lat: f64, lon: f64, hdg_deg: f64, speed_mps: f64) -> VehicleTrack {
        let hdg = hdg_deg.to_radians();
        VehicleTrack {
            position: Lla::new(lat, lon, 1_000.0),
            vel_ne_mps: Vector2::new(speed_mps * hdg.cos(), speed_mps * hdg.sin()),
            heading_rad: hdg,
            speed_mps,
        }
    }

    fn bank_params() -> BankTurnParams {
        BankTurnParams {
            roll_in_multiplier: 1.0,
            allowable_angle_error_rad: 1f64.to_radians(),
            max_bank_rad: 60f64.to_radians(),
            max_roll_rate_rad_s: 100f64.to_radians(),
            max_g: 6.0,
        }
    }

    #[test]
    fn on_track_aims_along_track() {
        let route = corner_route();
        let leg = RouteLeg::resolve(&route, &route.start_refs()).unwrap();
        let mut nav = NavData::default();
        let achieved = aim_heading_and_bank_angle(&leg, &track_at(0.05, 0.0, 0.0, 100.0), &mut nav, &bank_params(), 0.01);
        assert!(!achieved);
        assert!(nav.aim_heading_rad.abs() < 1e-3, "aim = {}", nav.aim_heading_rad);
        assert!(nav.range_rate_mps > 99.0);
        assert!(nav.range_track_m > 16_000.0);
        // 2 g pilot load -> 60 deg bank
        assert!((nav.commanded_bank_rad - 60f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn right_of_track_aims_left() {
        let route = corner_route();
        let leg = RouteLeg::resolve(&route, &route.start_refs()).unwrap();
        let mut nav = NavData::default();
        aim_heading_and_bank_angle(&leg, &track_at(0.05, 0.01, 0.0, 100.0), &mut nav, &bank_params(), 0.01);
        assert!(nav.aim_heading_rad < 0.0, "aim = {}", nav.aim_heading_rad);
        assert!(nav.aim_heading_rad > -FRAC_PI_4 - 1e-9);
    }

    #[test]
    fn achieves_at_turn_lead() {
        let route = corner_route();
        let leg = RouteLeg::resolve(&route, &route.start_refs()).unwrap();
        let mut nav = NavData::default();
        // ~110 m short of a 90 deg corner, lead is several hundred meters
        let achieved = aim_heading_and_bank_angle(&leg, &track_at(0.199, 0.0, 0.0, 100.0), &mut nav, &bank_params(), 0.01);
        assert!(achieved);
        assert!(nav.execute_turn);
        assert!((nav.aim_heading_rad - FRAC_PI_2).abs() < 0.01, "aim = {}", nav.aim_heading_rad);
    }

    #[test]
    fn over_waypoint_leaves_nav_untouched() {
        let route = corner_route();
        let leg = RouteLeg::resolve(&route, &route.start_refs()).unwrap();
        let mut nav = NavData { aim_heading_rad: 0.3, ..NavData::default() };
        let achieved = aim_heading_and_bank_angle(&leg, &track_at(0.2, 0.0, 0.0, 100.0), &mut nav, &bank_params(), 0.01);
        assert!(!achieved);
        assert_eq!(nav.aim_heading_rad, 0.3);
    }

    #[test]
    fn yaw_turn_hard_over_while_turning() {
        let route = corner_route();
        let leg = RouteLeg::resolve(&route, &route.start_refs()).unwrap();
        let mut nav = NavData { execute_turn: true, ..NavData::default() };
        let params = YawTurnParams { allowable_angle_error_rad: 1f64.to_radians(), max_g: 0.5 };
        // heading 080 while the track runs north
        let t = track_at(0.05, 0.0, 80.0, 50.0);
        yaw_aim_heading_angle(&leg, &t, &mut nav, &params, 0.01);
        assert!(nav.range_rate_mps > 0.0);
        assert!((nav.aim_heading_rad - (t.heading_rad - FRAC_PI_2)).abs() < 1e-12);
        assert!(!nav.execute_turn);
    }

    #[test]
    fn passed_and_achieved_predicates() {
        let wp = Waypoint::new(0.0, 0.0, 0.0);
        let next = Waypoint::new(1.0, 0.0, 0.0);
        let nav = NavData { range_track_m: 50.0, range_rate_mps: 100.0, turn_lead_dist_m: 10.0, ..NavData::default() };
        assert!(!passed_waypoint(0.1, &nav));
        assert!(passed_waypoint(1.0, &nav));
        assert!(!achieved_waypoint(0.1, &nav, &wp, Some(&next)));
        let closing = NavData { range_track_m: 8.0, ..nav };
        assert!(achieved_waypoint(0.1, &closing, &wp, Some(&next)));
        let fly_over = wp.clone().on_passing(true);
        assert!(!achieved_waypoint(0.01, &closing, &fly_over, Some(&next)));
        assert!(passed_waypoint(0.0, &NavData { range_track_m: -1.0, ..nav }));
    }

    #[test]
    fn vertical_speed_glides_to_altitude() {
        let mut nav = NavData { range_track_m: 1_000.0, range_rate_mps: 100.0, delta_alt_m: 50.0, ..NavData::default() };
        vertical_speed(&mut nav);
        assert!((nav.vert_speed_mps - 5.0).abs() < 1e-12);
        nav.delta_alt_m = 0.0;
        vertical_speed(&mut nav);
        assert_eq!(nav.vert_speed_mps, 0.0);
    }

    #[test]
    fn turn_helpers() {
        let r = turn_radius_m(100.0, 45f64.to_radians());
        assert!((r - 10_000.0 / G0).abs() < 1e-6);
        assert!((turn_lead_distance_m(FRAC_PI_2, 100.0) - 100.0).abs() < 1e-9);
        assert!((turn_radius_from_lateral_g_m(100.0, 1.0) - r).abs() < 1e-6);
    }
}
