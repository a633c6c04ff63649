use crate::dynamics::state::{AircraftState, Deriv};
use crate::gnc::AutopilotControls;
use crate::physics::atmosphere;
use crate::physics::geodesy::Lla;
use crate::physics::units::G0;
use crate::vehicle::Aircraft;

/// Below this airspeed the turn and climb equations are frozen.
const MIN_FLYING_SPEED: f64 = 1.0; // m/s

/// Speed brake extension lag, s.
const SPEED_BRAKE_LAG: f64 = 0.5;

// ---------------------------------------------------------------------------
// Aerodynamic and propulsive forces (wind axes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AeroForces {
    pub dynamic_pressure: f64, // Pa
    pub lift: f64,             // N
    pub drag: f64,             // N
    pub side: f64,             // N, positive to the right
    pub thrust: f64,           // N
}

/// Forces for the current state. Depend on state only; controls act through
/// the first-order lags.
pub fn forces(aircraft: &Aircraft, state: &AircraftState) -> AeroForces {
    let atm = atmosphere::isa(state.position.alt);
    let q = 0.5 * atm.density * state.speed * state.speed;
    let qs = q * aircraft.wing_area;

    let cl = aircraft.cl_alpha * state.alpha;
    let cd = aircraft.cd0 + aircraft.induced_drag_k * cl * cl + aircraft.speed_brake_cd * state.speed_brake;

    AeroForces {
        dynamic_pressure: q,
        lift: qs * cl,
        drag: qs * cd,
        side: qs * aircraft.cy_beta * state.beta,
        thrust: state.spool * aircraft.max_thrust + state.afterburner * aircraft.afterburner_thrust,
    }
}

/// Rates of the velocity vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRates {
    pub speed: f64,       // m/s^2
    pub heading: f64,     // rad/s
    pub flight_path: f64, // rad/s
}

pub fn attitude_rates(aircraft: &Aircraft, state: &AircraftState, f: &AeroForces) -> PathRates {
    let m = aircraft.mass;
    let (sin_g, cos_g) = state.flight_path.sin_cos();
    let (sin_r, cos_r) = state.roll.sin_cos();

    let speed = (f.thrust * state.alpha.cos() - f.drag) / m - G0 * sin_g;
    if state.speed < MIN_FLYING_SPEED {
        return PathRates { speed, ..PathRates::default() };
    }

    let mv = m * state.speed;
    PathRates {
        speed,
        heading: (f.lift * sin_r + f.side * cos_r) / (mv * cos_g.max(1e-3)),
        flight_path: (f.lift * cos_r - f.side * sin_r) / mv - G0 * cos_g / state.speed,
    }
}

/// Wings-level state with alpha and engine trimmed for 1 g cruise.
pub fn trimmed_level(aircraft: &Aircraft, position: Lla, speed: f64, heading: f64) -> AircraftState {
    let mut s = AircraftState::level(position, speed, heading);
    let q = 0.5 * atmosphere::isa(position.alt).density * speed * speed;
    s.alpha = aircraft.alpha_per_g(q).to_radians();
    let f = forces(aircraft, &s);
    if aircraft.max_thrust > 0.0 {
        s.spool = (f.drag / (aircraft.max_thrust * s.alpha.cos())).clamp(0.0, 1.0);
    }
    s
}

// ---------------------------------------------------------------------------
// Equations of motion
// ---------------------------------------------------------------------------

/// State derivatives under `controls`.
///
/// Stick, rudder and throttle settle the roll rate, alpha, beta and engine
/// through first-order lags; the velocity vector follows the resulting
/// forces.
pub fn derivatives(state: &AircraftState, aircraft: &Aircraft, controls: &AutopilotControls) -> Deriv {
    let f = forces(aircraft, state);
    let rates = attitude_rates(aircraft, state, &f);

    let roll_rate_cmd = (controls.stick_right * aircraft.max_roll_rate).to_radians();
    let alpha_cmd = (controls.stick_back * aircraft.alpha_per_stick).to_radians();
    let beta_cmd = (-controls.rudder_right * aircraft.beta_per_rudder
        + aircraft.adverse_yaw * state.roll_rate.to_degrees())
    .to_radians();

    Deriv {
        dpos: state.vel_ned(),
        dspeed: rates.speed,
        dheading: rates.heading,
        dflight_path: rates.flight_path,
        droll: state.roll_rate,
        droll_rate: (roll_rate_cmd - state.roll_rate) / aircraft.roll_lag,
        dalpha: (alpha_cmd - state.alpha) / aircraft.alpha_lag,
        dbeta: (beta_cmd - state.beta) / aircraft.beta_lag,
        dspool: (controls.throttle_military - state.spool) / aircraft.engine_lag,
        dafterburner: (controls.throttle_afterburner - state.afterburner) / aircraft.engine_lag,
        dspeed_brake: (controls.speed_brake - state.speed_brake) / SPEED_BRAKE_LAG,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::presets;

    fn trimmed(ac: &Aircraft) -> AircraftState {
        trimmed_level(ac, Lla::new(35.0, -117.0, 3_000.0), 150.0, 0.0)
    }

    #[test]
    fn trimmed_alpha_holds_level() {
        let ac = presets::trainer();
        let s = trimmed(&ac);
        let controls = AutopilotControls {
            stick_back: s.alpha.to_degrees() / ac.alpha_per_stick,
            ..AutopilotControls::default()
        };
        let d = derivatives(&s, &ac, &controls);
        assert!(d.dflight_path.abs() < 1e-9, "gamma dot {}", d.dflight_path);
        assert!(d.dalpha.abs() < 1e-12);
        assert!(d.dheading.abs() < 1e-12);
    }

    #[test]
    fn bank_turns_toward_low_wing() {
        let ac = presets::trainer();
        let mut s = trimmed(&ac);
        s.roll = 30_f64.to_radians();
        let d = derivatives(&s, &ac, &AutopilotControls::default());
        assert!(d.dheading > 0.0);
        s.roll = -30_f64.to_radians();
        let d = derivatives(&s, &ac, &AutopilotControls::default());
        assert!(d.dheading < 0.0);
    }

    #[test]
    fn controls_drive_lags() {
        let ac = presets::trainer();
        let s = trimmed(&ac);
        let controls = AutopilotControls {
            stick_right: 0.5,
            rudder_right: 0.5,
            throttle_military: 1.0,
            ..AutopilotControls::default()
        };
        let d = derivatives(&s, &ac, &controls);
        assert!(d.droll_rate > 0.0);
        assert!(d.dbeta < 0.0, "right rudder slips the nose right");
        assert!(d.dspool > 0.0);
        assert!(d.dalpha < 0.0, "no stick relaxes alpha");
    }

    #[test]
    fn idle_decelerates() {
        let ac = presets::trainer();
        let mut s = trimmed(&ac);
        s.spool = 0.0;
        let d = derivatives(&s, &ac, &AutopilotControls::default());
        assert!(d.dspeed < 0.0);
        assert!((d.dpos.x - 150.0).abs() < 1e-9);
    }

    #[test]
    fn trimmed_engine_balances_drag() {
        let ac = presets::trainer();
        let s = trimmed(&ac);
        let d = derivatives(&s, &ac, &AutopilotControls { throttle_military: s.spool, ..AutopilotControls::default() });
        assert!(d.dspeed.abs() < 1e-9, "vdot {}", d.dspeed);
        assert!(s.spool > 0.1 && s.spool < 0.4);
    }
}
