use crate::dynamics;
use crate::dynamics::state::{AircraftState, Deriv};
use crate::gnc::AutopilotControls;
use crate::vehicle::Aircraft;

// ---------------------------------------------------------------------------
// RK4 integrator with controls held constant over the step
// ---------------------------------------------------------------------------

/// Single RK4 step with constant controls over the step.
pub fn rk4_step(state: &AircraftState, aircraft: &Aircraft, controls: &AutopilotControls, dt: f64) -> AircraftState {
    let k1 = dynamics::derivatives(state, aircraft, controls);
    let k2 = dynamics::derivatives(&state.apply(&k1, dt * 0.5), aircraft, controls);
    let k3 = dynamics::derivatives(&state.apply(&k2, dt * 0.5), aircraft, controls);
    let k4 = dynamics::derivatives(&state.apply(&k3, dt), aircraft, controls);

    state.apply(&weighted(&k1, &k2, &k3, &k4), dt)
}

fn weighted(k1: &Deriv, k2: &Deriv, k3: &Deriv, k4: &Deriv) -> Deriv {
    let w = |a: f64, b: f64, c: f64, d: f64| (a + 2.0 * b + 2.0 * c + d) / 6.0;
    Deriv {
        dpos: (k1.dpos + 2.0 * k2.dpos + 2.0 * k3.dpos + k4.dpos) / 6.0,
        dspeed: w(k1.dspeed, k2.dspeed, k3.dspeed, k4.dspeed),
        dheading: w(k1.dheading, k2.dheading, k3.dheading, k4.dheading),
        dflight_path: w(k1.dflight_path, k2.dflight_path, k3.dflight_path, k4.dflight_path),
        droll: w(k1.droll, k2.droll, k3.droll, k4.droll),
        droll_rate: w(k1.droll_rate, k2.droll_rate, k3.droll_rate, k4.droll_rate),
        dalpha: w(k1.dalpha, k2.dalpha, k3.dalpha, k4.dalpha),
        dbeta: w(k1.dbeta, k2.dbeta, k3.dbeta, k4.dbeta),
        dspool: w(k1.dspool, k2.dspool, k3.dspool, k4.dspool),
        dafterburner: w(k1.dafterburner, k2.dafterburner, k3.dafterburner, k4.dafterburner),
        dspeed_brake: w(k1.dspeed_brake, k2.dspeed_brake, k3.dspeed_brake, k4.dspeed_brake),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::geodesy::Lla;
    use crate::vehicle::presets;

    #[test]
    fn roll_rate_lag_matches_exponential() {
        let ac = presets::trainer();
        let mut s = AircraftState::level(Lla::new(0.0, 0.0, 3_000.0), 150.0, 0.0);
        let controls = AutopilotControls { stick_right: 1.0, ..AutopilotControls::default() };
        for _ in 0..20 {
            s = rk4_step(&s, &ac, &controls, 0.01);
        }
        let expected = ac.max_roll_rate.to_radians() * (1.0 - (-0.2_f64 / ac.roll_lag).exp());
        assert!((s.roll_rate - expected).abs() < 1e-6, "{} vs {}", s.roll_rate, expected);
        assert!((s.time - 0.2).abs() < 1e-12);
    }

    #[test]
    fn flies_north_along_meridian() {
        let ac = presets::trainer();
        let mut s = AircraftState::level(Lla::new(10.0, 20.0, 3_000.0), 150.0, 0.0);
        let start = s.position;
        for _ in 0..100 {
            s = rk4_step(&s, &ac, &AutopilotControls::default(), 0.01);
        }
        assert!(s.position.lat > start.lat);
        assert!((s.position.lon - start.lon).abs() < 1e-12);
    }
}
