use nalgebra::Vector3;
use serde::Serialize;

use crate::physics::geodesy::Lla;
use crate::physics::units::{FT_PER_M, M_PER_FT};

// ---------------------------------------------------------------------------
// Collaborators the controller queries each tick
// ---------------------------------------------------------------------------

/// Read-only kinematic snapshot of the controlled vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KinematicState {
    pub position: Lla,
    pub vel_ned_mps: Vector3<f64>,
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub yaw_rate_dps: f64,
    pub pitch_rate_dps: f64,
    pub roll_rate_dps: f64,
    pub alpha_deg: f64,
    pub beta_deg: f64,
    pub flight_path_angle_deg: f64,
    pub speed_fps: f64,     // true airspeed
    pub kias: f64,
    pub ktas: f64,
    pub mach: f64,
    pub vert_speed_fpm: f64,
    pub nx_g: f64,
    pub ny_g: f64,
    pub nz_g: f64,
    pub dynamic_pressure_psf: f64,
}

impl KinematicState {
    pub fn alt_m(&self) -> f64 {
        self.position.alt
    }

    pub fn alt_ft(&self) -> f64 {
        self.position.alt * FT_PER_M
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_fps * M_PER_FT
    }

    pub fn heading_rad(&self) -> f64 {
        self.heading_deg.to_radians()
    }
}

/// Thrust available versus drag, lbs. Drives the throttle feed-forward.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThrustPotential {
    pub drag_lbs: f64,
    pub min_thrust_lbs: f64,
    pub max_thrust_lbs: f64,
}

impl ThrustPotential {
    /// Throttle that balances drag: 1 above max thrust, -1 below min thrust,
    /// interpolated between. Thrust is projected through `alpha_deg`.
    pub fn throttle_bias(&self, alpha_deg: f64) -> f64 {
        let cos_alpha = alpha_deg.to_radians().cos();
        let max_thrust = self.max_thrust_lbs * cos_alpha;
        let min_thrust = self.min_thrust_lbs * cos_alpha;
        let delta = max_thrust - min_thrust;
        if self.drag_lbs > max_thrust {
            1.0
        } else if self.drag_lbs < min_thrust {
            -1.0
        } else if delta == 0.0 {
            0.0
        } else {
            (self.drag_lbs - min_thrust) / delta
        }
    }
}

/// Ground steering of a vehicle with landing gear.
pub trait LandingGear {
    /// False when the gear has no steerable nose wheel.
    fn has_nose_gear(&self) -> bool;

    fn max_steering_angle_deg(&self) -> f64;

    /// Nose-wheel angle that produces a turn of `radius_ft`. Negative radius
    /// turns left.
    fn steering_angle_for_radius_deg(&self, radius_ft: f64) -> f64;
}

/// Everything the autopilot needs from the vehicle it flies.
pub trait AircraftQuery {
    fn kinematics(&self) -> KinematicState;

    /// Angle of attack that produces `g` of normal load, deg.
    fn alpha_at_g(&self, g: f64) -> f64;

    /// Sideslip that produces `g` of lateral load, deg.
    fn beta_at_g(&self, g: f64) -> f64;

    /// Stick-back that trims pitching moment at `alpha_deg`, when known.
    fn stick_back_for_zero_moment(&self, _alpha_deg: f64) -> Option<f64> {
        None
    }

    /// Rudder that trims yawing moment at `beta_deg`, when known.
    fn rudder_for_zero_moment(&self, _beta_deg: f64) -> Option<f64> {
        None
    }

    fn thrust_potential(&self) -> ThrustPotential;

    fn landing_gear(&self) -> Option<&dyn LandingGear> {
        None
    }
}

/// Atmosphere queries used to resolve airspeed targets.
pub trait Environment {
    /// True airspeed for `mach` at `alt_m`, ft/s.
    fn fps_from_mach(&self, alt_m: f64, mach: f64) -> f64;

    /// True airspeed for calibrated airspeed `kcas` at `alt_m`, ft/s.
    fn fps_from_kcas(&self, alt_m: f64, kcas: f64) -> f64;

    fn dynamic_pressure_psf(&self, alt_m: f64, speed_fps: f64) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_bias_brackets() {
        let t = ThrustPotential { drag_lbs: 500.0, min_thrust_lbs: 0.0, max_thrust_lbs: 1_000.0 };
        assert!((t.throttle_bias(0.0) - 0.5).abs() < 1e-12);
        let high = ThrustPotential { drag_lbs: 2_000.0, ..t };
        assert_eq!(high.throttle_bias(0.0), 1.0);
        let low = ThrustPotential { drag_lbs: -1.0, ..t };
        assert_eq!(low.throttle_bias(0.0), -1.0);
        let flat = ThrustPotential { drag_lbs: 0.0, min_thrust_lbs: 0.0, max_thrust_lbs: 0.0 };
        assert_eq!(flat.throttle_bias(0.0), 0.0);
    }
}
