use nalgebra::Vector3;
use serde::Serialize;

use crate::physics::geodesy::{offset_ned, Lla};

// ---------------------------------------------------------------------------
// Point-mass aircraft state
// ---------------------------------------------------------------------------

/// Wind-axis point-mass state with first-order attitude and engine lags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AircraftState {
    pub time: f64,
    pub position: Lla,
    pub speed: f64,            // m/s, true airspeed
    pub heading: f64,          // rad, course over ground
    pub flight_path: f64,      // rad, positive climbing
    pub roll: f64,             // rad
    pub roll_rate: f64,        // rad/s
    pub alpha: f64,            // rad
    pub beta: f64,             // rad
    pub spool: f64,            // 0..1 military thrust fraction
    pub afterburner: f64,      // 0..1
    pub speed_brake: f64,      // 0..1
    pub leg: usize,            // route index of the waypoint being flown to
}

impl AircraftState {
    /// Straight and level at `position`.
    pub fn level(position: Lla, speed: f64, heading: f64) -> Self {
        Self {
            time: 0.0,
            position,
            speed,
            heading,
            flight_path: 0.0,
            roll: 0.0,
            roll_rate: 0.0,
            alpha: 0.0,
            beta: 0.0,
            spool: 0.0,
            afterburner: 0.0,
            speed_brake: 0.0,
            leg: 0,
        }
    }

    pub fn apply(&self, d: &Deriv, dt: f64) -> AircraftState {
        let disp = d.dpos * dt;
        AircraftState {
            time: self.time + dt,
            position: offset_ned(&self.position, disp.x, disp.y, -disp.z),
            speed: (self.speed + d.dspeed * dt).max(0.0),
            heading: (self.heading + d.dheading * dt).rem_euclid(std::f64::consts::TAU),
            flight_path: self.flight_path + d.dflight_path * dt,
            roll: self.roll + d.droll * dt,
            roll_rate: self.roll_rate + d.droll_rate * dt,
            alpha: self.alpha + d.dalpha * dt,
            beta: self.beta + d.dbeta * dt,
            spool: (self.spool + d.dspool * dt).clamp(0.0, 1.0),
            afterburner: (self.afterburner + d.dafterburner * dt).clamp(0.0, 1.0),
            speed_brake: (self.speed_brake + d.dspeed_brake * dt).clamp(0.0, 1.0),
            leg: self.leg,
        }
    }

    /// Velocity in local north-east-down, m/s.
    pub fn vel_ned(&self) -> Vector3<f64> {
        let (sin_g, cos_g) = self.flight_path.sin_cos();
        let (sin_h, cos_h) = self.heading.sin_cos();
        Vector3::new(self.speed * cos_g * cos_h, self.speed * cos_g * sin_h, -self.speed * sin_g)
    }

    pub fn pitch(&self) -> f64 {
        self.flight_path + self.alpha * self.roll.cos()
    }
}

// ---------------------------------------------------------------------------
// State derivative
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Deriv {
    pub dpos: Vector3<f64>, // NED velocity, m/s
    pub dspeed: f64,
    pub dheading: f64,
    pub dflight_path: f64,
    pub droll: f64,
    pub droll_rate: f64,
    pub dalpha: f64,
    pub dbeta: f64,
    pub dspool: f64,
    pub dafterburner: f64,
    pub dspeed_brake: f64,
}

// ---------------------------------------------------------------------------
// Simulation config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub dt: f64,
    pub max_time: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,        // matches the autopilot's base tick
            max_time: 600.0,
        }
    }
}
