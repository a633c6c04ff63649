use crate::dynamics::point_mass::{self, AeroForces};
use crate::dynamics::state::AircraftState;
use crate::gnc::{AircraftQuery, KinematicState, ThrustPotential};
use crate::physics::atmosphere;
use crate::physics::units::{mps_to_fpm, FT_PER_M, G0, LBF_PER_N, MPS_PER_KNOT, PSF_PER_PA};

// ---------------------------------------------------------------------------
// Aircraft definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Aircraft {
    pub name: String,
    pub mass: f64,                  // kg
    pub wing_area: f64,             // m^2
    pub cl_alpha: f64,              // per rad
    pub cd0: f64,
    pub induced_drag_k: f64,        // CD = cd0 + k * CL^2
    pub cy_beta: f64,               // per rad, negative
    pub speed_brake_cd: f64,
    pub max_thrust: f64,            // N, military power
    pub afterburner_thrust: f64,    // N added at full afterburner
    pub max_roll_rate: f64,         // deg/s at full stick
    pub alpha_per_stick: f64,       // deg of trimmed alpha per unit stick
    pub beta_per_rudder: f64,       // deg of sideslip per unit rudder
    pub adverse_yaw: f64,           // deg of sideslip per deg/s of roll rate
    pub roll_lag: f64,              // s
    pub alpha_lag: f64,             // s
    pub beta_lag: f64,              // s
    pub engine_lag: f64,            // s
}

impl Aircraft {
    pub fn weight(&self) -> f64 {
        self.mass * G0
    }

    /// Trimmed alpha for a unit of normal load at dynamic pressure `q`, deg.
    pub fn alpha_per_g(&self, q: f64) -> f64 {
        let lift_slope = q * self.wing_area * self.cl_alpha;
        if lift_slope < 1e-6 {
            return 0.0;
        }
        (self.weight() / lift_slope).to_degrees()
    }

    /// Sideslip for a unit of lateral load at dynamic pressure `q`, deg.
    pub fn beta_per_g(&self, q: f64) -> f64 {
        let side_slope = q * self.wing_area * self.cy_beta;
        if side_slope.abs() < 1e-6 {
            return 0.0;
        }
        (self.weight() / side_slope).to_degrees()
    }
}

// ---------------------------------------------------------------------------
// Aircraft builder
// ---------------------------------------------------------------------------

pub struct AircraftBuilder {
    aircraft: Aircraft,
}

impl AircraftBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            aircraft: Aircraft {
                name: name.into(),
                mass: 5_000.0,
                wing_area: 20.0,
                cl_alpha: 5.0,
                cd0: 0.02,
                induced_drag_k: 0.08,
                cy_beta: -1.0,
                speed_brake_cd: 0.05,
                max_thrust: 25_000.0,
                afterburner_thrust: 15_000.0,
                max_roll_rate: 120.0,
                alpha_per_stick: 15.0,
                beta_per_rudder: 10.0,
                adverse_yaw: 0.03,
                roll_lag: 0.2,
                alpha_lag: 0.3,
                beta_lag: 0.5,
                engine_lag: 0.8,
            },
        }
    }

    pub fn mass(mut self, v: f64) -> Self { self.aircraft.mass = v; self }
    pub fn wing_area(mut self, v: f64) -> Self { self.aircraft.wing_area = v; self }
    pub fn cl_alpha(mut self, v: f64) -> Self { self.aircraft.cl_alpha = v; self }
    pub fn cd0(mut self, v: f64) -> Self { self.aircraft.cd0 = v; self }
    pub fn induced_drag_k(mut self, v: f64) -> Self { self.aircraft.induced_drag_k = v; self }
    pub fn cy_beta(mut self, v: f64) -> Self { self.aircraft.cy_beta = v; self }
    pub fn speed_brake_cd(mut self, v: f64) -> Self { self.aircraft.speed_brake_cd = v; self }
    pub fn max_thrust(mut self, v: f64) -> Self { self.aircraft.max_thrust = v; self }
    pub fn afterburner_thrust(mut self, v: f64) -> Self { self.aircraft.afterburner_thrust = v; self }
    pub fn max_roll_rate(mut self, v: f64) -> Self { self.aircraft.max_roll_rate = v; self }
    pub fn alpha_per_stick(mut self, v: f64) -> Self { self.aircraft.alpha_per_stick = v; self }
    pub fn beta_per_rudder(mut self, v: f64) -> Self { self.aircraft.beta_per_rudder = v; self }
    pub fn adverse_yaw(mut self, v: f64) -> Self { self.aircraft.adverse_yaw = v; self }
    pub fn lags(mut self, roll: f64, alpha: f64, beta: f64, engine: f64) -> Self {
        self.aircraft.roll_lag = roll;
        self.aircraft.alpha_lag = alpha;
        self.aircraft.beta_lag = beta;
        self.aircraft.engine_lag = engine;
        self
    }

    pub fn build(self) -> Aircraft {
        self.aircraft
    }
}

// ---------------------------------------------------------------------------
// Autopilot view of a flying aircraft
// ---------------------------------------------------------------------------

/// Pairs an aircraft with its current state so the autopilot can query it.
pub struct AircraftView<'a> {
    pub aircraft: &'a Aircraft,
    pub state: &'a AircraftState,
    forces: AeroForces,
}

impl<'a> AircraftView<'a> {
    pub fn new(aircraft: &'a Aircraft, state: &'a AircraftState) -> Self {
        let forces = point_mass::forces(aircraft, state);
        Self { aircraft, state, forces }
    }
}

impl AircraftQuery for AircraftView<'_> {
    fn kinematics(&self) -> KinematicState {
        let s = self.state;
        let f = &self.forces;
        let w = self.aircraft.weight();
        let rates = point_mass::attitude_rates(self.aircraft, s, f);

        let atmo = atmosphere::isa(s.position.alt);
        let sea_level_density = atmosphere::isa(0.0).density;
        let speed_fps = s.speed * FT_PER_M;
        let ktas = s.speed / MPS_PER_KNOT;

        KinematicState {
            position: s.position,
            vel_ned_mps: s.vel_ned(),
            heading_deg: s.heading.to_degrees(),
            pitch_deg: s.pitch().to_degrees(),
            roll_deg: s.roll.to_degrees(),
            yaw_rate_dps: rates.heading.to_degrees(),
            pitch_rate_dps: rates.flight_path.to_degrees(),
            roll_rate_dps: s.roll_rate.to_degrees(),
            alpha_deg: s.alpha.to_degrees(),
            beta_deg: s.beta.to_degrees(),
            flight_path_angle_deg: s.flight_path.to_degrees(),
            speed_fps,
            // Equivalent airspeed stands in for indicated.
            kias: ktas * (atmo.density / sea_level_density).sqrt(),
            ktas,
            mach: s.speed / atmo.sound_speed,
            vert_speed_fpm: mps_to_fpm(s.speed * s.flight_path.sin()),
            nx_g: (f.thrust - f.drag) / w,
            ny_g: f.side / w,
            nz_g: f.lift / w,
            dynamic_pressure_psf: f.dynamic_pressure * PSF_PER_PA,
        }
    }

    fn alpha_at_g(&self, g: f64) -> f64 {
        g * self.aircraft.alpha_per_g(self.forces.dynamic_pressure)
    }

    fn beta_at_g(&self, g: f64) -> f64 {
        g * self.aircraft.beta_per_g(self.forces.dynamic_pressure)
    }

    fn stick_back_for_zero_moment(&self, alpha_deg: f64) -> Option<f64> {
        let per_stick = self.aircraft.alpha_per_stick;
        (per_stick.abs() > f64::EPSILON).then(|| alpha_deg / per_stick)
    }

    fn thrust_potential(&self) -> ThrustPotential {
        ThrustPotential {
            drag_lbs: self.forces.drag * LBF_PER_N,
            min_thrust_lbs: 0.0,
            max_thrust_lbs: self.aircraft.max_thrust * LBF_PER_N,
        }
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

pub mod presets {
    use super::*;
    use crate::config::AutopilotConfig;
    use crate::error::ConfigResult;
    use crate::gnc::CommonController;
    use crate::route::{Route, TurnG, Waypoint, WaypointSpeed};

    /// Tuning that flies the `trainer` airframe.
    pub const TRAINER_AUTOPILOT: &str = include_str!("../../config/trainer.toml");

    /// Light jet trainer.
    pub fn trainer() -> Aircraft {
        AircraftBuilder::new("Trainer").build()
    }

    /// Heavier, slower-rolling transport.
    pub fn transport() -> Aircraft {
        AircraftBuilder::new("Transport")
            .mass(40_000.0)
            .wing_area(120.0)
            .cd0(0.025)
            .induced_drag_k(0.05)
            .max_thrust(120_000.0)
            .afterburner_thrust(0.0)
            .max_roll_rate(40.0)
            .alpha_per_stick(12.0)
            .lags(0.5, 0.6, 0.8, 2.0)
            .build()
    }

    pub fn trainer_autopilot() -> ConfigResult<CommonController> {
        AutopilotConfig::from_toml_str(TRAINER_AUTOPILOT)?.build_controller()
    }

    /// Box pattern with a climb on the second leg and a Mach leg at altitude.
    pub fn box_route() -> Route {
        Route::from_waypoints([
            Waypoint::new(34.90, -117.90, 3_000.0).label("START").speed(WaypointSpeed::Ktas(290.0)),
            Waypoint::new(35.00, -117.90, 3_000.0).label("NORTH").speed(WaypointSpeed::Ktas(290.0)),
            Waypoint::new(35.00, -117.75, 3_500.0)
                .label("EAST")
                .speed(WaypointSpeed::Kcas(260.0))
                .max_turn_g(TurnG::Pilot(2.5)),
            Waypoint::new(34.90, -117.75, 3_500.0).label("SOUTH").speed(WaypointSpeed::Mach(0.45)),
            Waypoint::new(34.90, -117.85, 3_000.0).label("HOME").speed(WaypointSpeed::Ktas(280.0)),
        ])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::geodesy::Lla;

    fn cruise() -> AircraftState {
        AircraftState::level(Lla::new(35.0, -117.0, 3_000.0), 150.0, 0.0)
    }

    #[test]
    fn alpha_at_one_g_balances_weight() {
        let ac = presets::trainer();
        let s = cruise();
        let view = AircraftView::new(&ac, &s);
        let alpha = view.alpha_at_g(1.0).to_radians();
        let q = 0.5 * atmosphere::isa(3_000.0).density * 150.0 * 150.0;
        let lift = q * ac.wing_area * ac.cl_alpha * alpha;
        assert!((lift - ac.weight()).abs() / ac.weight() < 1e-9);
        assert!(view.alpha_at_g(1.0) > 1.0 && view.alpha_at_g(1.0) < 6.0);
    }

    #[test]
    fn beta_for_positive_g_is_negative() {
        let ac = presets::trainer();
        let s = cruise();
        assert!(AircraftView::new(&ac, &s).beta_at_g(0.5) < 0.0);
    }

    #[test]
    fn kinematics_report_imperial_units() {
        let ac = presets::trainer();
        let s = cruise();
        let k = AircraftView::new(&ac, &s).kinematics();
        assert!((k.speed_fps - 492.13).abs() < 0.1);
        assert!((k.ktas - 291.6).abs() < 0.5, "ktas {}", k.ktas);
        assert!(k.kias < k.ktas);
        assert!(k.vert_speed_fpm.abs() < 1e-9);
        assert!(k.dynamic_pressure_psf > 150.0 && k.dynamic_pressure_psf < 250.0);
    }

    #[test]
    fn throttle_bias_covers_cruise_drag() {
        let ac = presets::trainer();
        let mut s = cruise();
        s.alpha = 2.8_f64.to_radians();
        let bias = AircraftView::new(&ac, &s).thrust_potential().throttle_bias(2.8);
        assert!(bias > 0.05 && bias < 0.5, "bias {}", bias);
    }

    #[test]
    fn trainer_autopilot_preset_loads() {
        let c = presets::trainer_autopilot().unwrap();
        assert!(!c.pid_gain_table(crate::gnc::PidType::Alpha).is_empty());
    }

    #[test]
    fn box_route_closes_near_start() {
        let route = presets::box_route();
        assert_eq!(route.len(), 5);
        let start = route.first().and_then(|id| route.waypoint(id)).unwrap();
        assert_eq!(start.label.as_deref(), Some("START"));
    }
}
