use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector2;
use tracing::{debug, warn};

use crate::physics::geodesy::{initial_heading_rad, normalize_deg};
use crate::physics::units::{fps_to_mps, FPS_PER_KNOT, FT_PER_M, G_FTPS2};
use crate::route::geometry::{self, BankTurnParams, RouteLeg, VehicleTrack, YawTurnParams};
use crate::route::{NavData, Route, WaypointRefs, WaypointSpeed};

use super::action::{AutopilotAction, ControlMethod, LateralMode, SpeedMode, StabilizingMode, VerticalMode};
use super::controls::AutopilotControls;
use super::gain_table::{GainSet, GainTable};
use super::limits::AutopilotLimitsAndSettings;
use super::pid::{PidValues, DT_BASE_TICK};
use super::pid_bank::{LoopRate, PidBank, PidType};
use super::vehicle::{AircraftQuery, Environment, KinematicState};

pub const DEFAULT_MIN_TAXI_TURN_RADIUS_FT: f64 = 50.0;

const MAX_PITCH_FOR_TURN_DEG: f64 = 89.0;
const MIN_TURN_SPEED_FPS: f64 = 0.001;
const MAX_TAXI_RADIUS_FT: f64 = 1.0e10;
const DIFFERENTIAL_BRAKE_THRESHOLD: f64 = 0.01;
const COMBINED_BRAKE_SHARE: f64 = 0.8;

// ---------------------------------------------------------------------------
// Controller interface
// ---------------------------------------------------------------------------

/// Everything an update needs from outside the controller.
#[derive(Clone, Copy)]
pub struct ControlContext<'a> {
    pub sim_time: f64, // s
    pub vehicle: Option<&'a dyn AircraftQuery>,
    pub environment: Option<&'a dyn Environment>,
    pub route: Option<&'a Route>,
}

impl<'a> ControlContext<'a> {
    pub fn new(sim_time: f64) -> Self {
        Self { sim_time, vehicle: None, environment: None, route: None }
    }

    pub fn vehicle(mut self, vehicle: &'a dyn AircraftQuery) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    pub fn environment(mut self, environment: &'a dyn Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn route(mut self, route: &'a Route) -> Self {
        self.route = Some(route);
        self
    }
}

/// Trait for flight controllers.
///
/// Implement this to plug a different autopilot into the simulation loop.
pub trait Controller {
    /// Compute normalized control outputs for this tick.
    fn control(&mut self, ctx: &ControlContext) -> AutopilotControls;

    /// Reset controller internal state (PID integrators, nav data).
    fn reset(&mut self) {}

    /// Human-readable name for logging/display.
    fn name(&self) -> &str {
        "unnamed"
    }
}

// ---------------------------------------------------------------------------
// Loop factors: nested-loop cadence per channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopFactors {
    pub vertical_middle: u8,
    pub vertical_outer: u8,
    pub lateral_middle: u8,
    pub lateral_outer: u8,
    pub speed_middle: u8,
    pub speed_outer: u8,
}

impl Default for LoopFactors {
    fn default() -> Self {
        Self {
            vertical_middle: 1,
            vertical_outer: 1,
            lateral_middle: 1,
            lateral_outer: 1,
            speed_middle: 1,
            speed_outer: 1,
        }
    }
}

impl LoopFactors {
    /// Update interval for PIDs running at `rate`. Inner loops run every tick.
    pub fn interval(&self, rate: LoopRate) -> Option<f64> {
        let middle = |f: u8| f64::from(f) * DT_BASE_TICK;
        match rate {
            LoopRate::Inner => None,
            LoopRate::VerticalMiddle => Some(middle(self.vertical_middle)),
            LoopRate::VerticalOuter => Some(middle(self.vertical_middle) * f64::from(self.vertical_outer)),
            LoopRate::LateralMiddle => Some(middle(self.lateral_middle)),
            LoopRate::LateralOuter => Some(middle(self.lateral_middle) * f64::from(self.lateral_outer)),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-tick bookkeeping
// ---------------------------------------------------------------------------

/// Alpha/beta limits and 1-g bias recomputed at the start of every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DynamicLimits {
    pub alpha_min: f64, // deg
    pub alpha_max: f64, // deg
    pub beta_max: f64,  // deg
    pub g_bias_g: f64,
    pub g_bias_alpha: f64, // deg
}

/// Integrated attitude changes used by the delta-roll and delta-pitch modes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngleDeltas {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

/// Last intermediate command issued by each cascade stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LastCommands {
    pub aim_heading_deg: f64,
    pub bank_deg: f64,
    pub roll_rate_dps: f64,
    pub yaw_rate_dps: f64,
    pub beta_deg: f64,
    pub vert_speed_fpm: f64,
    pub alpha_deg: f64,
    pub taxi_yaw_rate_dps: f64,
}

struct Tick<'a> {
    t: f64,
    dt: f64,
    state: KinematicState,
    vehicle: &'a dyn AircraftQuery,
    environment: Option<&'a dyn Environment>,
    route: Option<&'a Route>,
}

// ---------------------------------------------------------------------------
// Turn helpers
// ---------------------------------------------------------------------------

/// Yaw rate that flies a circle of `radius_ft` at `speed_fps`, deg/s.
pub fn turn_rate_for_radius_dps(speed_fps: f64, radius_ft: f64) -> f64 {
    let radius_ft = if radius_ft < 0.01 { 0.01 } else { radius_ft };
    (speed_fps / radius_ft).to_degrees()
}

/// Circle radius flown at `rate_dps` and `speed_fps`, ft.
pub fn turn_radius_for_rate_ft(speed_fps: f64, rate_dps: f64) -> f64 {
    if rate_dps.abs() < 1e-8 {
        return 1e20;
    }
    speed_fps / rate_dps.to_radians()
}

// ---------------------------------------------------------------------------
// CommonController: cascaded lateral / vertical / speed autopilot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommonController {
    control_method: ControlMethod,
    pids: PidBank,
    loop_factors: LoopFactors,
    default_limits: AutopilotLimitsAndSettings,
    current_limits: AutopilotLimitsAndSettings,
    activity: Option<AutopilotAction>,
    controls: AutopilotControls,
    nav: NavData,
    waypoint_achieved: bool,
    turning: bool,
    taxi_mode: bool,
    min_taxi_turn_radius_ft: f64,
    desired_taxi_turn_radius_ft: f64,
    last_update_time: f64,
    deltas: AngleDeltas,
    limits: DynamicLimits,
    last: LastCommands,
    combined_wheel_braking: f64,
    differential_braking: (f64, f64), // left, right
}

impl Default for CommonController {
    fn default() -> Self {
        Self::new(ControlMethod::default())
    }
}

impl CommonController {
    pub fn new(control_method: ControlMethod) -> Self {
        Self {
            control_method,
            pids: PidBank::new(),
            loop_factors: LoopFactors::default(),
            default_limits: AutopilotLimitsAndSettings::default(),
            current_limits: AutopilotLimitsAndSettings::default(),
            activity: None,
            controls: AutopilotControls::default(),
            nav: NavData::default(),
            waypoint_achieved: false,
            turning: false,
            taxi_mode: false,
            min_taxi_turn_radius_ft: DEFAULT_MIN_TAXI_TURN_RADIUS_FT,
            desired_taxi_turn_radius_ft: DEFAULT_MIN_TAXI_TURN_RADIUS_FT,
            last_update_time: 0.0,
            deltas: AngleDeltas::default(),
            limits: DynamicLimits::default(),
            last: LastCommands::default(),
            combined_wheel_braking: 0.0,
            differential_braking: (0.0, 0.0),
        }
    }

    /// Controller with a configured PID bank and limits. Current limits start
    /// as a copy of the defaults.
    pub fn with_settings(
        control_method: ControlMethod,
        pids: PidBank,
        loop_factors: LoopFactors,
        limits: AutopilotLimitsAndSettings,
    ) -> Self {
        let mut c = Self::new(control_method);
        c.pids = pids;
        c.default_limits = limits;
        c.current_limits = limits;
        c.set_loop_factors(loop_factors);
        c
    }

    pub fn control_method(&self) -> ControlMethod {
        self.control_method
    }

    pub fn set_control_method(&mut self, method: ControlMethod) {
        self.control_method = method;
    }

    pub fn loop_factors(&self) -> LoopFactors {
        self.loop_factors
    }

    /// Inject loop intervals into every PID that has no interval yet.
    pub fn set_loop_factors(&mut self, factors: LoopFactors) {
        self.loop_factors = factors;
        for (t, pid) in self.pids.iter_mut() {
            if let Some(interval) = factors.interval(t.loop_rate()) {
                pid.try_set_update_interval(interval);
            }
        }
    }

    // -- activity -----------------------------------------------------------

    pub fn set_current_activity(&mut self, action: AutopilotAction) {
        if self.waypoint_achieved {
            self.waypoint_achieved = false;
        } else {
            self.turning = false;
        }
        debug!(
            lateral = ?action.lateral,
            vertical = ?action.vertical,
            speed = ?action.speed,
            "autopilot activity set"
        );
        self.activity = Some(action);
    }

    pub fn current_activity(&self) -> Option<&AutopilotAction> {
        self.activity.as_ref()
    }

    pub fn waypoint_achieved(&self) -> bool {
        self.waypoint_achieved
    }

    /// True from waypoint achievement until the turn onto the next leg
    /// completes or an activity arrives without a fresh achievement.
    pub fn turning(&self) -> bool {
        self.turning
    }

    pub fn nav_data(&self) -> &NavData {
        &self.nav
    }

    pub fn controls(&self) -> &AutopilotControls {
        &self.controls
    }

    pub fn dynamic_limits(&self) -> &DynamicLimits {
        &self.limits
    }

    pub fn last_commands(&self) -> &LastCommands {
        &self.last
    }

    // -- taxi ---------------------------------------------------------------

    pub fn set_taxi_mode(&mut self, active: bool) {
        self.taxi_mode = active;
    }

    pub fn taxi_mode(&self) -> bool {
        self.taxi_mode
    }

    pub fn set_min_taxi_turn_radius(&mut self, radius_ft: f64) {
        self.min_taxi_turn_radius_ft = radius_ft;
        self.desired_taxi_turn_radius_ft = radius_ft;
    }

    pub fn min_taxi_turn_radius_ft(&self) -> f64 {
        self.min_taxi_turn_radius_ft
    }

    pub fn set_desired_taxi_radius(&mut self, radius_ft: f64) {
        if radius_ft <= self.min_taxi_turn_radius_ft {
            warn!(
                requested_ft = radius_ft,
                minimum_ft = self.min_taxi_turn_radius_ft,
                "taxi radius below minimum, using minimum"
            );
            self.desired_taxi_turn_radius_ft = self.min_taxi_turn_radius_ft;
        } else {
            self.desired_taxi_turn_radius_ft = radius_ft;
        }
    }

    pub fn desired_taxi_radius_ft(&self) -> f64 {
        self.desired_taxi_turn_radius_ft
    }

    /// Wheel braking requested by the caller, added to the autopilot's own
    /// combined braking.
    pub fn set_differential_braking(&mut self, left: f64, right: f64) {
        self.differential_braking = (left, right);
    }

    // -- delta angles -------------------------------------------------------

    /// Integrate attitude changes, rad.
    pub fn angle_deltas(&mut self, d_yaw: f64, d_pitch: f64, d_roll: f64) {
        self.deltas.yaw_deg += d_yaw.to_degrees();
        self.deltas.pitch_deg += d_pitch.to_degrees();
        self.deltas.roll_deg += d_roll.to_degrees();
    }

    pub fn integrated_deltas(&self) -> &AngleDeltas {
        &self.deltas
    }

    pub fn reset_delta_yaw(&mut self) {
        self.deltas.yaw_deg = 0.0;
    }

    pub fn reset_delta_pitch(&mut self) {
        self.deltas.pitch_deg = 0.0;
    }

    pub fn reset_delta_roll(&mut self) {
        self.deltas.roll_deg = 0.0;
    }

    pub fn reset_lateral_deltas(&mut self) {
        self.reset_delta_yaw();
        self.reset_delta_roll();
    }

    pub fn reset_all_deltas(&mut self) {
        self.deltas = AngleDeltas::default();
    }

    // -- limits -------------------------------------------------------------

    pub fn default_limits_and_settings(&self) -> &AutopilotLimitsAndSettings {
        &self.default_limits
    }

    pub fn current_limits_and_settings(&self) -> &AutopilotLimitsAndSettings {
        &self.current_limits
    }

    pub fn current_limits_mut(&mut self) -> &mut AutopilotLimitsAndSettings {
        &mut self.current_limits
    }

    pub fn set_current_limits_and_settings(&mut self, limits: AutopilotLimitsAndSettings) {
        self.current_limits = limits;
    }

    pub fn revert_limits_to_defaults(&mut self) {
        self.current_limits = self.default_limits;
    }

    pub fn enable_afterburner_auto_control(&mut self, on: bool) {
        self.current_limits.enable_afterburner_auto_control = on;
    }

    pub fn set_afterburner_threshold(&mut self, threshold: f64) {
        self.current_limits.afterburner_threshold = threshold;
    }

    pub fn afterburner_threshold(&self) -> f64 {
        self.current_limits.afterburner_threshold
    }

    pub fn enable_speed_brake_auto_control(&mut self, on: bool) {
        self.current_limits.enable_speed_brake_auto_control = on;
    }

    pub fn set_speed_brake_threshold(&mut self, threshold: f64) {
        self.current_limits.speed_brake_threshold = threshold;
    }

    pub fn speed_brake_threshold(&self) -> f64 {
        self.current_limits.speed_brake_threshold
    }

    // -- PID tuning surface -------------------------------------------------

    pub fn pids(&self) -> &PidBank {
        &self.pids
    }

    pub fn pid_gain_table(&self, t: PidType) -> &GainTable {
        self.pids[t].gain_table()
    }

    pub fn set_pid_gain_table(&mut self, t: PidType, table: GainTable) {
        self.pids[t].set_gain_table(table);
    }

    /// Ordered insert. False when the controlling value already exists.
    pub fn add_pid_gain_element(&mut self, t: PidType, gains: GainSet) -> bool {
        self.pids[t].gain_table_mut().insert(gains)
    }

    pub fn set_pid_kp(&mut self, t: PidType, controlling_value: f64, kp: f64) -> bool {
        self.pids[t].gain_table_mut().set_kp(controlling_value, kp)
    }

    pub fn set_pid_ki(&mut self, t: PidType, controlling_value: f64, ki: f64) -> bool {
        self.pids[t].gain_table_mut().set_ki(controlling_value, ki)
    }

    pub fn set_pid_kd(&mut self, t: PidType, controlling_value: f64, kd: f64) -> bool {
        self.pids[t].gain_table_mut().set_kd(controlling_value, kd)
    }

    pub fn set_pid_lowpass_alpha(&mut self, t: PidType, controlling_value: f64, alpha: f64) -> bool {
        self.pids[t].gain_table_mut().set_lowpass_alpha(controlling_value, alpha)
    }

    pub fn set_pid_max_accum(&mut self, t: PidType, controlling_value: f64, max_accum: f64) -> bool {
        self.pids[t].gain_table_mut().set_max_accum(controlling_value, max_accum)
    }

    pub fn pid_values(&self, t: PidType) -> PidValues {
        self.pids[t].values()
    }

    pub fn pid_group_values(&self) -> Vec<(PidType, PidValues)> {
        self.pids.values()
    }

    pub fn reset_accumulated_pid_data(&mut self) {
        self.pids.reset_states();
    }

    pub fn reset_all_pid_timings(&mut self) {
        self.pids.reset_timings();
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Run one autopilot tick. Without a vehicle the outputs are neutral.
    pub fn update(&mut self, ctx: &ControlContext) -> AutopilotControls {
        let Some(vehicle) = ctx.vehicle else {
            self.controls = AutopilotControls::default();
            return self.controls;
        };

        let tk = Tick {
            t: ctx.sim_time,
            dt: ctx.sim_time - self.last_update_time,
            state: vehicle.kinematics(),
            vehicle,
            environment: ctx.environment,
            route: ctx.route,
        };

        self.calc_alpha_beta_g_limits(&tk);
        self.pids.set_controlling_value(tk.state.dynamic_pressure_psf);
        self.combined_wheel_braking = 0.0;

        let action = self.activity.unwrap_or_default();
        if self.control_method.is_bank_to_turn() {
            self.update_bank_to_turn(&tk, &action);
        } else {
            self.update_yaw_to_turn(&tk, &action);
        }

        let (left, right) = self.differential_braking;
        if left > DIFFERENTIAL_BRAKE_THRESHOLD || right > DIFFERENTIAL_BRAKE_THRESHOLD {
            self.controls.wheel_brake_left = left + COMBINED_BRAKE_SHARE * self.combined_wheel_braking;
            self.controls.wheel_brake_right = right + COMBINED_BRAKE_SHARE * self.combined_wheel_braking;
        } else {
            self.controls.wheel_brake_left = self.combined_wheel_braking;
            self.controls.wheel_brake_right = self.combined_wheel_braking;
        }

        self.controls.enforce_limits();
        self.last_update_time = tk.t;
        self.controls
    }

    fn update_bank_to_turn(&mut self, tk: &Tick, action: &AutopilotAction) {
        if self.taxi_mode {
            self.process_taxi_lateral(tk, action);
        } else {
            let mut yaw_controlled = false;
            match action.lateral {
                LateralMode::Waypoint => self.roll_waypoint(tk, &action.waypoints),
                LateralMode::Heading(h) => {
                    let max_bank_rad = self.current_limits.bank_angle_max.to_radians();
                    self.roll_heading(tk, h, max_bank_rad);
                }
                LateralMode::Point => self.roll_point(tk, &action.waypoints),
                LateralMode::RollRate(r) => self.roll_rate(tk, r),
                LateralMode::Bank(b) => self.bank(tk, b),
                LateralMode::DeltaRoll(d) => self.delta_roll(tk, d),
                LateralMode::YawGLoad(g) => {
                    self.yaw_g_load(tk, g);
                    yaw_controlled = true;
                }
                LateralMode::YawRate(r) => {
                    self.yaw_rate(tk, r);
                    yaw_controlled = true;
                }
                LateralMode::Beta(b) => {
                    self.beta(tk, b);
                    yaw_controlled = true;
                }
                LateralMode::NoControl => self.controls.stick_right = 0.0,
            }

            if !yaw_controlled {
                match action.stabilizing {
                    StabilizingMode::YawGLoad(g) => self.yaw_g_load(tk, g),
                    StabilizingMode::YawRate(r) => self.yaw_rate(tk, r),
                    StabilizingMode::Beta(b) => self.beta(tk, b),
                    StabilizingMode::Undefined if self.control_method == ControlMethod::BankToTurnWithYaw => {
                        self.beta(tk, 0.0)
                    }
                    _ => self.controls.rudder_right = 0.0,
                }
            }
        }

        self.process_vertical(tk, action);
        self.process_speed(tk, action);
    }

    fn update_yaw_to_turn(&mut self, tk: &Tick, action: &AutopilotAction) {
        if self.taxi_mode {
            self.process_taxi_lateral(tk, action);
        } else {
            let mut roll_controlled = false;
            match action.lateral {
                LateralMode::Waypoint => self.yaw_waypoint(tk, &action.waypoints),
                LateralMode::Heading(h) => self.yaw_heading(tk, h),
                LateralMode::Point => self.yaw_point(tk, &action.waypoints),
                LateralMode::YawGLoad(g) => self.yaw_g_load(tk, g),
                LateralMode::YawRate(r) => self.yaw_rate(tk, r),
                LateralMode::Beta(b) => self.beta(tk, b),
                LateralMode::RollRate(r) => {
                    self.roll_rate(tk, r);
                    roll_controlled = true;
                }
                LateralMode::Bank(b) => {
                    self.bank(tk, b);
                    roll_controlled = true;
                }
                LateralMode::DeltaRoll(d) => {
                    self.delta_roll(tk, d);
                    roll_controlled = true;
                }
                LateralMode::NoControl => self.controls.rudder_right = 0.0,
            }

            if !roll_controlled {
                match action.stabilizing {
                    StabilizingMode::RollRate(r) => self.roll_rate(tk, r),
                    StabilizingMode::Bank(b) => self.bank(tk, b),
                    StabilizingMode::DeltaRoll(d) => self.delta_roll(tk, d),
                    StabilizingMode::Undefined if self.control_method == ControlMethod::YawToTurnRollRate => {
                        self.roll_rate(tk, 0.0)
                    }
                    StabilizingMode::Undefined if self.control_method == ControlMethod::YawToTurnZeroBank => {
                        self.bank(tk, 0.0)
                    }
                    _ => self.controls.stick_right = 0.0,
                }
            }
        }

        self.process_vertical(tk, action);
        self.process_speed(tk, action);
    }

    // -----------------------------------------------------------------------
    // Dynamic limits
    // -----------------------------------------------------------------------

    fn calc_alpha_beta_g_limits(&mut self, tk: &Tick) {
        let l = &self.current_limits;
        let v = tk.vehicle;

        let cos_roll = tk.state.roll_deg.to_radians().cos();
        let mut g_bias = if cos_roll == 0.0 { l.pitch_g_load_max } else { 1.0 / cos_roll };
        g_bias *= tk.state.pitch_deg.to_radians().cos();
        let g_bias = g_bias.max(l.pitch_g_load_min).min(l.pitch_g_load_max);

        let alpha_max = v.alpha_at_g(l.pitch_g_load_max).min(l.alpha_max);
        let mut alpha_min = v.alpha_at_g(l.pitch_g_load_min).max(l.alpha_min);
        if alpha_max < alpha_min {
            alpha_min = alpha_max;
        }

        let beta_max = if self.control_method.is_yaw_to_turn() {
            l.beta_max.min(v.beta_at_g(l.yaw_g_load_max).abs())
        } else {
            l.beta_max
        };

        self.limits = DynamicLimits {
            alpha_min,
            alpha_max,
            beta_max,
            g_bias_g: g_bias,
            g_bias_alpha: v.alpha_at_g(g_bias),
        };
    }

    // -----------------------------------------------------------------------
    // Waypoint navigation
    // -----------------------------------------------------------------------

    fn vehicle_track(state: &KinematicState, speed_mps: f64) -> VehicleTrack {
        let hdg = state.heading_rad();
        let current_mps = state.speed_mps();
        VehicleTrack {
            position: state.position,
            vel_ne_mps: Vector2::new(current_mps * hdg.cos(), current_mps * hdg.sin()),
            heading_rad: hdg,
            speed_mps,
        }
    }

    fn resolve_leg<'r>(tk: &Tick<'r>, refs: &WaypointRefs) -> Option<RouteLeg<'r>> {
        tk.route.and_then(|route| RouteLeg::resolve(route, refs))
    }

    /// Record this tick's achievement result. The flag is level, not latched.
    fn mark_achieved(&mut self, refs: &WaypointRefs, achieved: bool) {
        self.waypoint_achieved = achieved;
        if achieved {
            self.turning = true;
            debug!(waypoint = ?refs.curr, "waypoint achieved");
        } else if !self.nav.execute_turn {
            self.turning = false;
        }
    }

    fn clear_leg_state(&mut self) {
        self.nav.execute_turn = false;
        self.waypoint_achieved = false;
        self.turning = false;
    }

    fn aim_heading_for_leg(&self, tk: &Tick, leg: &RouteLeg) -> f64 {
        if leg.curr.follow_horizontal_track {
            self.nav.aim_heading_rad.to_degrees()
        } else {
            initial_heading_rad(&tk.state.position, &leg.curr.position).to_degrees()
        }
    }

    /// Aim heading toward the active leg, deg. Also flags waypoint
    /// achievement.
    fn waypoint_aim_heading_deg(&mut self, tk: &Tick, refs: &WaypointRefs) -> f64 {
        let Some(leg) = Self::resolve_leg(tk, refs) else {
            self.clear_leg_state();
            return self.nav.aim_heading_rad.to_degrees();
        };

        let l = &self.current_limits;
        let allowable = self.default_limits.route_allowable_angle_error;

        let achieved = if self.control_method.is_bank_to_turn() {
            let wp_alt_m = leg.curr.position.alt;
            let speed_mps = match tk.environment {
                Some(env) => fps_to_mps(leg.curr.speed.to_fps(env, wp_alt_m)),
                None => tk.state.speed_mps(),
            };
            let params = BankTurnParams {
                roll_in_multiplier: l.turn_roll_in_multiplier,
                allowable_angle_error_rad: allowable,
                max_bank_rad: l.bank_angle_max.to_radians(),
                max_roll_rate_rad_s: l.roll_rate_max.to_radians(),
                max_g: l.pitch_g_load_max,
            };
            let track = Self::vehicle_track(&tk.state, speed_mps);
            geometry::aim_heading_and_bank_angle(&leg, &track, &mut self.nav, &params, tk.dt)
        } else {
            let params = YawTurnParams { allowable_angle_error_rad: allowable, max_g: l.pitch_g_load_max };
            let track = Self::vehicle_track(&tk.state, tk.state.speed_mps());
            geometry::yaw_aim_heading_angle(&leg, &track, &mut self.nav, &params, tk.dt)
        };

        self.mark_achieved(refs, achieved);
        self.aim_heading_for_leg(tk, &leg)
    }

    /// Heading straight at the current waypoint, deg.
    fn point_heading_deg(&self, tk: &Tick, refs: &WaypointRefs) -> Option<f64> {
        let wp = tk.route?.waypoint(refs.curr?)?;
        Some(initial_heading_rad(&tk.state.position, &wp.position).to_degrees())
    }

    // -----------------------------------------------------------------------
    // Lateral: roll channel
    // -----------------------------------------------------------------------

    fn roll_waypoint(&mut self, tk: &Tick, refs: &WaypointRefs) {
        let aim_deg = self.waypoint_aim_heading_deg(tk, refs);
        let max_bank_rad = self.nav.commanded_bank_rad.min(self.current_limits.bank_angle_max.to_radians());
        self.roll_heading(tk, aim_deg, max_bank_rad);
    }

    fn roll_point(&mut self, tk: &Tick, refs: &WaypointRefs) {
        let hdg = self.point_heading_deg(tk, refs).unwrap_or(tk.state.heading_deg);
        let max_bank_rad = self.current_limits.bank_angle_max.to_radians();
        self.roll_heading(tk, hdg, max_bank_rad);
    }

    /// Turn toward `heading_deg` by commanding bank. The outer PID works in
    /// turn rate; the rate is turned back into bank through the level-turn
    /// radius relation.
    fn roll_heading(&mut self, tk: &Tick, heading_deg: f64, max_bank_rad: f64) {
        self.last.aim_heading_deg = heading_deg;
        if max_bank_rad < f64::EPSILON {
            self.bank(tk, 0.0);
            return;
        }

        let s = &tk.state;
        let hdg_err = normalize_deg(heading_deg - s.heading_deg);

        let max_g = self.current_limits.pitch_g_load_max;
        if max_g < f64::EPSILON {
            self.bank(tk, 0.0);
            return;
        }

        let (max_bank_rad, mut lat_g) = if max_bank_rad > FRAC_PI_2 {
            (FRAC_PI_2, max_g)
        } else {
            (max_bank_rad, max_bank_rad.tan())
        };

        let pitch = s.pitch_deg.clamp(-MAX_PITCH_FOR_TURN_DEG, MAX_PITCH_FOR_TURN_DEG).to_radians();
        let pitch_factor = 1.0 / pitch.cos();
        lat_g = (lat_g * pitch_factor).min(max_g);

        let spd = s.speed_fps;
        if spd < MIN_TURN_SPEED_FPS {
            self.bank(tk, 0.0);
            return;
        }

        let radius_ft = spd * spd / (G_FTPS2 * lat_g);
        let time_to_circle = 2.0 * PI * radius_ft / spd;
        if time_to_circle < f64::EPSILON {
            self.bank(tk, max_bank_rad.to_degrees().copysign(hdg_err));
            return;
        }
        let max_turn_rate = 360.0 / time_to_circle;

        let rate = self.pids[PidType::RollHeading].from_error_with_limits(
            hdg_err,
            s.heading_deg,
            tk.t,
            -max_turn_rate,
            max_turn_rate,
        );
        if rate.abs() < f64::EPSILON {
            self.bank(tk, 0.0);
            return;
        }

        let time_to_circle = 360.0 / rate.abs();
        let radius_ft = time_to_circle * spd / (2.0 * PI);
        let lat_g = spd * spd / (radius_ft * G_FTPS2);
        let bank_max = self.current_limits.bank_angle_max;
        let bank_deg = lat_g.atan2(pitch_factor).to_degrees().copysign(rate).max(-bank_max).min(bank_max);

        self.bank(tk, bank_deg);
    }

    fn bank(&mut self, tk: &Tick, bank_deg: f64) {
        let l = &self.current_limits;
        let bank_deg = bank_deg.max(-l.bank_angle_max).min(l.bank_angle_max);
        let err = normalize_deg(bank_deg - tk.state.roll_deg);
        let rr_max = l.roll_rate_max;
        let rate = self.pids[PidType::BankAngle].from_error_with_limits(err, tk.state.roll_deg, tk.t, -rr_max, rr_max);
        self.roll_rate(tk, rate);
        self.last.bank_deg = bank_deg;
    }

    fn roll_rate(&mut self, tk: &Tick, rate_dps: f64) {
        self.last.roll_rate_dps = rate_dps;
        let rr_max = self.current_limits.roll_rate_max;
        let rate_dps = rate_dps.max(-rr_max).min(rr_max);
        self.controls.stick_right = self.pids[PidType::RollRate].from_target(rate_dps, tk.state.roll_rate_dps, tk.t);
    }

    fn delta_roll(&mut self, tk: &Tick, delta_deg: f64) {
        let rr_max = self.current_limits.roll_rate_max;
        let rate = self.pids[PidType::DeltaRoll].from_target_with_limits(
            delta_deg,
            self.deltas.roll_deg,
            tk.t,
            -rr_max,
            rr_max,
        );
        self.roll_rate(tk, rate);
    }

    // -----------------------------------------------------------------------
    // Lateral: yaw channel
    // -----------------------------------------------------------------------

    fn yaw_waypoint(&mut self, tk: &Tick, refs: &WaypointRefs) {
        let aim_deg = self.waypoint_aim_heading_deg(tk, refs);
        self.yaw_heading(tk, aim_deg);
    }

    fn yaw_point(&mut self, tk: &Tick, refs: &WaypointRefs) {
        let hdg = self.point_heading_deg(tk, refs).unwrap_or(tk.state.heading_deg);
        self.yaw_heading(tk, hdg);
    }

    fn yaw_heading(&mut self, tk: &Tick, heading_deg: f64) {
        self.last.aim_heading_deg = heading_deg;
        let err = normalize_deg(heading_deg - tk.state.heading_deg);
        let yr_max = self.current_limits.yaw_rate_max;
        let rate = self.pids[PidType::YawHeading].from_error_with_limits(
            err,
            tk.state.heading_deg,
            tk.t,
            -yr_max,
            yr_max,
        );
        self.yaw_rate(tk, rate);
    }

    fn yaw_rate(&mut self, tk: &Tick, rate_dps: f64) {
        let yr_max = self.current_limits.yaw_rate_max;
        let cmd = rate_dps.max(-yr_max).min(yr_max);

        if self.control_method.is_yaw_to_turn() {
            let g = tk.state.speed_fps * cmd.to_radians() / G_FTPS2;
            self.pids[PidType::YawRate].set_bias(tk.vehicle.beta_at_g(g));
        }

        let beta_lim = self.limits.beta_max;
        let beta = -self.pids[PidType::YawRate].from_target_with_limits(
            cmd,
            tk.state.yaw_rate_dps,
            tk.t,
            -beta_lim,
            beta_lim,
        );
        self.beta(tk, beta);
        self.last.yaw_rate_dps = rate_dps;
    }

    fn yaw_g_load(&mut self, tk: &Tick, g: f64) {
        let beta = tk.vehicle.beta_at_g(g);
        self.beta(tk, beta);
    }

    fn beta(&mut self, tk: &Tick, beta_deg: f64) {
        let beta_lim = self.limits.beta_max;
        let cmd = beta_deg.max(-beta_lim).min(beta_lim);

        if self.control_method.is_yaw_to_turn() {
            if let Some(ff) = tk.vehicle.rudder_for_zero_moment(cmd) {
                self.pids[PidType::Beta].set_feed_forward(ff);
            }
        }

        self.controls.rudder_right = -self.pids[PidType::Beta].from_target(cmd, tk.state.beta_deg, tk.t);
        self.last.beta_deg = cmd;
    }

    // -----------------------------------------------------------------------
    // Lateral: taxi
    // -----------------------------------------------------------------------

    fn process_taxi_lateral(&mut self, tk: &Tick, action: &AutopilotAction) {
        match action.lateral {
            LateralMode::Waypoint => self.taxi_waypoint(tk, &action.waypoints),
            LateralMode::Heading(h) => {
                let rate = turn_rate_for_radius_dps(tk.state.speed_fps, self.desired_taxi_turn_radius_ft);
                self.taxi_heading(tk, h, rate);
            }
            LateralMode::YawRate(r) => self.taxi_yaw_rate(tk, r),
            _ => {
                self.controls.stick_right = 0.0;
                self.controls.rudder_right = 0.0;
            }
        }
    }

    fn taxi_waypoint(&mut self, tk: &Tick, refs: &WaypointRefs) {
        let spd = tk.state.speed_fps;
        let Some(leg) = Self::resolve_leg(tk, refs) else {
            self.clear_leg_state();
            let aim = self.nav.aim_heading_rad.to_degrees();
            self.taxi_heading(tk, aim, 0.0);
            return;
        };

        let rate_limited_radius = turn_radius_for_rate_ft(spd, self.current_limits.taxi_yaw_rate_max);
        let radius_ft = self.desired_taxi_turn_radius_ft.max(rate_limited_radius);

        let track = Self::vehicle_track(&tk.state, tk.state.speed_mps());
        let achieved = geometry::taxi_aim_heading(&leg, &track, &mut self.nav, radius_ft, tk.dt);
        self.mark_achieved(refs, achieved);

        let aim = self.aim_heading_for_leg(tk, &leg);
        let rate = turn_rate_for_radius_dps(spd, radius_ft);
        self.taxi_heading(tk, aim, rate);
    }

    fn max_taxi_yaw_rate_dps(&self, speed_fps: f64) -> f64 {
        turn_rate_for_radius_dps(speed_fps, self.desired_taxi_turn_radius_ft)
            .min(self.current_limits.taxi_yaw_rate_max)
    }

    fn taxi_heading(&mut self, tk: &Tick, heading_deg: f64, turn_rate_dps: f64) {
        self.last.aim_heading_deg = heading_deg;
        let err = normalize_deg(heading_deg - tk.state.heading_deg);
        let max_rate = turn_rate_dps.abs().min(self.max_taxi_yaw_rate_dps(tk.state.speed_fps));
        let rate = self.pids[PidType::TaxiHeading].from_error_with_limits(
            err,
            tk.state.heading_deg,
            tk.t,
            -max_rate,
            max_rate,
        );
        self.taxi_yaw_rate(tk, rate);
    }

    fn taxi_yaw_rate(&mut self, tk: &Tick, rate_dps: f64) {
        let Some(gear) = tk.vehicle.landing_gear() else {
            return;
        };

        let spd = tk.state.speed_fps;
        let max_rate = self.max_taxi_yaw_rate_dps(spd);
        let cmd = rate_dps.max(-max_rate).min(max_rate);

        if !gear.has_nose_gear() {
            self.controls.rudder_right = 0.0;
            self.controls.nws_steering = 0.0;
            self.controls.nose_wheel_steering = 0.0;
            self.last.taxi_yaw_rate_dps = cmd;
            return;
        }

        let radius_ft = if cmd.abs() < 1e-7 {
            1e20_f64.copysign(cmd)
        } else {
            spd / cmd.to_radians()
        };
        let radius_ft = radius_ft.max(-MAX_TAXI_RADIUS_FT).min(MAX_TAXI_RADIUS_FT);
        let speed_gain = if spd < 1.0 { 0.0 } else { spd.min(1.0) };

        let max_steer = gear.max_steering_angle_deg();
        let bias = if max_steer.abs() > f64::EPSILON {
            gear.steering_angle_for_radius_deg(radius_ft) / max_steer
        } else {
            0.0
        };
        self.pids[PidType::TaxiYawRate].set_bias(bias);

        let steer = self.pids[PidType::TaxiYawRate].from_target_with_limits(cmd, tk.state.yaw_rate_dps, tk.t, -1.0, 1.0)
            * speed_gain;
        self.controls.rudder_right = steer;
        self.controls.nws_steering = steer;
        self.controls.nose_wheel_steering = steer;
        self.last.taxi_yaw_rate_dps = cmd;
    }

    // -----------------------------------------------------------------------
    // Vertical channel
    // -----------------------------------------------------------------------

    fn process_vertical(&mut self, tk: &Tick, action: &AutopilotAction) {
        match action.vertical {
            VerticalMode::Waypoint => self.vertical_waypoint(tk, &action.waypoints),
            VerticalMode::Altitude(ft) => self.altitude(tk, ft),
            VerticalMode::VertSpeed(fpm) => self.vert_speed(tk, fpm),
            VerticalMode::PitchGLoad(g) => self.pitch_g_load(tk, g),
            VerticalMode::PitchAngle(deg) => self.pitch_angle(tk, deg),
            VerticalMode::PitchRate(dps) => self.pitch_rate(tk, dps),
            VerticalMode::FlightPathAngle(deg) => self.flight_path_angle(tk, deg),
            VerticalMode::DeltaPitch(deg) => self.delta_pitch(tk, deg),
            VerticalMode::Alpha(deg) => self.alpha(tk, deg),
            VerticalMode::Point => {}
            VerticalMode::NoControl => self.controls.stick_back = 0.0,
        }
    }

    fn vertical_waypoint(&mut self, tk: &Tick, refs: &WaypointRefs) {
        let wp = |id| tk.route.zip(id).and_then(|(r, id)| r.waypoint(id));
        let curr = wp(refs.curr);
        let prev = wp(refs.prev);

        let cmd_alt_ft = match (curr, prev) {
            (Some(c), _) if !self.nav.execute_turn => c.position.alt * FT_PER_M,
            (_, Some(p)) => p.position.alt * FT_PER_M,
            _ => 0.0,
        };

        match (curr, prev) {
            (Some(c), Some(p)) if c.follow_vertical_track => {
                geometry::vertical_speed(&mut self.nav);
                if c.position.alt != p.position.alt {
                    let fpm = self.nav.vert_speed_mps * FT_PER_M * 60.0;
                    self.vert_speed(tk, fpm);
                } else {
                    self.altitude(tk, cmd_alt_ft);
                }
            }
            _ => self.altitude(tk, cmd_alt_ft),
        }
    }

    fn altitude(&mut self, tk: &Tick, alt_ft: f64) {
        let l = &self.current_limits;
        let (vs_min, vs_max) = (l.vert_speed_min, l.vert_speed_max);
        let vs = self.pids[PidType::Altitude].from_target_with_limits(alt_ft, tk.state.alt_ft(), tk.t, vs_min, vs_max);
        self.vert_speed(tk, vs);
    }

    fn vert_speed(&mut self, tk: &Tick, fpm: f64) {
        let l = &self.current_limits;
        let cmd = fpm.max(l.vert_speed_min).min(l.vert_speed_max);
        let pid = &mut self.pids[PidType::VertSpeed];
        pid.set_bias(self.limits.g_bias_alpha);
        let alpha = pid.from_target_with_limits(
            cmd,
            tk.state.vert_speed_fpm,
            tk.t,
            self.limits.alpha_min,
            self.limits.alpha_max,
        );
        self.alpha(tk, alpha);
        self.last.vert_speed_fpm = fpm;
    }

    fn pitch_g_load(&mut self, tk: &Tick, g: f64) {
        let alpha = tk.vehicle.alpha_at_g(g);
        self.alpha(tk, alpha);
    }

    /// Angle-hold stages share the 1-g alpha bias and the alpha limits.
    fn biased_alpha_stage(&mut self, t: PidType, cmd: f64, current: f64, sim_time: f64) -> f64 {
        let (lo, hi, bias) = (self.limits.alpha_min, self.limits.alpha_max, self.limits.g_bias_alpha);
        let pid = &mut self.pids[t];
        pid.set_bias(bias);
        pid.from_target_with_limits(cmd, current, sim_time, lo, hi)
    }

    fn pitch_angle(&mut self, tk: &Tick, pitch_deg: f64) {
        let cmd = pitch_deg.clamp(-90.0, 90.0);
        let alpha = self.biased_alpha_stage(PidType::PitchAngle, cmd, tk.state.pitch_deg, tk.t);
        self.alpha(tk, alpha);
    }

    fn flight_path_angle(&mut self, tk: &Tick, fpa_deg: f64) {
        let cmd = fpa_deg.clamp(-90.0, 90.0);
        let alpha = self.biased_alpha_stage(PidType::FlightPathAngle, cmd, tk.state.flight_path_angle_deg, tk.t);
        self.alpha(tk, alpha);
    }

    fn delta_pitch(&mut self, tk: &Tick, delta_deg: f64) {
        let current = self.deltas.pitch_deg;
        let alpha = self.biased_alpha_stage(PidType::DeltaPitch, delta_deg, current, tk.t);
        self.alpha(tk, alpha);
    }

    fn pitch_rate(&mut self, tk: &Tick, rate_dps: f64) {
        let l = &self.current_limits;
        let cmd = rate_dps.max(l.pitch_rate_min).min(l.pitch_rate_max);

        let mut g = tk.state.speed_fps * cmd.to_radians() / G_FTPS2;
        if self.control_method.is_bank_to_turn() {
            g += 1.0;
        }
        g *= self.limits.g_bias_g;
        let bias = tk.vehicle.alpha_at_g(g);

        let (lo, hi) = (self.limits.alpha_min, self.limits.alpha_max);
        let pid = &mut self.pids[PidType::PitchRate];
        pid.set_bias(bias);
        let alpha = pid.from_target_with_limits(cmd, tk.state.pitch_rate_dps, tk.t, lo, hi);
        self.alpha(tk, alpha);
    }

    fn alpha(&mut self, tk: &Tick, alpha_deg: f64) {
        let cmd = alpha_deg.max(self.limits.alpha_min).min(self.limits.alpha_max);
        if let Some(ff) = tk.vehicle.stick_back_for_zero_moment(cmd) {
            self.pids[PidType::Alpha].set_feed_forward(ff);
        }
        self.controls.stick_back = self.pids[PidType::Alpha].from_target(cmd, tk.state.alpha_deg, tk.t);
        self.last.alpha_deg = alpha_deg;
    }

    // -----------------------------------------------------------------------
    // Speed channel
    // -----------------------------------------------------------------------

    fn process_speed(&mut self, tk: &Tick, action: &AutopilotAction) {
        // Modes that need the atmosphere command zero without one.
        let cmd = match action.speed {
            SpeedMode::Waypoint if self.taxi_mode => self.waypoint_speed(tk, &action.waypoints, true),
            SpeedMode::Waypoint => self.waypoint_speed(tk, &action.waypoints, false),
            SpeedMode::ForwardAccel(g) => self.forward_accel(tk, g),
            SpeedMode::Kias(kias) => match tk.environment {
                Some(env) => {
                    let fps = env.fps_from_kcas(tk.state.alt_m(), kias);
                    self.fps(tk, fps)
                }
                None => 0.0,
            },
            SpeedMode::Ktas(ktas) => self.fps(tk, ktas * FPS_PER_KNOT),
            SpeedMode::Mach(mach) => match tk.environment {
                Some(env) => {
                    let fps = env.fps_from_mach(tk.state.alt_m(), mach);
                    self.fps(tk, fps)
                }
                None => 0.0,
            },
            SpeedMode::Fps(fps) => self.fps(tk, fps),
            SpeedMode::Throttle(throttle) => throttle,
            SpeedMode::NoControl => return,
        };

        if self.taxi_mode && cmd < 0.0 {
            self.combined_wheel_braking = self.current_limits.speed_brake_threshold - cmd;
        }

        let l = &self.current_limits;
        let c = &mut self.controls;
        if l.enable_afterburner_auto_control && cmd > l.afterburner_threshold {
            c.throttle_afterburner = cmd - l.afterburner_threshold;
            c.throttle_military = 1.0;
            c.speed_brake = 0.0;
        } else if l.enable_speed_brake_auto_control && cmd < l.speed_brake_threshold {
            c.throttle_afterburner = 0.0;
            c.throttle_military = 0.0;
            c.speed_brake = l.speed_brake_threshold - cmd;
        } else {
            c.throttle_afterburner = 0.0;
            c.throttle_military = cmd;
            c.speed_brake = 0.0;
        }
    }

    /// Speed of the waypoint being flown to, or of the one just passed while
    /// turning. Resolved at the vehicle's altitude.
    fn waypoint_speed(&mut self, tk: &Tick, refs: &WaypointRefs, taxi: bool) -> f64 {
        let Some(env) = tk.environment else {
            return 0.0;
        };
        let wp = |id| tk.route.zip(id).and_then(|(r, id)| r.waypoint(id));

        let speed = if self.nav.execute_turn || refs.curr.is_none() {
            wp(refs.prev).map(|p| p.speed).unwrap_or(WaypointSpeed::Fps(0.0))
        } else {
            wp(refs.curr).map(|c| c.speed).unwrap_or(WaypointSpeed::Fps(0.0))
        };

        let fps = speed.to_fps(env, tk.state.alt_m());
        if taxi {
            self.taxi_fps(tk, fps)
        } else {
            self.fps(tk, fps)
        }
    }

    fn throttle_bias(tk: &Tick) -> f64 {
        tk.vehicle.thrust_potential().throttle_bias(tk.state.alpha_deg)
    }

    fn fps(&mut self, tk: &Tick, speed_fps: f64) -> f64 {
        let pid = &mut self.pids[PidType::Speed];
        pid.set_bias(Self::throttle_bias(tk));
        pid.from_target_with_limits(speed_fps, tk.state.speed_fps, tk.t, -1.0, 2.0)
    }

    fn taxi_fps(&mut self, tk: &Tick, speed_fps: f64) -> f64 {
        let cmd = speed_fps.min(self.current_limits.taxi_speed_max);
        let pid = &mut self.pids[PidType::TaxiSpeed];
        pid.set_bias(Self::throttle_bias(tk));
        pid.from_target_with_limits(cmd, tk.state.speed_fps, tk.t, -1.0, 2.0)
    }

    fn forward_accel(&mut self, tk: &Tick, accel_g: f64) -> f64 {
        let l = &self.current_limits;
        let cmd = accel_g.max(l.forward_accel_min).min(l.forward_accel_max);
        let pid = &mut self.pids[PidType::ForwardAccel];
        pid.set_bias(Self::throttle_bias(tk));
        pid.from_target(cmd, tk.state.nx_g, tk.t)
    }
}

impl Controller for CommonController {
    fn control(&mut self, ctx: &ControlContext) -> AutopilotControls {
        self.update(ctx)
    }

    fn reset(&mut self) {
        self.pids.reset_states();
        self.nav = NavData::default();
        self.waypoint_achieved = false;
        self.turning = false;
        self.last = LastCommands::default();
        self.last_update_time = 0.0;
        self.controls = AutopilotControls::default();
    }

    fn name(&self) -> &str {
        "CommonController"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
