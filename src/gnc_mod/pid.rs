use serde::Serialize;

use super::gain_table::{GainSet, GainTable};

/// Base tick of the rigid-body integration, s. Used as the derivative
/// filter reference when a PID has no update interval of its own.
pub const DT_BASE_TICK: f64 = 0.01;

/// Slack on the update-interval test so accumulated tick round-off does not
/// skip a frame.
const INTERVAL_SLACK: f64 = 1e-9;

// ---------------------------------------------------------------------------
// PID Controller (single channel, gain scheduled)
// ---------------------------------------------------------------------------

/// Dynamic state of a PID. Zeroed by [`Pid::reset_state`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    pub setpoint: f64,
    pub current_value: f64,
    pub error: f64,
    pub derivative: f64, // filtered, of the negated process variable
    pub error_accum: f64,
    pub last_value: f64,
    pub last_error: f64,
    pub last_derivative: f64,
    pub prelimited_output: f64,
    pub output: f64,
    pub kp_contribution: f64,
    pub ki_contribution: f64,
    pub kd_contribution: f64,
    pub last_sim_time: f64, // s
}

/// Telemetry snapshot for tuning tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PidValues {
    pub setpoint: f64,
    pub current_value: f64,
    pub kp_value: f64,
    pub ki_value: f64,
    pub kd_value: f64,
    pub feed_forward: f64,
    pub feed_forward_valid: bool,
    pub output_base: f64,
    pub output_limited: f64,
    pub accumulated_error: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Pid {
    gains: GainTable,
    state: PidState,
    bias: f64,
    bias_active: bool,
    controlling_value: f64,
    update_interval: Option<f64>, // s
}

impl Pid {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self::with_gains(GainTable::constant(GainSet::with_pid(kp, ki, kd)))
    }

    pub fn with_gains(gains: GainTable) -> Self {
        Self { gains, ..Self::default() }
    }

    // -- compute entry points -----------------------------------------------

    pub fn from_target(&mut self, setpoint: f64, current: f64, sim_time: f64) -> f64 {
        self.set_inputs(setpoint, current, setpoint - current);
        self.step(sim_time, None)
    }

    pub fn from_target_with_limits(
        &mut self,
        setpoint: f64,
        current: f64,
        sim_time: f64,
        min_output: f64,
        max_output: f64,
    ) -> f64 {
        self.set_inputs(setpoint, current, setpoint - current);
        self.step(sim_time, Some((min_output, max_output)))
    }

    /// For wrapped quantities (heading): the caller supplies the normalized
    /// error, which also becomes the reported setpoint.
    pub fn from_error(&mut self, error: f64, current: f64, sim_time: f64) -> f64 {
        self.set_inputs(error, current, error);
        self.step(sim_time, None)
    }

    pub fn from_error_with_limits(
        &mut self,
        error: f64,
        current: f64,
        sim_time: f64,
        min_output: f64,
        max_output: f64,
    ) -> f64 {
        self.set_inputs(error, current, error);
        self.step(sim_time, Some((min_output, max_output)))
    }

    fn set_inputs(&mut self, setpoint: f64, current: f64, error: f64) {
        self.state.setpoint = setpoint;
        self.state.current_value = current;
        self.state.error = error;
    }

    fn step(&mut self, sim_time: f64, limits: Option<(f64, f64)>) -> f64 {
        let s = &mut self.state;
        let dt = sim_time - s.last_sim_time;
        if dt < self.update_interval.unwrap_or(0.0) - INTERVAL_SLACK {
            return s.output;
        }

        let g = self.gains.interpolate(self.controlling_value);
        let first_pass = s.last_sim_time <= 0.0;

        // Derivative on the process variable, low-pass filtered so the
        // response is roughly independent of the actual call cadence.
        if !first_pass {
            let sampled = -(s.current_value - s.last_value) / dt;
            let alpha = if g.lowpass_alpha.abs() < f64::EPSILON {
                0.0
            } else {
                let tau = self.update_interval.unwrap_or(DT_BASE_TICK)
                    * ((1.0 - g.lowpass_alpha) / g.lowpass_alpha);
                dt / (tau + dt)
            };
            s.derivative = alpha * sampled + (1.0 - alpha) * s.last_derivative;
        }

        let allow_accum = s.error.abs() <= g.max_error_zero && s.error.abs() >= g.min_error_zero;

        // Kt back-calculation from last cycle's clamping error
        let effective_ki = g.ki + g.kt_anti_windup * (s.output - s.prelimited_output);

        if allow_accum && !first_pass {
            s.error_accum += s.error * dt;
        }
        // Compared one bound at a time; a negative or NaN ceiling must not panic.
        s.error_accum = s.error_accum.min(g.max_accum).max(-g.max_accum);

        s.kp_contribution = g.kp * s.error;
        s.ki_contribution = effective_ki * s.error_accum;
        s.kd_contribution = g.kd * s.derivative;

        let bias = if self.bias_active { self.bias } else { 0.0 };
        s.prelimited_output = s.kp_contribution + s.ki_contribution + s.kd_contribution + bias;
        s.output = match limits {
            Some((lo, hi)) => s.prelimited_output.max(lo).min(hi),
            None => s.prelimited_output,
        };

        s.last_value = s.current_value;
        s.last_error = s.error;
        s.last_derivative = s.derivative;
        s.last_sim_time = sim_time;

        s.output
    }

    // -- state management ---------------------------------------------------

    /// Zero all dynamic state, feed-forward bias included. Gains and update
    /// interval are kept.
    pub fn reset_state(&mut self) {
        self.state = PidState::default();
        self.bias = 0.0;
        self.bias_active = false;
    }

    /// Restart timing only. Accumulated error survives.
    pub fn reset_timing(&mut self) {
        self.state.last_sim_time = 0.0;
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    pub fn output(&self) -> f64 {
        self.state.output
    }

    pub fn values(&self) -> PidValues {
        let s = &self.state;
        PidValues {
            setpoint: s.setpoint,
            current_value: s.current_value,
            kp_value: s.kp_contribution,
            ki_value: s.ki_contribution,
            kd_value: s.kd_contribution,
            feed_forward: self.bias,
            feed_forward_valid: self.bias_active,
            output_base: s.prelimited_output,
            output_limited: s.output,
            accumulated_error: s.error_accum,
        }
    }

    // -- bias / feed-forward ------------------------------------------------

    pub fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
        self.bias_active = true;
    }

    pub fn set_feed_forward(&mut self, feed_forward: f64) {
        self.set_bias(feed_forward);
    }

    pub fn feed_forward(&self) -> Option<f64> {
        self.bias_active.then_some(self.bias)
    }

    pub fn clear_bias(&mut self) {
        self.bias = 0.0;
        self.bias_active = false;
    }

    // -- scheduling ---------------------------------------------------------

    pub fn set_controlling_value(&mut self, value: f64) {
        self.controlling_value = value;
    }

    pub fn controlling_value(&self) -> f64 {
        self.controlling_value
    }

    /// First set wins. Returns false when an interval was already present.
    pub fn try_set_update_interval(&mut self, interval: f64) -> bool {
        if self.update_interval.is_some() {
            return false;
        }
        self.update_interval = Some(interval);
        true
    }

    pub fn update_interval(&self) -> Option<f64> {
        self.update_interval
    }

    // -- gain table surface -------------------------------------------------

    pub fn gain_table(&self) -> &GainTable {
        &self.gains
    }

    pub fn gain_table_mut(&mut self) -> &mut GainTable {
        &mut self.gains
    }

    pub fn set_gain_table(&mut self, gains: GainTable) {
        self.gains = gains;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
