use serde::Serialize;

// ---------------------------------------------------------------------------
// Autopilot limits and settings
// ---------------------------------------------------------------------------

/// Flat record of command limits. The controller keeps a default copy from
/// configuration and a current copy that may be overridden at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AutopilotLimitsAndSettings {
    pub enable_afterburner_auto_control: bool,
    pub afterburner_threshold: f64,   // speed command above which AB is used
    pub enable_speed_brake_auto_control: bool,
    pub speed_brake_threshold: f64,   // speed command below which brakes are used
    pub pitch_g_load_min: f64,        // g
    pub pitch_g_load_max: f64,        // g
    pub alpha_min: f64,               // deg
    pub alpha_max: f64,               // deg
    pub pitch_rate_min: f64,          // deg/s
    pub pitch_rate_max: f64,          // deg/s
    pub vert_speed_min: f64,          // ft/min
    pub vert_speed_max: f64,          // ft/min
    pub yaw_g_load_max: f64,          // g
    pub beta_max: f64,                // deg
    pub yaw_rate_max: f64,            // deg/s
    pub roll_rate_max: f64,           // deg/s
    pub bank_angle_max: f64,          // deg
    pub forward_accel_min: f64,       // g
    pub forward_accel_max: f64,       // g
    pub taxi_speed_max: f64,          // ft/s
    pub taxi_yaw_rate_max: f64,       // deg/s
    pub turn_roll_in_multiplier: f64,
    pub route_allowable_angle_error: f64, // rad
}

impl Default for AutopilotLimitsAndSettings {
    fn default() -> Self {
        Self {
            enable_afterburner_auto_control: false,
            afterburner_threshold: 1.0,
            enable_speed_brake_auto_control: false,
            speed_brake_threshold: 0.0,
            pitch_g_load_min: -2.0,
            pitch_g_load_max: 6.0,
            alpha_min: -5.0,
            alpha_max: 15.0,
            pitch_rate_min: -10.0,
            pitch_rate_max: 20.0,
            vert_speed_min: -3_000.0,
            vert_speed_max: 3_000.0,
            yaw_g_load_max: 0.5,
            beta_max: 5.0,
            yaw_rate_max: 10.0,
            roll_rate_max: 100.0,
            bank_angle_max: 60.0,
            forward_accel_min: -2.0,
            forward_accel_max: 2.0,
            taxi_speed_max: 30.0,
            taxi_yaw_rate_max: 10.0,
            turn_roll_in_multiplier: 1.0,
            route_allowable_angle_error: 1.0_f64.to_radians(),
        }
    }
}

impl AutopilotLimitsAndSettings {
    /// Setting a threshold turns its auto control on.
    pub fn set_afterburner_threshold(&mut self, threshold: f64) {
        self.afterburner_threshold = threshold;
        self.enable_afterburner_auto_control = true;
    }

    pub fn set_speed_brake_threshold(&mut self, threshold: f64) {
        self.speed_brake_threshold = threshold;
        self.enable_speed_brake_auto_control = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_enable_auto_control() {
        let mut l = AutopilotLimitsAndSettings::default();
        assert!(!l.enable_afterburner_auto_control);
        l.set_afterburner_threshold(0.9);
        l.set_speed_brake_threshold(0.1);
        assert!(l.enable_afterburner_auto_control);
        assert!(l.enable_speed_brake_auto_control);
        assert_eq!(l.afterburner_threshold, 0.9);
    }

    #[test]
    fn defaults_are_ordered() {
        let l = AutopilotLimitsAndSettings::default();
        assert!(l.pitch_g_load_min < l.pitch_g_load_max);
        assert!(l.alpha_min < l.alpha_max);
        assert!(l.vert_speed_min < l.vert_speed_max);
        assert!(l.forward_accel_min < l.forward_accel_max);
    }
}
