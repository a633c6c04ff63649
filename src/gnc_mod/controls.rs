use serde::Serialize;

// ---------------------------------------------------------------------------
// Autopilot control outputs (normalized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AutopilotControls {
    pub stick_back: f64,             // -1..1, positive pitches up
    pub stick_right: f64,            // -1..1, positive rolls right
    pub rudder_right: f64,           // -1..1, positive yaws right
    pub throttle_military: f64,      // 0..1
    pub throttle_afterburner: f64,   // 0..1
    pub speed_brake: f64,            // 0..1
    pub nose_wheel_steering: f64,    // -1..1
    pub nws_steering: f64,           // -1..1
    pub wheel_brake_left: f64,       // 0..1
    pub wheel_brake_right: f64,      // 0..1
}

impl AutopilotControls {
    /// Clamp every axis into its documented range.
    pub fn enforce_limits(&mut self) {
        let signed = |v: f64| v.clamp(-1.0, 1.0);
        let unsigned = |v: f64| v.clamp(0.0, 1.0);

        self.stick_back = signed(self.stick_back);
        self.stick_right = signed(self.stick_right);
        self.rudder_right = signed(self.rudder_right);
        self.throttle_military = unsigned(self.throttle_military);
        self.throttle_afterburner = unsigned(self.throttle_afterburner);
        self.speed_brake = unsigned(self.speed_brake);
        self.nose_wheel_steering = signed(self.nose_wheel_steering);
        self.nws_steering = signed(self.nws_steering);
        self.wheel_brake_left = unsigned(self.wheel_brake_left);
        self.wheel_brake_right = unsigned(self.wheel_brake_right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforce_limits_clamps_every_axis() {
        let mut c = AutopilotControls {
            stick_back: 3.0,
            stick_right: -7.0,
            rudder_right: 0.25,
            throttle_military: 1.5,
            throttle_afterburner: -0.5,
            speed_brake: 2.0,
            nose_wheel_steering: -1.5,
            nws_steering: 1.5,
            wheel_brake_left: -1.0,
            wheel_brake_right: 4.0,
        };
        c.enforce_limits();
        assert_eq!(c.stick_back, 1.0);
        assert_eq!(c.stick_right, -1.0);
        assert_eq!(c.rudder_right, 0.25, "in-range values pass through");
        assert_eq!(c.throttle_military, 1.0);
        assert_eq!(c.throttle_afterburner, 0.0);
        assert_eq!(c.speed_brake, 1.0);
        assert_eq!(c.nose_wheel_steering, -1.0);
        assert_eq!(c.nws_steering, 1.0);
        assert_eq!(c.wheel_brake_left, 0.0);
        assert_eq!(c.wheel_brake_right, 1.0);
    }
}
