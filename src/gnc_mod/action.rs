use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::route::WaypointRefs;

// ---------------------------------------------------------------------------
// Channel modes: each variant carries its own target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum LateralMode {
    #[default]
    NoControl,
    Waypoint,
    Point,
    Heading(f64),  // deg
    YawRate(f64),  // deg/s
    YawGLoad(f64), // g
    Bank(f64),     // deg
    DeltaRoll(f64), // deg
    RollRate(f64), // deg/s
    Beta(f64),     // deg
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum VerticalMode {
    #[default]
    NoControl,
    Waypoint,
    /// Accepted but does nothing.
    Point,
    Altitude(f64),        // ft
    VertSpeed(f64),       // ft/min
    PitchGLoad(f64),      // g
    PitchAngle(f64),      // deg
    PitchRate(f64),       // deg/s
    FlightPathAngle(f64), // deg
    DeltaPitch(f64),      // deg
    Alpha(f64),           // deg
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum SpeedMode {
    #[default]
    NoControl,
    Waypoint,
    ForwardAccel(f64), // g
    Kias(f64),
    Ktas(f64),
    Mach(f64),
    Fps(f64),
    Throttle(f64), // 0..1 mil, above 1 into afterburner
}

/// Secondary lateral channel: the yaw channel of a bank-to-turn method or
/// the roll channel of a yaw-to-turn method.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum StabilizingMode {
    /// Use the control method's default.
    #[default]
    Undefined,
    NoControl,
    YawRate(f64),
    YawGLoad(f64),
    Beta(f64),
    RollRate(f64),
    Bank(f64),
    DeltaRoll(f64),
}

// ---------------------------------------------------------------------------
// Control method
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControlMethod {
    #[default]
    BankToTurnNoYaw,
    BankToTurnWithYaw,
    YawToTurnNoRoll,
    YawToTurnRollRate,
    YawToTurnZeroBank,
}

impl ControlMethod {
    pub const ALL: [ControlMethod; 5] = [
        ControlMethod::BankToTurnNoYaw,
        ControlMethod::BankToTurnWithYaw,
        ControlMethod::YawToTurnNoRoll,
        ControlMethod::YawToTurnRollRate,
        ControlMethod::YawToTurnZeroBank,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ControlMethod::BankToTurnNoYaw => "bank_to_turn_no_yaw",
            ControlMethod::BankToTurnWithYaw => "bank_to_turn_with_yaw",
            ControlMethod::YawToTurnNoRoll => "yaw_to_turn_no_roll",
            ControlMethod::YawToTurnRollRate => "yaw_to_turn_roll_rate",
            ControlMethod::YawToTurnZeroBank => "yaw_to_turn_zero_bank",
        }
    }

    pub fn is_bank_to_turn(self) -> bool {
        matches!(self, ControlMethod::BankToTurnNoYaw | ControlMethod::BankToTurnWithYaw)
    }

    pub fn is_yaw_to_turn(self) -> bool {
        !self.is_bank_to_turn()
    }
}

impl fmt::Display for ControlMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts `bank_to_turn_no_yaw`, `BANK_TO_TURN_NO_YAW` and `BankToTurnNoYaw`.
impl FromStr for ControlMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect();
        ControlMethod::ALL
            .iter()
            .copied()
            .find(|m| m.name().replace('_', "") == key)
            .ok_or_else(|| s.to_string())
    }
}

impl TryFrom<String> for ControlMethod {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ControlMethod> for String {
    fn from(m: ControlMethod) -> String {
        m.name().to_string()
    }
}

// ---------------------------------------------------------------------------
// Autopilot action: one command for all channels
// ---------------------------------------------------------------------------

/// Command handed to the controller by its caller. Replaced wholesale on
/// every new command; waypoints are referenced by handle into a route the
/// caller owns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AutopilotAction {
    pub lateral: LateralMode,
    pub vertical: VerticalMode,
    pub speed: SpeedMode,
    pub stabilizing: StabilizingMode,
    pub waypoints: WaypointRefs,
}

impl AutopilotAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waypoint following on all three channels.
    pub fn follow_route(waypoints: WaypointRefs) -> Self {
        Self {
            lateral: LateralMode::Waypoint,
            vertical: VerticalMode::Waypoint,
            speed: SpeedMode::Waypoint,
            stabilizing: StabilizingMode::Undefined,
            waypoints,
        }
    }

    pub fn lateral(mut self, mode: LateralMode) -> Self {
        self.lateral = mode;
        self
    }

    pub fn vertical(mut self, mode: VerticalMode) -> Self {
        self.vertical = mode;
        self
    }

    pub fn speed(mut self, mode: SpeedMode) -> Self {
        self.speed = mode;
        self
    }

    pub fn stabilizing(mut self, mode: StabilizingMode) -> Self {
        self.stabilizing = mode;
        self
    }

    pub fn waypoints(mut self, refs: WaypointRefs) -> Self {
        self.waypoints = refs;
        self
    }

    pub fn uses_route(&self) -> bool {
        matches!(self.lateral, LateralMode::Waypoint | LateralMode::Point)
            || matches!(self.vertical, VerticalMode::Waypoint)
            || matches!(self.speed, SpeedMode::Waypoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_method_parses_every_spelling() {
        for m in ControlMethod::ALL {
            assert_eq!(m.name().parse::<ControlMethod>(), Ok(m));
            assert_eq!(m.name().to_uppercase().parse::<ControlMethod>(), Ok(m));
        }
        assert_eq!("YawToTurnZeroBank".parse(), Ok(ControlMethod::YawToTurnZeroBank));
        assert!("bank_to_turn".parse::<ControlMethod>().is_err());
    }

    #[test]
    fn method_families() {
        assert!(ControlMethod::BankToTurnWithYaw.is_bank_to_turn());
        assert!(ControlMethod::YawToTurnNoRoll.is_yaw_to_turn());
        assert!(!ControlMethod::YawToTurnRollRate.is_bank_to_turn());
    }

    #[test]
    fn modes_deserialize_with_targets() {
        let m: LateralMode = serde_json::from_str(r#"{"mode":"heading","value":90.0}"#).unwrap();
        assert_eq!(m, LateralMode::Heading(90.0));
        let v: VerticalMode = serde_json::from_str(r#"{"mode":"waypoint"}"#).unwrap();
        assert_eq!(v, VerticalMode::Waypoint);
        let c: ControlMethod = serde_json::from_str(r#""BANK_TO_TURN_WITH_YAW""#).unwrap();
        assert_eq!(c, ControlMethod::BankToTurnWithYaw);
    }

    #[test]
    fn route_actions_report_route_use() {
        assert!(AutopilotAction::follow_route(WaypointRefs::default()).uses_route());
        let a = AutopilotAction::new().lateral(LateralMode::Heading(10.0));
        assert!(!a.uses_route());
    }
}
