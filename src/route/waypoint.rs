use serde::{Deserialize, Serialize};

use crate::gnc::Environment;
use crate::physics::geodesy::Lla;
use crate::physics::units::FPS_PER_KNOT;

// ---------------------------------------------------------------------------
// Waypoint speed and turn specifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WaypointSpeed {
    Mach(f64),
    Ktas(f64),
    Kcas(f64),
    Fps(f64),
}

impl WaypointSpeed {
    /// Resolve to true airspeed in ft/s at `alt_m`.
    pub fn to_fps(&self, env: &dyn Environment, alt_m: f64) -> f64 {
        match *self {
            WaypointSpeed::Mach(mach) => env.fps_from_mach(alt_m, mach),
            WaypointSpeed::Ktas(ktas) => ktas * FPS_PER_KNOT,
            WaypointSpeed::Kcas(kcas) => env.fps_from_kcas(alt_m, kcas),
            WaypointSpeed::Fps(fps) => fps,
        }
    }
}

/// Turn g limit for the turn onto the next leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TurnG {
    /// Horizontal (lateral) acceleration, g.
    Lateral(f64),
    /// Load factor felt by the pilot, g.
    Pilot(f64),
}

impl TurnG {
    pub fn value(&self) -> f64 {
        match *self {
            TurnG::Lateral(g) | TurnG::Pilot(g) => g,
        }
    }
}

// ---------------------------------------------------------------------------
// Waypoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Lla,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub goto: Option<String>, // label of the waypoint that follows this one
    pub speed: WaypointSpeed,
    #[serde(default = "default_turn_g")]
    pub max_turn_g: TurnG,
    #[serde(default = "default_true")]
    pub follow_horizontal_track: bool,
    #[serde(default)]
    pub follow_vertical_track: bool,
    #[serde(default)]
    pub on_passing: bool, // fly-over rather than fly-by
}

fn default_turn_g() -> TurnG {
    TurnG::Pilot(2.0)
}

fn default_true() -> bool {
    true
}

impl Waypoint {
    pub fn new(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Self {
        Self {
            position: Lla::new(lat_deg, lon_deg, alt_m),
            label: None,
            goto: None,
            speed: WaypointSpeed::Ktas(250.0),
            max_turn_g: default_turn_g(),
            follow_horizontal_track: true,
            follow_vertical_track: false,
            on_passing: false,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn goto(mut self, label: impl Into<String>) -> Self {
        self.goto = Some(label.into());
        self
    }

    pub fn speed(mut self, speed: WaypointSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn max_turn_g(mut self, g: TurnG) -> Self {
        self.max_turn_g = g;
        self
    }

    pub fn follow_horizontal_track(mut self, on: bool) -> Self {
        self.follow_horizontal_track = on;
        self
    }

    pub fn follow_vertical_track(mut self, on: bool) -> Self {
        self.follow_vertical_track = on;
        self
    }

    pub fn on_passing(mut self, on: bool) -> Self {
        self.on_passing = on;
        self
    }
}
