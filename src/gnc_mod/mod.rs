pub mod action;
pub mod controller;
pub mod controls;
pub mod gain_table;
pub mod limits;
pub mod pid;
pub mod pid_bank;
pub mod vehicle;

pub use action::{AutopilotAction, ControlMethod, LateralMode, SpeedMode, StabilizingMode, VerticalMode};
pub use controller::{CommonController, ControlContext, Controller, LoopFactors};
pub use controls::AutopilotControls;
pub use gain_table::{GainSet, GainTable};
pub use limits::AutopilotLimitsAndSettings;
pub use pid::{Pid, PidValues};
pub use pid_bank::{LoopRate, PidBank, PidType};
pub use vehicle::{AircraftQuery, Environment, KinematicState, LandingGear, ThrustPotential};
