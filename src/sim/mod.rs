pub mod integrator;
pub mod runner;
pub mod event;

pub use runner::{route_start, simulate_from, simulate_with};
pub use integrator::rk4_step;
pub use event::{scan, EventDetector, EventKind, SimEvent};
