pub mod point_mass;
pub mod state;

pub use point_mass::{derivatives, forces, AeroForces};
pub use state::{AircraftState, Deriv, SimConfig};
