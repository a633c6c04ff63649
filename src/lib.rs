pub mod physics;
pub mod dynamics;
pub mod vehicle;
mod gnc_mod;
pub mod route;
pub mod config;
pub mod error;
pub mod sim;
pub mod io;

// The gnc module: expose gnc_mod as `gnc` publicly
pub mod gnc {
    pub use crate::gnc_mod::*;
}

pub use config::AutopilotConfig;
pub use error::{ConfigError, ConfigResult};
