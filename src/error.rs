use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading autopilot configuration.
///
/// Soft problems (unknown keys, malformed gain-table rows) are logged and
/// skipped instead; these variants stop the load.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Loop rate factors must lie in 1..=255.
    #[error("{name} loop rate factor must be at least 1")]
    InvalidLoopFactor { name: &'static str },

    #[error("unknown control method `{0}`")]
    InvalidControlMethod(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
