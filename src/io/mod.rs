pub mod csv;
pub mod json;

pub use self::csv::{write_trajectory, write_trajectory_file};
pub use self::json::{write_pid_snapshot, write_summary, write_summary_file, FlightSummary};
