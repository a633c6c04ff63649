use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::dynamics::state::AircraftState;
use crate::gnc::{PidType, PidValues};
use crate::physics::atmosphere;
use crate::physics::geodesy::{vincenty_inverse, Lla};

/// Summary statistics computed from a flight trajectory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlightSummary {
    pub flight_time_s: f64,
    pub ground_distance_m: f64,
    pub min_alt_m: f64,
    pub max_alt_m: f64,
    pub max_speed_mps: f64,
    pub max_mach: f64,
    pub max_bank_deg: f64,
    pub max_alpha_deg: f64,
    pub waypoints_achieved: usize,
    pub final_position: Lla,
    pub final_heading_deg: f64,
}

impl FlightSummary {
    /// Compute summary from trajectory data. Empty input gives the default.
    pub fn from_trajectory(trajectory: &[AircraftState]) -> Self {
        let (Some(first), Some(last)) = (trajectory.first(), trajectory.last()) else {
            return Self::default();
        };

        let ground_distance_m = trajectory
            .windows(2)
            .map(|w| vincenty_inverse(&w[0].position, &w[1].position).distance_m)
            .sum();

        FlightSummary {
            flight_time_s: last.time - first.time,
            ground_distance_m,
            min_alt_m: trajectory.iter().map(|s| s.position.alt).fold(f64::MAX, f64::min),
            max_alt_m: max_of(trajectory, |s| s.position.alt),
            max_speed_mps: max_of(trajectory, |s| s.speed),
            max_mach: max_of(trajectory, |s| s.speed / atmosphere::isa(s.position.alt.max(0.0)).sound_speed),
            max_bank_deg: max_of(trajectory, |s| s.roll.abs().to_degrees()),
            max_alpha_deg: max_of(trajectory, |s| s.alpha.to_degrees()),
            waypoints_achieved: last.leg.saturating_sub(first.leg),
            final_position: last.position,
            final_heading_deg: last.heading.to_degrees(),
        }
    }
}

fn max_of(trajectory: &[AircraftState], f: impl Fn(&AircraftState) -> f64) -> f64 {
    trajectory.iter().map(f).fold(f64::MIN, f64::max)
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    aircraft: &'a str,
    performance: &'a FlightSummary,
}

/// Write flight summary as JSON to a writer.
pub fn write_summary<W: Write>(writer: &mut W, aircraft: &str, summary: &FlightSummary) -> io::Result<()> {
    let doc = SummaryDocument { aircraft, performance: summary };
    serde_json::to_writer_pretty(&mut *writer, &doc)?;
    writeln!(writer)
}

/// Write flight summary JSON to a file.
pub fn write_summary_file(path: impl AsRef<Path>, aircraft: &str, summary: &FlightSummary) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_summary(&mut file, aircraft, summary)
}

/// Write PID telemetry as one JSON object keyed by channel name.
pub fn write_pid_snapshot<W: Write>(writer: &mut W, values: &[(PidType, PidValues)]) -> io::Result<()> {
    let by_channel: BTreeMap<PidType, &PidValues> = values.iter().map(|(t, v)| (*t, v)).collect();
    serde_json::to_writer_pretty(&mut *writer, &by_channel)?;
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_trajectory() -> Vec<AircraftState> {
        let mut a = AircraftState::level(Lla::new(0.0, 0.0, 1000.0), 100.0, 0.0);
        a.leg = 1;
        let mut b = AircraftState::level(Lla::new(0.01, 0.0, 1200.0), 120.0, 0.0);
        b.time = 10.0;
        b.roll = -30_f64.to_radians();
        b.leg = 2;
        let mut c = AircraftState::level(Lla::new(0.02, 0.0, 1100.0), 110.0, 0.5);
        c.time = 20.0;
        c.leg = 3;
        vec![a, b, c]
    }

    #[test]
    fn summary_computes_extremes() {
        let s = FlightSummary::from_trajectory(&simple_trajectory());
        assert!((s.flight_time_s - 20.0).abs() < 1e-9);
        assert!((s.max_alt_m - 1200.0).abs() < 1e-9);
        assert!((s.min_alt_m - 1000.0).abs() < 1e-9);
        assert!((s.max_speed_mps - 120.0).abs() < 1e-9);
        assert!((s.max_bank_deg - 30.0).abs() < 1e-9);
        assert_eq!(s.waypoints_achieved, 2);
        // 0.02 deg of latitude at the equator
        assert!((s.ground_distance_m - 2211.5).abs() < 5.0, "{}", s.ground_distance_m);
    }

    #[test]
    fn json_output_is_valid() {
        let summary = FlightSummary::from_trajectory(&simple_trajectory());
        let mut buf = Vec::new();
        write_summary(&mut buf, "Trainer", &summary).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["aircraft"], "Trainer");
        assert_eq!(value["performance"]["waypoints_achieved"], 2);
        assert!(value["performance"]["final_position"]["lat"].as_f64().is_some());
    }

    #[test]
    fn pid_snapshot_keys_by_channel() {
        let alpha = PidValues { setpoint: 3.0, output_limited: 0.2, ..PidValues::default() };
        let mut buf = Vec::new();
        write_pid_snapshot(&mut buf, &[(PidType::VertSpeed, PidValues::default()), (PidType::Alpha, alpha)]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["alpha"]["setpoint"], 3.0);
        assert_eq!(value["vert_speed"]["feed_forward_valid"], false);
    }

    #[test]
    fn empty_trajectory_gives_default() {
        let s = FlightSummary::from_trajectory(&[]);
        assert_eq!(s.flight_time_s, 0.0);
        assert_eq!(s.waypoints_achieved, 0);
    }
}
