use std::io::{self, Write};
use std::path::Path;

use crate::dynamics::state::AircraftState;
use crate::gnc::AutopilotControls;

/// Write a flight to CSV, one row per step.
///
/// Columns: time, lat_deg, lon_deg, alt_m, speed_mps, heading_deg,
///          flight_path_deg, roll_deg, alpha_deg, beta_deg, leg,
///          stick_back, stick_right, rudder_right, throttle_mil,
///          throttle_ab, speed_brake
///
/// Control columns are left empty when `controls` is shorter than
/// `trajectory`.
pub fn write_trajectory<W: Write>(
    writer: &mut W,
    trajectory: &[AircraftState],
    controls: &[AutopilotControls],
) -> io::Result<()> {
    writeln!(
        writer,
        "time,lat_deg,lon_deg,alt_m,speed_mps,heading_deg,\
         flight_path_deg,roll_deg,alpha_deg,beta_deg,leg,\
         stick_back,stick_right,rudder_right,throttle_mil,throttle_ab,speed_brake"
    )?;

    for (i, s) in trajectory.iter().enumerate() {
        write!(
            writer,
            "{:.3},{:.7},{:.7},{:.2},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{}",
            s.time,
            s.position.lat,
            s.position.lon,
            s.position.alt,
            s.speed,
            s.heading.to_degrees(),
            s.flight_path.to_degrees(),
            s.roll.to_degrees(),
            s.alpha.to_degrees(),
            s.beta.to_degrees(),
            s.leg,
        )?;
        match controls.get(i) {
            Some(c) => writeln!(
                writer,
                ",{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
                c.stick_back,
                c.stick_right,
                c.rudder_right,
                c.throttle_military,
                c.throttle_afterburner,
                c.speed_brake,
            )?,
            None => writeln!(writer, ",,,,,,")?,
        }
    }

    Ok(())
}

/// Write a flight to a CSV file at the given path.
pub fn write_trajectory_file(
    path: impl AsRef<Path>,
    trajectory: &[AircraftState],
    controls: &[AutopilotControls],
) -> io::Result<()> {
    let mut file = io::BufWriter::new(std::fs::File::create(path)?);
    write_trajectory(&mut file, trajectory, controls)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::geodesy::Lla;

    #[test]
    fn csv_output_has_header_and_rows() {
        let a = AircraftState::level(Lla::new(35.0, -117.0, 3000.0), 150.0, 0.0);
        let mut b = a;
        b.time = 0.01;
        let controls = [AutopilotControls { throttle_military: 0.25, ..AutopilotControls::default() }];

        let mut buf = Vec::new();
        write_trajectory(&mut buf, &[a, b], &controls).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[0].starts_with("time,"));
        assert_eq!(lines.len(), 3); // header + 2 data rows
        assert!(lines[1].starts_with("0.000,35.0000000,"));
        assert!(lines[1].contains(",0.2500,"));
        assert!(lines[2].ends_with(",,,,,,"));
        let columns = lines[0].split(',').count();
        assert!(lines.iter().all(|l| l.split(',').count() == columns));
    }
}
