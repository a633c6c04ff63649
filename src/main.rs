use std::env;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sixdof_autopilot::config::AutopilotConfig;
use sixdof_autopilot::dynamics::state::SimConfig;
use sixdof_autopilot::io::{self, FlightSummary};
use sixdof_autopilot::physics::units::FT_PER_M;
use sixdof_autopilot::sim::{self, event};
use sixdof_autopilot::vehicle::presets;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // -----------------------------------------------------------------------
    // Aircraft and autopilot
    // -----------------------------------------------------------------------
    let aircraft = presets::trainer();
    let mut autopilot = match env::args().nth(1) {
        Some(path) => AutopilotConfig::load(&path)
            .and_then(|c| c.build_controller())
            .with_context(|| format!("loading autopilot configuration {path}"))?,
        None => presets::trainer_autopilot().context("built-in trainer tuning")?,
    };
    info!(aircraft = %aircraft.name, method = %autopilot.control_method(), "autopilot ready");

    let route = presets::box_route();
    let config = SimConfig { dt: 0.01, max_time: 420.0 };

    // -----------------------------------------------------------------------
    // Fly the route
    // -----------------------------------------------------------------------
    let (trajectory, controls) = sim::simulate_with(&aircraft, &route, &mut autopilot, &config);
    anyhow::ensure!(!trajectory.is_empty(), "route produced no trajectory");

    let mut detectors: Vec<Box<dyn event::EventDetector>> =
        vec![Box::new(event::WaypointDetector), Box::new(event::GroundImpactDetector)];
    let events = event::scan(&trajectory, &mut detectors);
    let summary = FlightSummary::from_trajectory(&trajectory);

    // -----------------------------------------------------------------------
    // Print results
    // -----------------------------------------------------------------------
    println!();
    println!("====================================================================");
    println!("  AUTOPILOT ROUTE FLIGHT - {}", aircraft.name);
    println!("====================================================================");
    println!();
    println!("  Route");
    println!("  ──────────────────────────────────────────────────────────────────");
    for (i, (_, wp)) in route.iter().enumerate() {
        println!(
            "  {:>2}  {:<6}  lat={:>8.3}  lon={:>9.3}  alt={:>6.0} ft  {:?}",
            i,
            wp.label.as_deref().unwrap_or("-"),
            wp.position.lat,
            wp.position.lon,
            wp.position.alt * FT_PER_M,
            wp.speed,
        );
    }
    println!();

    println!("  Flight Events");
    println!("  ──────────────────────────────────────────────────────────────────");
    for e in &events {
        println!(
            "  t={:>6.1}s  {:<32}  alt={:>6.0}m  hdg={:>5.1}",
            e.time,
            format!("{:?}", e.kind),
            e.state.position.alt,
            e.state.heading.to_degrees(),
        );
    }
    println!();

    println!("  Performance Summary");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!("  Waypoints achieved: {:>6}", summary.waypoints_achieved);
    println!("  Ground distance:    {:>8.1} km", summary.ground_distance_m / 1000.0);
    println!("  Altitude band:      {:>6.0} .. {:.0} m", summary.min_alt_m, summary.max_alt_m);
    println!("  Max speed:          {:>8.1} m/s (Mach {:.2})", summary.max_speed_mps, summary.max_mach);
    println!("  Max bank:           {:>8.1} deg", summary.max_bank_deg);
    println!("  Flight time:        {:>8.1} s", summary.flight_time_s);
    println!();

    // -----------------------------------------------------------------------
    // Trajectory table (sampled)
    // -----------------------------------------------------------------------
    println!("  Trajectory");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  {:>7}  {:>8}  {:>7}  {:>7}  {:>6}  {:>6}  {:>5}",
        "t (s)", "alt (m)", "v (m/s)", "hdg", "bank", "thr", "leg"
    );
    println!("  {}", "─".repeat(60));
    let sample_interval = (trajectory.len() / 30).max(1);
    for (i, (s, c)) in trajectory.iter().zip(&controls).enumerate() {
        if i % sample_interval != 0 && i != trajectory.len() - 1 {
            continue;
        }
        println!(
            "  {:>7.1}  {:>8.1}  {:>7.1}  {:>7.1}  {:>6.1}  {:>6.2}  {:>5}",
            s.time,
            s.position.alt,
            s.speed,
            s.heading.to_degrees(),
            s.roll.to_degrees(),
            c.throttle_military,
            s.leg,
        );
    }
    println!();

    io::write_trajectory_file("flight.csv", &trajectory, &controls).context("writing flight.csv")?;
    io::write_summary_file("flight_summary.json", &aircraft.name, &summary)
        .context("writing flight_summary.json")?;
    let mut pid_file = std::fs::File::create("pid_snapshot.json").context("creating pid_snapshot.json")?;
    io::write_pid_snapshot(&mut pid_file, &autopilot.pid_group_values()).context("writing pid_snapshot.json")?;
    println!("  Wrote flight.csv, flight_summary.json and pid_snapshot.json ({} steps, dt={} s)", trajectory.len(), config.dt);
    println!("====================================================================");
    println!();
    Ok(())
}
