use tracing::{debug, info, warn};

use crate::dynamics::point_mass::trimmed_level;
use crate::dynamics::state::{AircraftState, SimConfig};
use crate::gnc::{AutopilotAction, AutopilotControls, CommonController, ControlContext, LateralMode, VerticalMode};
use crate::physics::atmosphere::StandardAtmosphere;
use crate::physics::geodesy::{initial_heading_rad, normalize_pi};
use crate::physics::units::{FT_PER_M, M_PER_FT};
use crate::route::Route;
use crate::vehicle::{Aircraft, AircraftView};
use super::integrator::rk4_step;

// ---------------------------------------------------------------------------
// Route sequencing
// ---------------------------------------------------------------------------

/// Move the controller on to the next leg once it reports the current
/// waypoint achieved. Past the last waypoint the aircraft holds its heading
/// and altitude.
fn sequence_waypoint(state: &mut AircraftState, route: &Route, controller: &mut CommonController) {
    if !controller.waypoint_achieved() {
        return;
    }
    let Some(action) = controller.current_activity().copied() else {
        return;
    };
    let refs = route.advance(action.waypoints);
    state.leg += 1;
    debug!(t = state.time, leg = state.leg, "waypoint achieved");

    let mut next = action.waypoints(refs);
    if refs.curr.is_none() {
        info!(t = state.time, "route complete, holding heading and altitude");
        next = next
            .lateral(LateralMode::Heading(state.heading.to_degrees()))
            .vertical(VerticalMode::Altitude(state.position.alt * FT_PER_M));
    }
    controller.set_current_activity(next);
}

/// Trimmed level flight over the first waypoint, pointed at the second, at
/// the first waypoint's speed.
pub fn route_start(aircraft: &Aircraft, route: &Route) -> Option<AircraftState> {
    let refs = route.start_refs();
    let first = route.waypoint(refs.prev?)?;
    let heading = refs
        .curr
        .and_then(|id| route.waypoint(id))
        .map_or(0.0, |second| initial_heading_rad(&first.position, &second.position));
    let speed = first.speed.to_fps(&StandardAtmosphere, first.position.alt) * M_PER_FT;

    let mut state = trimmed_level(aircraft, first.position, speed, heading);
    state.leg = refs.curr.and_then(|id| route.waypoint_index(id)).unwrap_or(0);
    Some(state)
}

// ---------------------------------------------------------------------------
// Closed-loop flight
// ---------------------------------------------------------------------------

/// Fly `aircraft` from `initial` under `controller`.
/// Returns trajectory and the autopilot controls at each step.
pub fn simulate_from(
    aircraft: &Aircraft,
    route: &Route,
    controller: &mut CommonController,
    config: &SimConfig,
    initial: AircraftState,
) -> (Vec<AircraftState>, Vec<AutopilotControls>) {
    let env = StandardAtmosphere;
    let mut state = initial;

    let capacity = (config.max_time / config.dt) as usize + 1;
    let cap = capacity.min(200_000);
    let mut trajectory = Vec::with_capacity(cap);
    let mut commands = Vec::with_capacity(cap);

    trajectory.push(state);
    commands.push(AutopilotControls::default());

    while state.time < config.max_time - 1e-9 {
        let view = AircraftView::new(aircraft, &state);
        let ctx = ControlContext::new(state.time).vehicle(&view).environment(&env).route(route);
        let controls = controller.update(&ctx);

        let next = rk4_step(&state, aircraft, &controls, config.dt);
        controller.angle_deltas(
            normalize_pi(next.heading - state.heading),
            next.pitch() - state.pitch(),
            next.roll - state.roll,
        );
        state = next;
        sequence_waypoint(&mut state, route, controller);

        // Ground impact
        if state.position.alt <= 0.0 {
            warn!(t = state.time, "ground impact");
            state.position.alt = 0.0;
            trajectory.push(state);
            commands.push(controls);
            break;
        }

        trajectory.push(state);
        commands.push(controls);
    }

    info!(
        steps = trajectory.len(),
        t = state.time,
        legs = state.leg,
        "flight finished"
    );
    (trajectory, commands)
}

/// Fly `route` from its first waypoint. A controller with no activity is
/// set to follow the route.
pub fn simulate_with(
    aircraft: &Aircraft,
    route: &Route,
    controller: &mut CommonController,
    config: &SimConfig,
) -> (Vec<AircraftState>, Vec<AutopilotControls>) {
    let Some(initial) = route_start(aircraft, route) else {
        warn!("route has no waypoints, nothing to fly");
        return (Vec::new(), Vec::new());
    };
    if controller.current_activity().is_none() {
        controller.set_current_activity(AutopilotAction::follow_route(route.start_refs()));
    }
    simulate_from(aircraft, route, controller, config, initial)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnc::SpeedMode;
    use crate::physics::geodesy::{normalize_deg, Lla};
    use crate::route::{Waypoint, WaypointSpeed};
    use crate::vehicle::presets;

    fn cruise_start(ac: &Aircraft) -> AircraftState {
        trimmed_level(ac, Lla::new(35.0, -117.0, 3_000.0), 150.0, 0.0)
    }

    fn hold(heading_deg: f64, alt_ft: f64, fps: f64) -> AutopilotAction {
        AutopilotAction::new()
            .lateral(LateralMode::Heading(heading_deg))
            .vertical(VerticalMode::Altitude(alt_ft))
            .speed(SpeedMode::Fps(fps))
    }

    #[test]
    fn captures_commanded_heading() {
        let ac = presets::trainer();
        let mut ap = presets::trainer_autopilot().unwrap();
        let start = cruise_start(&ac);
        ap.set_current_activity(hold(90.0, 3_000.0 * FT_PER_M, 150.0 * FT_PER_M));

        let config = SimConfig { dt: 0.01, max_time: 60.0 };
        let (traj, _) = simulate_from(&ac, &Route::new(), &mut ap, &config, start);
        let last = traj.last().unwrap();
        let err = normalize_deg(last.heading.to_degrees() - 90.0);
        assert!(err.abs() < 3.0, "heading error {:.1} deg", err);
        assert!(last.roll.to_degrees().abs() < 10.0, "still banked {:.1}", last.roll.to_degrees());
        assert!((last.position.alt - 3_000.0).abs() < 100.0, "alt {:.0}", last.position.alt);
    }

    #[test]
    fn climbs_to_commanded_altitude() {
        let ac = presets::trainer();
        let mut ap = presets::trainer_autopilot().unwrap();
        let start = cruise_start(&ac);
        ap.set_current_activity(hold(0.0, 3_300.0 * FT_PER_M, 150.0 * FT_PER_M));

        let config = SimConfig { dt: 0.01, max_time: 90.0 };
        let (traj, _) = simulate_from(&ac, &Route::new(), &mut ap, &config, start);
        let peak = traj.iter().map(|s| s.position.alt).fold(0.0_f64, f64::max);
        let last = traj.last().unwrap();
        assert!(peak > 3_200.0, "never climbed, peak {:.0}", peak);
        assert!((last.position.alt - 3_300.0).abs() < 50.0, "alt {:.0}", last.position.alt);
        assert!((last.speed - 150.0).abs() < 15.0, "speed {:.1}", last.speed);
    }

    #[test]
    fn follows_route_through_turn() {
        let ac = presets::trainer();
        let mut ap = presets::trainer_autopilot().unwrap();
        let speed = WaypointSpeed::Ktas(290.0);
        let route = Route::from_waypoints([
            Waypoint::new(35.0, -117.0, 3_000.0).speed(speed),
            Waypoint::new(35.1, -117.0, 3_000.0).speed(speed),
            Waypoint::new(35.1, -116.85, 3_000.0).speed(speed),
        ]);

        let config = SimConfig { dt: 0.01, max_time: 150.0 };
        let (traj, _) = simulate_with(&ac, &route, &mut ap, &config);
        let last = traj.last().unwrap();
        assert_eq!(traj[0].leg, 1);
        assert!(last.leg >= 2, "never turned onto the second leg");
        assert!(last.position.lon > -116.95, "lon {:.3}", last.position.lon);
        assert!((last.position.alt - 3_000.0).abs() < 150.0);
    }

    #[test]
    fn empty_route_flies_nothing() {
        let ac = presets::trainer();
        let mut ap = presets::trainer_autopilot().unwrap();
        let (traj, cmds) = simulate_with(&ac, &Route::new(), &mut ap, &SimConfig::default());
        assert!(traj.is_empty() && cmds.is_empty());
        assert!(ap.current_activity().is_none());
    }

    #[test]
    fn uncommanded_glide_hits_ground() {
        let ac = presets::trainer();
        let mut ap = CommonController::default();
        ap.set_current_activity(AutopilotAction::new());
        let start = trimmed_level(&ac, Lla::new(0.0, 0.0, 200.0), 100.0, 0.0);
        let config = SimConfig { dt: 0.01, max_time: 120.0 };
        let (traj, _) = simulate_from(&ac, &Route::new(), &mut ap, &config, start);
        let last = traj.last().unwrap();
        assert_eq!(last.position.alt, 0.0);
        assert!(last.time < 120.0);
    }
}
