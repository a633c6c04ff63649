use crate::dynamics::state::AircraftState;
use crate::physics::geodesy::normalize_pi;

// ---------------------------------------------------------------------------
// Simulation events
// ---------------------------------------------------------------------------

/// Kinds of simulation events.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The waypoint at this route index was achieved.
    WaypointAchieved { index: usize },
    HeadingCaptured { heading_deg: f64 },
    AltitudeCaptured { altitude_m: f64 },
    GroundImpact,
}

/// A discrete event that occurred during simulation.
#[derive(Debug, Clone)]
pub struct SimEvent {
    pub time: f64,
    pub kind: EventKind,
    pub state: AircraftState,
}

/// Trait for passive event detectors.
/// Implementations inspect consecutive states and report events.
pub trait EventDetector {
    fn check(&mut self, prev: &AircraftState, current: &AircraftState) -> Option<EventKind>;
}

/// Run `detectors` over a recorded trajectory.
pub fn scan(trajectory: &[AircraftState], detectors: &mut [Box<dyn EventDetector>]) -> Vec<SimEvent> {
    let mut events = Vec::new();
    for pair in trajectory.windows(2) {
        for det in detectors.iter_mut() {
            if let Some(kind) = det.check(&pair[0], &pair[1]) {
                events.push(SimEvent { time: pair[1].time, kind, state: pair[1] });
            }
        }
    }
    events
}

/// Reports every change of route leg.
pub struct WaypointDetector;

impl EventDetector for WaypointDetector {
    fn check(&mut self, prev: &AircraftState, current: &AircraftState) -> Option<EventKind> {
        (current.leg != prev.leg).then_some(EventKind::WaypointAchieved { index: prev.leg })
    }
}

/// Fires once when the heading first comes within `tolerance` of `target`.
pub struct HeadingCaptureDetector {
    pub target_deg: f64,
    pub tolerance_deg: f64,
    fired: bool,
}

impl HeadingCaptureDetector {
    pub fn new(target_deg: f64, tolerance_deg: f64) -> Self {
        Self { target_deg, tolerance_deg, fired: false }
    }

    fn captured(&self, s: &AircraftState) -> bool {
        let err = normalize_pi(s.heading - self.target_deg.to_radians());
        err.abs().to_degrees() <= self.tolerance_deg
    }
}

impl EventDetector for HeadingCaptureDetector {
    fn check(&mut self, prev: &AircraftState, current: &AircraftState) -> Option<EventKind> {
        if self.fired || self.captured(prev) || !self.captured(current) {
            return None;
        }
        self.fired = true;
        Some(EventKind::HeadingCaptured { heading_deg: self.target_deg })
    }
}

/// Fires once when altitude first comes within `tolerance` of `target`.
pub struct AltitudeCaptureDetector {
    pub target_m: f64,
    pub tolerance_m: f64,
    fired: bool,
}

impl AltitudeCaptureDetector {
    pub fn new(target_m: f64, tolerance_m: f64) -> Self {
        Self { target_m, tolerance_m, fired: false }
    }

    fn captured(&self, s: &AircraftState) -> bool {
        (s.position.alt - self.target_m).abs() <= self.tolerance_m
    }
}

impl EventDetector for AltitudeCaptureDetector {
    fn check(&mut self, prev: &AircraftState, current: &AircraftState) -> Option<EventKind> {
        if self.fired || self.captured(prev) || !self.captured(current) {
            return None;
        }
        self.fired = true;
        Some(EventKind::AltitudeCaptured { altitude_m: self.target_m })
    }
}

/// Descending through the surface.
pub struct GroundImpactDetector;

impl EventDetector for GroundImpactDetector {
    fn check(&mut self, prev: &AircraftState, current: &AircraftState) -> Option<EventKind> {
        (prev.position.alt > 0.0 && current.position.alt <= 0.0).then_some(EventKind::GroundImpact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::geodesy::Lla;

    fn make_state(alt: f64, heading_deg: f64, leg: usize) -> AircraftState {
        let mut s = AircraftState::level(Lla::new(0.0, 0.0, alt), 150.0, heading_deg.to_radians());
        s.leg = leg;
        s
    }

    #[test]
    fn heading_capture_fires_once_across_north() {
        let mut det = HeadingCaptureDetector::new(0.0, 2.0);
        let prev = make_state(1000.0, 355.0, 1);
        let curr = make_state(1000.0, 359.0, 1);
        assert_eq!(det.check(&prev, &curr), Some(EventKind::HeadingCaptured { heading_deg: 0.0 }));
        // Should not fire again
        assert!(det.check(&prev, &curr).is_none());
    }

    #[test]
    fn altitude_capture_needs_entry() {
        let mut det = AltitudeCaptureDetector::new(3000.0, 10.0);
        let inside = make_state(2995.0, 0.0, 1);
        assert!(det.check(&inside, &inside).is_none());
        let below = make_state(2900.0, 0.0, 1);
        assert!(det.check(&below, &inside).is_some());
    }

    #[test]
    fn scan_collects_leg_changes() {
        let traj = [make_state(1000.0, 0.0, 1), make_state(1000.0, 0.0, 1), make_state(1000.0, 0.0, 2)];
        let mut dets: Vec<Box<dyn EventDetector>> = vec![Box::new(WaypointDetector), Box::new(GroundImpactDetector)];
        let events = scan(&traj, &mut dets);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::WaypointAchieved { index: 1 });
    }
}
