pub mod geometry;
pub mod segment;
pub mod waypoint;

use std::collections::HashMap;

pub use geometry::NavData;
pub use segment::RouteSegment;
pub use waypoint::{TurnG, Waypoint, WaypointSpeed};

// ---------------------------------------------------------------------------
// Route arena
// ---------------------------------------------------------------------------

/// Stable handle to a waypoint stored in a [`Route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaypointId(usize);

/// Waypoint handles an autopilot action refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaypointRefs {
    pub prev: Option<WaypointId>,
    pub curr: Option<WaypointId>,
    pub next: Option<WaypointId>,
}

/// Owns its waypoints; fly order is kept separately so handles stay valid
/// when waypoints are prepended.
#[derive(Debug, Clone, Default)]
pub struct Route {
    arena: Vec<Waypoint>,
    order: Vec<WaypointId>,
    segments: HashMap<WaypointId, RouteSegment>, // keyed by leg start
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_waypoints(waypoints: impl IntoIterator<Item = Waypoint>) -> Self {
        let mut route = Self::new();
        for wp in waypoints {
            route.push(wp);
        }
        route.compute_segments();
        route
    }

    pub fn push(&mut self, waypoint: Waypoint) -> WaypointId {
        let id = WaypointId(self.arena.len());
        self.arena.push(waypoint);
        self.order.push(id);
        id
    }

    pub fn push_front(&mut self, waypoint: Waypoint) -> WaypointId {
        let id = WaypointId(self.arena.len());
        self.arena.push(waypoint);
        self.order.insert(0, id);
        id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn first(&self) -> Option<WaypointId> {
        self.order.first().copied()
    }

    pub fn at_index(&self, index: usize) -> Option<WaypointId> {
        self.order.get(index).copied()
    }

    pub fn waypoint_index(&self, id: WaypointId) -> Option<usize> {
        self.order.iter().position(|&w| w == id)
    }

    pub fn waypoint(&self, id: WaypointId) -> Option<&Waypoint> {
        self.arena.get(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = WaypointId> + '_ {
        self.order.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WaypointId, &Waypoint)> + '_ {
        self.order.iter().map(move |&id| (id, &self.arena[id.0]))
    }

    pub fn find_label(&self, label: &str) -> Option<WaypointId> {
        self.iter()
            .find(|(_, wp)| wp.label.as_deref() == Some(label))
            .map(|(id, _)| id)
    }

    /// Waypoint flown after `id`: its goto target when set, else the next in
    /// order. None at the end of the route or for an unknown goto label.
    pub fn next_waypoint(&self, id: WaypointId) -> Option<WaypointId> {
        let wp = self.waypoint(id)?;
        match wp.goto.as_deref() {
            Some(label) => self.find_label(label),
            None => self.at_index(self.waypoint_index(id)? + 1),
        }
    }

    /// Outgoing segment of the leg that starts at `id`.
    pub fn segment(&self, id: WaypointId) -> Option<&RouteSegment> {
        self.segments.get(&id)
    }

    /// Recompute every leg's geometry. Call after editing the route.
    pub fn compute_segments(&mut self) {
        self.segments.clear();
        for id in self.order.clone() {
            if let Some(next) = self.next_waypoint(id) {
                let seg = RouteSegment::between(&self.arena[id.0], &self.arena[next.0]);
                self.segments.insert(id, seg);
            }
        }
    }

    /// Refs for flying the first leg: from the first waypoint toward the second.
    pub fn start_refs(&self) -> WaypointRefs {
        let prev = self.first();
        let curr = prev.and_then(|p| self.next_waypoint(p));
        let next = curr.and_then(|c| self.next_waypoint(c));
        WaypointRefs { prev, curr, next }
    }

    /// Refs after the current waypoint has been achieved.
    pub fn advance(&self, refs: WaypointRefs) -> WaypointRefs {
        match refs.curr {
            Some(curr) => {
                let next = refs.next.and_then(|n| self.next_waypoint(n));
                WaypointRefs { prev: Some(curr), curr: refs.next, next }
            }
            None => refs,
        }
    }
}
