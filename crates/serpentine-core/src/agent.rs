//! Agent ("worm") representation shared by every subsystem.

use serde::{Deserialize, Serialize};

use crate::{AgentId, BASE_RADIUS, MAX_RADIUS_GROWTH, Point};

/// Body radius for a given score: `12 + min(48, sqrt(score) * 0.4)`.
#[must_use]
pub fn radius_for_score(score: u32) -> f64 {
    BASE_RADIUS + (f64::from(score).sqrt() * 0.4).min(MAX_RADIUS_GROWTH)
}

/// Per-tick input from the controlling collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ControlInput {
    /// Pointer/joystick offset; only a direction once its magnitude clears the deadzone.
    pub steer: Option<(f64, f64)>,
    pub boost: bool,
}

impl ControlInput {
    #[must_use]
    pub const fn steer(x: f64, y: f64) -> Self {
        Self {
            steer: Some((x, y)),
            boost: false,
        }
    }

    #[must_use]
    pub const fn with_boost(mut self, boost: bool) -> Self {
        self.boost = boost;
        self
    }

    /// Heading requested by the steering vector, if it is outside the deadzone.
    #[must_use]
    pub fn desired_heading(&self, deadzone: f64) -> Option<f64> {
        let (x, y) = self.steer?;
        if !x.is_finite() || !y.is_finite() || x.hypot(y) <= deadzone {
            return None;
        }
        Some(y.atan2(x))
    }
}

/// Steering memory for autonomous agents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Autopilot {
    pub target_heading: f64,
    /// Ticks remaining until the next re-plan.
    pub countdown: u32,
    /// Set while escaping an imminent collision; suppresses boost release.
    pub fleeing: bool,
}

impl Autopilot {
    #[must_use]
    pub const fn new(heading: f64, countdown: u32) -> Self {
        Self {
            target_heading: heading,
            countdown,
            fleeing: false,
        }
    }
}

/// Link to an agent simulated by another peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteLink {
    pub peer_agent_id: String,
    /// Simulated time (ms) at which the last state message was applied.
    pub last_seen_ms: u64,
}

/// What drives an agent's heading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentRole {
    /// Steered by the input collaborator; holds the latest input.
    Controlled(ControlInput),
    Autonomous(Autopilot),
    /// Mirrored from peer state messages and never simulated locally.
    Remote(RemoteLink),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// Head first; never empty.
    pub segments: Vec<Point>,
    pub heading: f64,
    pub score: u32,
    pub is_boosting: bool,
    pub is_dead: bool,
    pub color: [f32; 3],
    pub role: AgentRole,
}

impl Agent {
    /// Creates a straight agent whose body trails behind `head` opposite to `heading`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        head: Point,
        heading: f64,
        length: usize,
        spacing: f64,
        color: [f32; 3],
        role: AgentRole,
    ) -> Self {
        let back = heading + std::f64::consts::PI;
        let segments = (0..length.max(1))
            .map(|i| head.offset(back, spacing * i as f64))
            .collect();
        Self {
            id,
            name: name.into(),
            segments,
            heading,
            score: 0,
            is_boosting: false,
            is_dead: false,
            color,
            role,
        }
    }

    #[must_use]
    pub fn head(&self) -> Point {
        self.segments.first().copied().unwrap_or_default()
    }

    #[must_use]
    pub fn tail(&self) -> Point {
        self.segments.last().copied().unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Derived from score on every call, so it can never drift from it.
    #[must_use]
    pub fn radius(&self) -> f64 {
        radius_for_score(self.score)
    }

    /// Appends `count` segments coincident with the tail; they separate on later updates.
    pub fn grow(&mut self, count: usize) {
        let tail = self.tail();
        self.segments.extend(std::iter::repeat_n(tail, count));
    }

    /// Removes the tail segment, keeping at least the head.
    pub fn shed_tail(&mut self) -> Option<Point> {
        if self.segments.len() <= 1 {
            return None;
        }
        self.segments.pop()
    }

    #[must_use]
    pub const fn is_controlled(&self) -> bool {
        matches!(self.role, AgentRole::Controlled(_))
    }

    #[must_use]
    pub const fn is_autonomous(&self) -> bool {
        matches!(self.role, AgentRole::Autonomous(_))
    }

    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.role, AgentRole::Remote(_))
    }

    /// Agents that participate in local collision resolution as the moving party.
    #[must_use]
    pub const fn is_simulated(&self) -> bool {
        !self.is_dead && !self.is_remote()
    }

    #[must_use]
    pub fn autopilot(&self) -> Option<&Autopilot> {
        match &self.role {
            AgentRole::Autonomous(pilot) => Some(pilot),
            _ => None,
        }
    }

    #[must_use]
    pub fn autopilot_mut(&mut self) -> Option<&mut Autopilot> {
        match &mut self.role {
            AgentRole::Autonomous(pilot) => Some(pilot),
            _ => None,
        }
    }
}
