//! Heading and body-chain advancement for a single agent.

use crate::{Agent, ArenaConfig, Point, wrap_signed_angle};

/// Motion constants extracted from [`ArenaConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    pub turn_speed: f64,
    pub base_speed: f64,
    pub boost_speed: f64,
    pub segment_distance: f64,
    pub initial_length: usize,
    pub boost_score_cost: u32,
}

impl MotionParams {
    #[must_use]
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self {
            turn_speed: config.turn_speed,
            base_speed: config.base_speed,
            boost_speed: config.boost_speed,
            segment_distance: config.segment_distance,
            initial_length: config.initial_length,
            boost_score_cost: config.boost_score_cost,
        }
    }
}

impl Default for MotionParams {
    fn default() -> Self {
        Self::from_config(&ArenaConfig::default())
    }
}

/// Signed difference `to - from` folded into `[-π, π]`.
#[must_use]
pub fn shortest_angle(from: f64, to: f64) -> f64 {
    wrap_signed_angle(to - from)
}

/// Pursuit rule: each new segment sits exactly `spacing` from its already-placed
/// predecessor, on the line towards that segment's previous position.
///
/// `heading` only matters when a predecessor lands exactly on the old position of
/// its follower; the link direction then falls back to the previous link (or to
/// straight behind the head for the first one).
#[must_use]
pub fn follow_chain(previous: &[Point], new_head: Point, spacing: f64, heading: f64) -> Vec<Point> {
    let mut chain = Vec::with_capacity(previous.len().max(1));
    chain.push(new_head);
    let mut link_angle = heading + std::f64::consts::PI;
    for old in previous.iter().skip(1) {
        let anchor = chain[chain.len() - 1];
        if let Some(angle) = anchor.angle_to(*old) {
            link_angle = angle;
        }
        chain.push(anchor.offset(link_angle, spacing));
    }
    chain
}

/// Turns towards `desired_heading` by a bounded fraction and moves the body by `speed`.
pub fn advance(agent: &mut Agent, desired_heading: f64, speed: f64, params: &MotionParams) {
    let error = shortest_angle(agent.heading, desired_heading);
    agent.heading = wrap_signed_angle(agent.heading + error * params.turn_speed);
    let head = agent.head().offset(agent.heading, speed);
    agent.segments = follow_chain(&agent.segments, head, params.segment_distance, agent.heading);
}

/// Boosting is only allowed while the body is longer than its starting length.
pub fn gate_boost(agent: &mut Agent, requested: bool, initial_length: usize) {
    agent.is_boosting = requested && agent.len() > initial_length;
}

/// Sheds the tail and charges score for a boost drain tick; returns the vacated point.
pub fn drain_boost(agent: &mut Agent, score_cost: u32) -> Option<Point> {
    let tail = agent.shed_tail()?;
    agent.score = agent.score.saturating_sub(score_cost);
    Some(tail)
}

/// Full per-tick motion for a locally simulated agent.
///
/// Returns the position of a shed tail segment when this is a drain tick and the
/// agent is boosting, so the caller can drop a pellet there.
pub fn step_agent(
    agent: &mut Agent,
    desired_heading: f64,
    boost_requested: bool,
    drain_tick: bool,
    params: &MotionParams,
) -> Option<Point> {
    gate_boost(agent, boost_requested, params.initial_length);
    let speed = if agent.is_boosting {
        params.boost_speed
    } else {
        params.base_speed
    };
    advance(agent, desired_heading, speed, params);
    if drain_tick && agent.is_boosting {
        drain_boost(agent, params.boost_score_cost)
    } else {
        None
    }
}
