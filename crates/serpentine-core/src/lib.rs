//! Core simulation engine for the serpentine worm arena.
//!
//! A single [`World`] holds one controlled agent, a population of autonomous
//! agents (or remote peers in online play) and a food field. [`Session`] wraps
//! the world with the menu/playing/dying/game-over state machine and, for the
//! online variant, a throttled [`PeerSync`] channel.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

pub mod agent;
pub mod autopilot;
pub mod collision;
pub mod motion;
pub mod population;
pub mod ranking;
pub mod session;
pub mod sync;
pub mod world;

pub use agent::{Agent, AgentRole, Autopilot, ControlInput, RemoteLink, radius_for_score};
pub use ranking::{LeaderboardEntry, Standings};
pub use session::{Session, SessionPhase};
pub use sync::{PeerChannel, PeerMessage, PeerSync, SyncError};
pub use world::{AgentView, DeathCause, DeathRecord, TickEvents, World, WorldSnapshot};

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

/// Edge length of the square arena in world units.
pub const WORLD_SIZE: f64 = 20_000.0;
/// Fixed spacing between consecutive body segments after a motion update.
pub const SEGMENT_DISTANCE: f64 = 5.0;
/// Fraction of the angular error closed per tick.
pub const TURN_SPEED: f64 = 0.22;
/// Segment count of a freshly spawned agent; boosting never goes below it.
pub const INITIAL_LENGTH: usize = 15;
pub const BASE_SPEED: f64 = 6.5;
pub const BOOST_SPEED: f64 = 14.5;
/// Magnitude a steering vector must exceed before it counts as a direction.
pub const JOYSTICK_DEADZONE: f64 = 3.0;
/// Base body radius; grows with score up to `BASE_RADIUS + MAX_RADIUS_GROWTH`.
pub const BASE_RADIUS: f64 = 12.0;
pub const MAX_RADIUS_GROWTH: f64 = 48.0;

/// World-space coordinate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Construct a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Point reached by travelling `distance` along `angle` (radians).
    #[must_use]
    pub fn offset(self, angle: f64, distance: f64) -> Self {
        Self {
            x: self.x + angle.cos() * distance,
            y: self.y + angle.sin() * distance,
        }
    }

    #[must_use]
    pub fn distance_sq(self, other: Self) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Angle of the vector from `self` towards `other`, or `None` when they coincide.
    #[must_use]
    pub fn angle_to(self, other: Self) -> Option<f64> {
        if self.distance_sq(other) <= f64::EPSILON {
            return None;
        }
        Some((other.y - self.y).atan2(other.x - self.x))
    }

    /// Cheap axis-aligned rejection: both axis deltas within `extent`.
    #[must_use]
    pub fn within_box(self, other: Self, extent: f64) -> bool {
        (other.x - self.x).abs() <= extent && (other.y - self.y).abs() <= extent
    }
}

/// High level simulation clock (ticks processed since the world was built).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Whether this tick lands on a cadence boundary. A zero interval never fires.
    #[must_use]
    pub fn every(self, interval: u32) -> bool {
        interval != 0 && self.0.is_multiple_of(interval as u64)
    }
}

/// Identifier of a food pellet; shared verbatim with peers in removal notices.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct FoodId(pub u64);

/// A single food pellet. Color is cosmetic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Food {
    pub id: FoodId,
    pub position: Point,
    /// Nutrition in `1..=3`: score gain is `5 * value`, growth is `value` segments.
    pub value: u8,
    pub color: [f32; 3],
}

/// Whether the world hosts autonomous agents or mirrors remote peers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    SinglePlayer,
    Online,
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Peer synchronisation settings for the online variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Wire identifier of the locally controlled agent.
    pub peer_id: String,
    /// Minimum spacing between outbound agent-state messages.
    pub flush_interval_ms: u64,
    /// Remote agents silent for longer than this are dropped.
    pub remote_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            peer_id: "local".to_string(),
            flush_interval_ms: 50,
            remote_timeout_ms: 5_000,
        }
    }
}

/// Static configuration for an arena.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArenaConfig {
    /// Edge length of the square world.
    pub world_size: f64,
    pub mode: GameMode,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Display name of the controlled agent.
    pub player_name: String,
    /// Simulation ticks per second; converts wall-clock settings into ticks.
    pub tick_rate_hz: u32,

    pub segment_distance: f64,
    pub initial_length: usize,
    pub turn_speed: f64,
    pub base_speed: f64,
    pub boost_speed: f64,
    /// Boosting agents shed a tail segment every this many ticks.
    pub boost_drain_interval: u32,
    /// Score lost per shed segment.
    pub boost_score_cost: u32,
    pub joystick_deadzone: f64,

    /// Added to the agent radius when testing food contact.
    pub food_eat_margin: f64,
    /// Half-extent of the food bounding-box pre-filter around a head.
    pub food_prefilter: f64,
    /// Half-extent of the head-to-head pre-filter for body contact.
    pub agent_prefilter: f64,
    /// Only every n-th body segment is tested for contact.
    pub body_sample_stride: usize,
    /// Fraction of the probing agent's radius counted towards contact distance.
    pub head_contact_factor: f64,

    /// Minimum distance between a spawn point and any wall.
    pub spawn_wall_clearance: f64,
    /// Autonomous population held constant in single-player mode.
    pub autonomous_target: usize,
    pub food_initial: usize,
    /// Food count below which a regeneration batch is spawned.
    pub food_floor: usize,
    pub food_batch: usize,
    /// Every n-th segment of a dead autonomous agent becomes a pellet.
    pub death_drop_stride: usize,
    pub death_drop_value: u8,
    pub boost_drop_value: u8,

    /// Distance from a wall at which the autopilot turns away.
    pub edge_margin: f64,
    pub lookahead_base: f64,
    /// Multiplier applied to the radius when extending the look-ahead distance.
    pub lookahead_radius_factor: f64,
    /// Candidate heading offsets, probed in order; the first must be straight ahead.
    pub lookahead_offsets: Vec<f64>,
    /// Countdown after an evasive re-plan.
    pub flee_countdown: u32,
    pub replan_min: u32,
    pub replan_max: u32,
    pub food_search_extent: f64,
    /// Maximum random perturbation applied while wandering.
    pub wander_jitter: f64,
    /// Per-tick chance an autonomous agent stops boosting once it is no longer fleeing.
    pub boost_release_chance: f64,

    pub leaderboard_interval: u32,
    pub leaderboard_size: usize,
    /// Delay between the controlled agent's death and the game-over screen.
    pub dying_delay_secs: f64,

    pub sync: SyncConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            world_size: WORLD_SIZE,
            mode: GameMode::SinglePlayer,
            rng_seed: None,
            player_name: "You".to_string(),
            tick_rate_hz: 60,
            segment_distance: SEGMENT_DISTANCE,
            initial_length: INITIAL_LENGTH,
            turn_speed: TURN_SPEED,
            base_speed: BASE_SPEED,
            boost_speed: BOOST_SPEED,
            boost_drain_interval: 8,
            boost_score_cost: 2,
            joystick_deadzone: JOYSTICK_DEADZONE,
            food_eat_margin: 15.0,
            food_prefilter: 100.0,
            agent_prefilter: 1_200.0,
            body_sample_stride: 3,
            head_contact_factor: 0.4,
            spawn_wall_clearance: 1_000.0,
            autonomous_target: 1_000,
            food_initial: 15_000,
            food_floor: 12_000,
            food_batch: 200,
            death_drop_stride: 4,
            death_drop_value: 2,
            boost_drop_value: 1,
            edge_margin: 200.0,
            lookahead_base: 120.0,
            lookahead_radius_factor: 2.0,
            lookahead_offsets: vec![0.0, 0.5, -0.5, 1.0, -1.0, 1.5, -1.5],
            flee_countdown: 5,
            replan_min: 15,
            replan_max: 35,
            food_search_extent: 500.0,
            wander_jitter: 0.2,
            boost_release_chance: 0.02,
            leaderboard_interval: 60,
            leaderboard_size: 10,
            dying_delay_secs: 1.5,
            sync: SyncConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Checks every tunable for physically meaningful values.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if !(self.world_size > 0.0) {
            return Err(ArenaError::InvalidConfig("world_size must be positive"));
        }
        if self.tick_rate_hz == 0 {
            return Err(ArenaError::InvalidConfig("tick_rate_hz must be non-zero"));
        }
        if !(self.segment_distance > 0.0) || self.initial_length == 0 {
            return Err(ArenaError::InvalidConfig(
                "segment_distance must be positive and initial_length non-zero",
            ));
        }
        if !(self.turn_speed > 0.0 && self.turn_speed <= 1.0) {
            return Err(ArenaError::InvalidConfig("turn_speed must lie in (0, 1]"));
        }
        if !(self.base_speed > 0.0) || self.boost_speed < self.base_speed {
            return Err(ArenaError::InvalidConfig(
                "base_speed must be positive and boost_speed at least base_speed",
            ));
        }
        if self.boost_drain_interval == 0 || self.body_sample_stride == 0 {
            return Err(ArenaError::InvalidConfig(
                "boost_drain_interval and body_sample_stride must be non-zero",
            ));
        }
        if self.joystick_deadzone < 0.0
            || self.food_eat_margin < 0.0
            || self.food_prefilter < 0.0
            || self.agent_prefilter < 0.0
            || self.head_contact_factor < 0.0
            || self.edge_margin < 0.0
            || self.lookahead_base < 0.0
            || self.lookahead_radius_factor < 0.0
            || self.food_search_extent < 0.0
            || self.wander_jitter < 0.0
        {
            return Err(ArenaError::InvalidConfig(
                "distances, margins and factors must be non-negative",
            ));
        }
        if self.spawn_wall_clearance < 0.0 || self.spawn_wall_clearance * 2.0 >= self.world_size {
            return Err(ArenaError::InvalidConfig(
                "spawn_wall_clearance must leave room to spawn inside the world",
            ));
        }
        if self.food_floor > self.food_initial && self.food_batch == 0 {
            return Err(ArenaError::InvalidConfig(
                "food_batch must be non-zero when food_floor exceeds food_initial",
            ));
        }
        if self.death_drop_stride == 0 {
            return Err(ArenaError::InvalidConfig("death_drop_stride must be non-zero"));
        }
        if !(1..=3).contains(&self.death_drop_value) || !(1..=3).contains(&self.boost_drop_value)
        {
            return Err(ArenaError::InvalidConfig("pellet values must lie in 1..=3"));
        }
        if self.lookahead_offsets.first().copied() != Some(0.0) {
            return Err(ArenaError::InvalidConfig(
                "lookahead_offsets must start with the straight-ahead candidate",
            ));
        }
        if self.replan_min == 0 || self.replan_min > self.replan_max || self.flee_countdown == 0 {
            return Err(ArenaError::InvalidConfig(
                "re-plan countdowns must be non-zero with replan_min <= replan_max",
            ));
        }
        if !(0.0..=1.0).contains(&self.boost_release_chance) {
            return Err(ArenaError::InvalidConfig(
                "boost_release_chance must lie in [0, 1]",
            ));
        }
        if self.leaderboard_interval == 0 {
            return Err(ArenaError::InvalidConfig("leaderboard_interval must be non-zero"));
        }
        if self.dying_delay_secs < 0.0 {
            return Err(ArenaError::InvalidConfig("dying_delay_secs must be non-negative"));
        }
        if self.sync.flush_interval_ms == 0 {
            return Err(ArenaError::InvalidConfig("sync.flush_interval_ms must be non-zero"));
        }
        Ok(())
    }

    /// Autonomous population for the configured mode.
    #[must_use]
    pub fn autonomous_population(&self) -> usize {
        match self.mode {
            GameMode::SinglePlayer => self.autonomous_target,
            GameMode::Online => 0,
        }
    }

    /// Number of ticks the world stays frozen between death and game over.
    #[must_use]
    pub fn dying_ticks(&self) -> u32 {
        (self.dying_delay_secs * f64::from(self.tick_rate_hz)).ceil() as u32
    }

    /// Simulated wall-clock time of `tick`, in milliseconds.
    #[must_use]
    pub fn tick_millis(&self, tick: Tick) -> u64 {
        tick.0.saturating_mul(1_000) / u64::from(self.tick_rate_hz)
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Wraps an angle into `[-π, π]`.
#[must_use]
pub fn wrap_signed_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + std::f64::consts::PI).rem_euclid(std::f64::consts::TAU);
    wrapped - std::f64::consts::PI
}
