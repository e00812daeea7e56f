//! Peer state broadcast for the online variant.
//!
//! Each peer owns its controlled agent and pushes that agent's state at most
//! once per flush interval. Remote state is applied verbatim as the new
//! authoritative position of the mirrored agent, without interpolation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::population::palette_color;
use crate::world::TickEvents;
use crate::{Agent, AgentId, AgentRole, FoodId, Point, RemoteLink, SyncConfig, World};

/// Upper bound on inbound messages applied per tick.
const MAX_INBOUND_PER_TICK: usize = 256;

/// Full state of one peer's controlled agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    pub agent_id: String,
    pub segments: Vec<Point>,
    pub heading: f64,
    pub score: u32,
    pub is_boosting: bool,
}

impl AgentState {
    #[must_use]
    pub fn from_agent(agent_id: &str, agent: &Agent) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            segments: agent.segments.clone(),
            heading: agent.heading,
            score: agent.score,
            is_boosting: agent.is_boosting,
        }
    }

    fn is_well_formed(&self) -> bool {
        !self.segments.is_empty()
            && self.heading.is_finite()
            && self
                .segments
                .iter()
                .all(|point| point.x.is_finite() && point.y.is_finite())
    }
}

/// Messages exchanged between peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerMessage {
    AgentState(AgentState),
    FoodConsumed { food_id: FoodId },
}

impl PeerMessage {
    pub fn encode(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("peer message codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("peer channel closed")]
    Closed,
    #[error("peer channel full")]
    Full,
}

/// An already-connected, non-blocking message channel to the other peers.
pub trait PeerChannel: Send {
    /// Queues `message` for delivery without blocking.
    fn send(&mut self, message: &PeerMessage) -> Result<(), SyncError>;

    /// Next inbound message, or `Ok(None)` when nothing is pending.
    fn try_recv(&mut self) -> Result<Option<PeerMessage>, SyncError>;
}

/// Counters reported by [`PeerSync::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
    pub expired: u64,
}

/// Throttled flush and ingest over a [`PeerChannel`].
pub struct PeerSync {
    config: SyncConfig,
    channel: Box<dyn PeerChannel>,
    last_flush_ms: Option<u64>,
    remotes: HashMap<String, AgentId>,
    closed: bool,
    stats: SyncStats,
}

impl fmt::Debug for PeerSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSync")
            .field("config", &self.config)
            .field("last_flush_ms", &self.last_flush_ms)
            .field("remotes", &self.remotes.len())
            .field("closed", &self.closed)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PeerSync {
    #[must_use]
    pub fn new(config: SyncConfig, channel: Box<dyn PeerChannel>) -> Self {
        Self {
            config,
            channel,
            last_flush_ms: None,
            remotes: HashMap::new(),
            closed: false,
            stats: SyncStats::default(),
        }
    }

    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.config.peer_id
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Local handle of the agent mirroring `peer_agent_id`, if known.
    #[must_use]
    pub fn remote(&self, peer_agent_id: &str) -> Option<AgentId> {
        self.remotes.get(peer_agent_id).copied()
    }

    /// Forgets every mirrored agent; used when the session rebuilds its world.
    pub fn reset(&mut self) {
        self.remotes.clear();
        self.last_flush_ms = None;
    }

    /// One sync round, run after the world has stepped.
    ///
    /// Consumption notices go out immediately; the controlled agent's state is
    /// flushed only once `flush_interval_ms` of simulated time has passed.
    pub fn exchange(&mut self, world: &mut World, events: &TickEvents) {
        let now = world.elapsed_ms();
        if !self.closed {
            for food_id in &events.food_consumed {
                self.send(&PeerMessage::FoodConsumed { food_id: *food_id });
            }
            self.flush(world, now);
            self.ingest(world, now);
        }
        self.expire(world, now);
    }

    fn flush(&mut self, world: &World, now: u64) {
        let due = self
            .last_flush_ms
            .is_none_or(|last| now.saturating_sub(last) >= self.config.flush_interval_ms);
        if !due {
            return;
        }
        let Some(player) = world.player().filter(|agent| !agent.is_dead) else {
            return;
        };
        let message = PeerMessage::AgentState(AgentState::from_agent(&self.config.peer_id, player));
        self.send(&message);
        self.last_flush_ms = Some(now);
    }

    fn send(&mut self, message: &PeerMessage) {
        match self.channel.send(message) {
            Ok(()) => self.stats.sent += 1,
            Err(SyncError::Closed) => self.mark_closed(),
            Err(err) => {
                self.stats.dropped += 1;
                warn!(peer = %self.config.peer_id, error = %err, "dropping outbound peer message");
            }
        }
    }

    fn ingest(&mut self, world: &mut World, now: u64) {
        for _ in 0..MAX_INBOUND_PER_TICK {
            match self.channel.try_recv() {
                Ok(Some(message)) => {
                    self.stats.received += 1;
                    self.apply(world, message, now);
                }
                Ok(None) => break,
                Err(SyncError::Closed) => {
                    self.mark_closed();
                    break;
                }
                Err(err) => {
                    self.stats.dropped += 1;
                    warn!(peer = %self.config.peer_id, error = %err, "dropping inbound peer message");
                }
            }
        }
    }

    fn apply(&mut self, world: &mut World, message: PeerMessage, now: u64) {
        match message {
            PeerMessage::FoodConsumed { food_id } => {
                world.remove_food(food_id);
            }
            PeerMessage::AgentState(state) => {
                if state.agent_id == self.config.peer_id {
                    return;
                }
                if !state.is_well_formed() {
                    self.stats.dropped += 1;
                    warn!(remote = %state.agent_id, "ignoring malformed agent state");
                    return;
                }
                let known = self.remotes.get(&state.agent_id).copied();
                let id = world.upsert_remote(known, &state, now);
                if known != Some(id) {
                    debug!(remote = %state.agent_id, "remote agent joined");
                }
                self.remotes.insert(state.agent_id, id);
            }
        }
    }

    fn expire(&mut self, world: &mut World, now: u64) {
        let expired = world.expire_remotes(now, self.config.remote_timeout_ms);
        if expired == 0 {
            return;
        }
        self.stats.expired += expired as u64;
        self.remotes.retain(|_, id| world.agents.contains_key(*id));
        debug!(expired, "remote agents timed out");
    }

    fn mark_closed(&mut self) {
        if !self.closed {
            warn!(peer = %self.config.peer_id, "peer channel closed; continuing offline");
        }
        self.closed = true;
    }
}

impl World {
    /// Overwrites (or creates) the mirror of a remote agent with `state`.
    pub(crate) fn upsert_remote(
        &mut self,
        known: Option<AgentId>,
        state: &AgentState,
        now_ms: u64,
    ) -> AgentId {
        if let Some(agent) = known.and_then(|id| self.agents.get_mut(id)) {
            agent.segments.clone_from(&state.segments);
            agent.heading = state.heading;
            agent.score = state.score;
            agent.is_boosting = state.is_boosting;
            if let AgentRole::Remote(link) = &mut agent.role {
                link.last_seen_ms = now_ms;
            }
            return agent.id;
        }

        let color = palette_color(
            state
                .agent_id
                .bytes()
                .fold(0usize, |acc, byte| acc.wrapping_mul(31).wrapping_add(usize::from(byte))),
        );
        self.agents.insert_with_key(|id| Agent {
            id,
            name: state.agent_id.clone(),
            segments: state.segments.clone(),
            heading: state.heading,
            score: state.score,
            is_boosting: state.is_boosting,
            is_dead: false,
            color,
            role: AgentRole::Remote(RemoteLink {
                peer_agent_id: state.agent_id.clone(),
                last_seen_ms: now_ms,
            }),
        })
    }

    /// Removes remote agents not refreshed within `timeout_ms`.
    pub(crate) fn expire_remotes(&mut self, now_ms: u64, timeout_ms: u64) -> usize {
        let before = self.agents.len();
        self.agents.retain(|_, agent| match &agent.role {
            AgentRole::Remote(link) => now_ms.saturating_sub(link.last_seen_ms) <= timeout_ms,
            _ => true,
        });
        before - self.agents.len()
    }
}
