//! Authoritative arena state and the per-tick stage pipeline.

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::info;

use crate::autopilot::AutopilotParams;
use crate::collision::ContactParams;
use crate::motion::{self, MotionParams};
use crate::population::{random_color, random_heading, spawn_point};
use crate::{
    Agent, AgentId, AgentRole, ArenaConfig, ArenaError, ControlInput, Food, FoodId, Point,
    SessionPhase, Standings, Tick,
};

/// Why an agent died.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeathCause {
    /// Head left the arena.
    Boundary,
    /// Head touched the body of `other`.
    Collision { other: AgentId },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeathRecord {
    pub agent: AgentId,
    pub cause: DeathCause,
}

/// Everything observable that happened during one [`World::step`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TickEvents {
    pub tick: Tick,
    pub deaths: Vec<DeathRecord>,
    /// Pellets eaten by locally simulated agents, in consumption order.
    pub food_consumed: Vec<FoodId>,
    /// Pellets created by regeneration, boost drain and death drops.
    pub food_spawned: usize,
    /// Autonomous replacements spawned this tick.
    pub respawned: usize,
    pub standings_refreshed: bool,
    /// The controlled agent died this tick.
    pub player_died: bool,
}

impl TickEvents {
    #[must_use]
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }
}

/// Render-facing view of one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentView {
    pub id: AgentId,
    pub name: String,
    pub segments: Vec<Point>,
    pub radius: f64,
    pub heading: f64,
    pub score: u32,
    pub is_boosting: bool,
    pub is_dead: bool,
    pub is_remote: bool,
    pub color: [f32; 3],
}

impl From<&Agent> for AgentView {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            segments: agent.segments.clone(),
            radius: agent.radius(),
            heading: agent.heading,
            score: agent.score,
            is_boosting: agent.is_boosting,
            is_dead: agent.is_dead,
            is_remote: agent.is_remote(),
            color: agent.color,
        }
    }
}

/// Read-only frame handed to renderers. Nothing in it feeds back into the simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub phase: SessionPhase,
    pub player: Option<AgentView>,
    /// Every other agent inside the view window.
    pub agents: Vec<AgentView>,
    pub food: Vec<Food>,
    pub standings: Standings,
}

/// One arena: the controlled agent, autonomous or remote agents and the food field.
#[derive(Debug)]
pub struct World {
    pub(crate) config: ArenaConfig,
    pub(crate) tick: Tick,
    pub(crate) rng: SmallRng,
    pub(crate) agents: SlotMap<AgentId, Agent>,
    pub(crate) player: AgentId,
    pub(crate) food: Vec<Food>,
    pub(crate) next_food_id: u64,
    pub(crate) bot_serial: u64,
    pub(crate) standings: Standings,
    pub(crate) motion: MotionParams,
    pub(crate) contact: ContactParams,
    pub(crate) autopilot: AutopilotParams,
}

impl World {
    /// Validates `config`, places the controlled agent and seeds food and population.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let head = spawn_point(&mut rng, config.world_size, config.spawn_wall_clearance);
        let heading = random_heading(&mut rng);
        let color = random_color(&mut rng);

        let mut agents = SlotMap::with_key();
        let player = agents.insert_with_key(|id| {
            Agent::new(
                id,
                config.player_name.clone(),
                head,
                heading,
                config.initial_length,
                config.segment_distance,
                color,
                AgentRole::Controlled(ControlInput::default()),
            )
        });

        let mut world = Self {
            motion: MotionParams::from_config(&config),
            contact: ContactParams::from_config(&config),
            autopilot: AutopilotParams::from_config(&config),
            config,
            tick: Tick::zero(),
            rng,
            agents,
            player,
            food: Vec::new(),
            next_food_id: 0,
            bot_serial: 0,
            standings: Standings::default(),
        };
        world.populate();
        world.refresh_standings();
        info!(
            mode = ?world.config.mode,
            agents = world.agents.len(),
            food = world.food.len(),
            seed = ?world.config.rng_seed,
            "world initialised"
        );
        Ok(world)
    }

    /// Advances the simulation by one tick.
    ///
    /// Stages run in a fixed order: input, motion, autopilot, collisions,
    /// population, then the throttled standings refresh.
    pub fn step(&mut self, input: &ControlInput) -> TickEvents {
        let next = self.tick.next();
        let mut events = TickEvents::new(next);

        self.stage_input(input);
        self.stage_motion(next, &mut events);
        self.stage_autopilot();
        self.stage_collisions(&mut events);
        self.stage_population(&mut events);
        if next.every(self.config.leaderboard_interval) {
            self.refresh_standings();
            events.standings_refreshed = true;
        }

        self.tick = next;
        events
    }

    fn stage_input(&mut self, input: &ControlInput) {
        if let Some(agent) = self.agents.get_mut(self.player) {
            if let AgentRole::Controlled(current) = &mut agent.role {
                *current = *input;
            }
        }
    }

    fn stage_motion(&mut self, next: Tick, events: &mut TickEvents) {
        let drain_tick = next.every(self.config.boost_drain_interval);
        let deadzone = self.config.joystick_deadzone;
        let mut drops = Vec::new();
        for agent in self.agents.values_mut() {
            if !agent.is_simulated() {
                continue;
            }
            let (desired, boost) = match &agent.role {
                AgentRole::Controlled(input) => (
                    input.desired_heading(deadzone).unwrap_or(agent.heading),
                    input.boost,
                ),
                AgentRole::Autonomous(pilot) => (pilot.target_heading, agent.is_boosting),
                AgentRole::Remote(_) => continue,
            };
            if let Some(tail) = motion::step_agent(agent, desired, boost, drain_tick, &self.motion)
            {
                drops.push((tail, agent.color));
            }
        }

        let value = self.config.boost_drop_value;
        events.food_spawned += drops.len();
        for (position, color) in drops {
            self.push_food(position, value, color);
        }
    }

    /// Recomputes the leaderboard immediately.
    pub fn refresh_standings(&mut self) {
        self.standings = Standings::compute(
            self.agents.values(),
            self.player,
            self.config.leaderboard_size,
        );
    }

    #[must_use]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Simulated time since construction, in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.config.tick_millis(self.tick)
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn player_id(&self) -> AgentId {
        self.player
    }

    #[must_use]
    pub fn player(&self) -> Option<&Agent> {
        self.agents.get(self.player)
    }

    #[must_use]
    pub fn food(&self) -> &[Food] {
        &self.food
    }

    #[must_use]
    pub fn standings(&self) -> &Standings {
        &self.standings
    }

    /// Places a pellet of `value` (clamped to `1..=3`) at `position`.
    pub fn insert_food(&mut self, position: Point, value: u8) -> FoodId {
        let color = random_color(&mut self.rng);
        self.push_food(position, value, color)
    }

    /// Removes a pellet by id; unknown ids are ignored.
    pub fn remove_food(&mut self, id: FoodId) -> bool {
        match self.food.iter().position(|pellet| pellet.id == id) {
            Some(idx) => {
                self.food.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Adds an autonomous agent that re-plans on the next tick.
    pub fn spawn_autonomous_at(&mut self, head: Point, heading: f64) -> AgentId {
        self.insert_autonomous(head, heading, 1)
    }

    /// Moves the controlled agent onto a straight body at `head`, keeping its
    /// length and score and reviving it if dead.
    pub fn place_player(&mut self, head: Point, heading: f64) {
        let spacing = self.config.segment_distance;
        if let Some(agent) = self.agents.get_mut(self.player) {
            let mut fresh = Agent::new(
                agent.id,
                agent.name.clone(),
                head,
                heading,
                agent.len(),
                spacing,
                agent.color,
                AgentRole::Controlled(ControlInput::default()),
            );
            fresh.score = agent.score;
            *agent = fresh;
        }
    }

    /// Removes any agent except the controlled one.
    pub fn remove_agent(&mut self, id: AgentId) -> Option<Agent> {
        if id == self.player {
            return None;
        }
        self.agents.remove(id)
    }

    /// Frame for renderers tagged with `phase`, optionally culled to a square
    /// window of half-size `view_half_extent` around the controlled agent's head.
    #[must_use]
    pub fn snapshot(&self, phase: SessionPhase, view_half_extent: Option<f64>) -> WorldSnapshot {
        let player = self.player();
        let centre = player.map(Agent::head);
        let visible = |point: Point| match (centre, view_half_extent) {
            (Some(centre), Some(extent)) => centre.within_box(point, extent),
            _ => true,
        };

        let agents = self
            .agents
            .values()
            .filter(|agent| agent.id != self.player && !agent.is_dead)
            .filter(|agent| agent.segments.iter().any(|segment| visible(*segment)))
            .map(AgentView::from)
            .collect();
        let food = self
            .food
            .iter()
            .filter(|pellet| visible(pellet.position))
            .copied()
            .collect();

        WorldSnapshot {
            tick: self.tick,
            phase,
            player: player.map(AgentView::from),
            agents,
            food,
            standings: self.standings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> ArenaConfig {
        ArenaConfig {
            rng_seed: Some(seed),
            world_size: 6_000.0,
            autonomous_target: 25,
            food_initial: 400,
            food_floor: 300,
            food_batch: 50,
            ..ArenaConfig::default()
        }
    }

    #[test]
    fn new_world_is_populated() {
        let world = World::new(small_config(1)).expect("world");
        assert_eq!(world.autonomous_count(), 25);
        assert_eq!(world.agent_count(), 26);
        assert_eq!(world.food().len(), 400);
        let player = world.player().expect("player");
        assert!(player.is_controlled());
        assert_eq!(player.len(), crate::INITIAL_LENGTH);
        assert_eq!(world.standings().total, 26);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ArenaConfig {
            base_speed: 0.0,
            ..ArenaConfig::default()
        };
        assert!(matches!(
            World::new(config),
            Err(ArenaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn seeded_runs_are_deterministic() {
        let mut a = World::new(small_config(42)).expect("world a");
        let mut b = World::new(small_config(42)).expect("world b");
        let input = ControlInput::steer(10.0, 4.0);
        for _ in 0..120 {
            let ea = a.step(&input);
            let eb = b.step(&input);
            assert_eq!(ea, eb);
        }
        let heads_a: Vec<Point> = a.agents().map(Agent::head).collect();
        let heads_b: Vec<Point> = b.agents().map(Agent::head).collect();
        assert_eq!(heads_a, heads_b);
        assert_eq!(a.food(), b.food());
    }

    #[test]
    fn snapshot_culls_to_view_window() {
        let mut world = World::new(small_config(5)).expect("world");
        world.place_player(Point::new(3_000.0, 3_000.0), 0.0);
        let near = world.insert_food(Point::new(3_100.0, 2_950.0), 2);
        let far = world.insert_food(Point::new(5_500.0, 500.0), 2);

        let culled = world.snapshot(SessionPhase::Dying { remaining: 3 }, Some(400.0));
        assert_eq!(culled.phase, SessionPhase::Dying { remaining: 3 });
        assert!(culled.food.iter().any(|pellet| pellet.id == near));
        assert!(culled.food.iter().all(|pellet| pellet.id != far));
        assert!(culled.player.is_some());
        assert!(culled.agents.iter().all(|view| view.id != world.player_id()));

        let full = world.snapshot(SessionPhase::Playing, None);
        assert_eq!(full.phase, SessionPhase::Playing);
        assert_eq!(full.food.len(), world.food().len());
        assert_eq!(full.agents.len(), world.agent_count() - 1);
    }

    #[test]
    fn player_cannot_be_removed() {
        let mut world = World::new(small_config(9)).expect("world");
        assert!(world.remove_agent(world.player_id()).is_none());
        let bot = world.spawn_autonomous_at(Point::new(2_000.0, 2_000.0), 0.0);
        assert!(world.remove_agent(bot).is_some());
        let food = world.insert_food(Point::new(10.0, 10.0), 9);
        assert_eq!(world.food().last().map(|pellet| pellet.value), Some(3));
        assert!(world.remove_food(food));
        assert!(!world.remove_food(food));
    }
}
