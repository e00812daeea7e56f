//! Spawning, food regeneration and death drops.

use rand::Rng;
use tracing::debug;

use crate::world::TickEvents;
use crate::{Agent, AgentId, AgentRole, Autopilot, Food, FoodId, Point, World};

/// Pellet and body colors, picked uniformly.
const PALETTE: [[f32; 3]; 8] = [
    [0.96, 0.26, 0.21],
    [1.00, 0.60, 0.00],
    [1.00, 0.92, 0.23],
    [0.30, 0.69, 0.31],
    [0.13, 0.59, 0.95],
    [0.40, 0.23, 0.72],
    [0.91, 0.12, 0.39],
    [0.00, 0.74, 0.83],
];

/// Uniform point at least `clearance` away from every wall.
pub fn spawn_point<R: Rng + ?Sized>(rng: &mut R, world_size: f64, clearance: f64) -> Point {
    let low = clearance.min(world_size * 0.5);
    let high = (world_size - clearance).max(low);
    if high <= low {
        return Point::new(low, low);
    }
    Point::new(rng.random_range(low..high), rng.random_range(low..high))
}

pub fn random_heading<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(-std::f64::consts::PI..std::f64::consts::PI)
}

pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> [f32; 3] {
    palette_color(rng.random_range(0..PALETTE.len()))
}

/// Palette entry for an arbitrary index, wrapping around.
#[must_use]
pub fn palette_color(index: usize) -> [f32; 3] {
    PALETTE[index % PALETTE.len()]
}

impl World {
    /// Adds a pellet and returns its freshly allocated id.
    pub(crate) fn push_food(&mut self, position: Point, value: u8, color: [f32; 3]) -> FoodId {
        let id = FoodId(self.next_food_id);
        self.next_food_id += 1;
        self.food.push(Food {
            id,
            position,
            value: value.clamp(1, 3),
            color,
        });
        id
    }

    fn spawn_random_food(&mut self) {
        let size = self.config.world_size;
        let position = Point::new(
            self.rng.random_range(0.0..size),
            self.rng.random_range(0.0..size),
        );
        let value = self.rng.random_range(1..=3u8);
        let color = random_color(&mut self.rng);
        self.push_food(position, value, color);
    }

    /// Spawns one regeneration batch when the pellet count is below the floor.
    pub(crate) fn top_up_food(&mut self) -> usize {
        if self.food.len() >= self.config.food_floor {
            return 0;
        }
        let batch = self.config.food_batch;
        for _ in 0..batch {
            self.spawn_random_food();
        }
        batch
    }

    /// Turns every `death_drop_stride`-th segment of `id` into a pellet.
    pub(crate) fn drop_remains(&mut self, id: AgentId) -> usize {
        let Some(agent) = self.agents.get(id) else {
            return 0;
        };
        let color = agent.color;
        let drops: Vec<Point> = agent
            .segments
            .iter()
            .step_by(self.config.death_drop_stride.max(1))
            .copied()
            .collect();
        let value = self.config.death_drop_value;
        for position in &drops {
            self.push_food(*position, value, color);
        }
        drops.len()
    }

    /// Creates an autonomous agent at `head`, already inserted into the world.
    pub(crate) fn insert_autonomous(&mut self, head: Point, heading: f64, countdown: u32) -> AgentId {
        self.bot_serial += 1;
        let name = format!("Worm {}", self.bot_serial);
        let color = random_color(&mut self.rng);
        let length = self.config.initial_length;
        let spacing = self.config.segment_distance;
        self.agents.insert_with_key(|id| {
            Agent::new(
                id,
                name,
                head,
                heading,
                length,
                spacing,
                color,
                AgentRole::Autonomous(Autopilot::new(heading, countdown)),
            )
        })
    }

    /// Spawns an autonomous agent at a random valid position with a desynchronised countdown.
    pub(crate) fn spawn_autonomous(&mut self) -> AgentId {
        let head = spawn_point(
            &mut self.rng,
            self.config.world_size,
            self.config.spawn_wall_clearance,
        );
        let heading = random_heading(&mut self.rng);
        let countdown = self
            .rng
            .random_range(self.config.replan_min..=self.config.replan_max);
        self.insert_autonomous(head, heading, countdown)
    }

    /// Live autonomous agents.
    #[must_use]
    pub fn autonomous_count(&self) -> usize {
        self.agents
            .values()
            .filter(|agent| agent.is_autonomous() && !agent.is_dead)
            .count()
    }

    /// Initial food field and autonomous population.
    pub(crate) fn populate(&mut self) {
        for _ in 0..self.config.food_initial {
            self.spawn_random_food();
        }
        for _ in 0..self.config.autonomous_population() {
            self.spawn_autonomous();
        }
    }

    /// Removes dead autonomous agents, refills the population and tops up food.
    pub(crate) fn stage_population(&mut self, events: &mut TickEvents) {
        self.agents
            .retain(|_, agent| !(agent.is_dead && agent.is_autonomous()));

        let target = self.config.autonomous_population();
        let deficit = target.saturating_sub(self.autonomous_count());
        for _ in 0..deficit {
            self.spawn_autonomous();
        }
        if deficit > 0 {
            debug!(respawned = deficit, "autonomous population refilled");
        }
        events.respawned += deficit;
        events.food_spawned += self.top_up_food();
    }
}
