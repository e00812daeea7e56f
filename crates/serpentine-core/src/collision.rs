//! Boundary, food and body contact detection.
//!
//! Everything here relies on axis-aligned box rejection followed by squared
//! distance tests; there is no spatial index. Body contact only samples every
//! `body_sample_stride`-th segment of the touched agent.

use smallvec::SmallVec;
use tracing::debug;

use crate::world::{DeathCause, DeathRecord, TickEvents};
use crate::{Agent, AgentId, ArenaConfig, Food, Point, World};

/// Contact constants extracted from [`ArenaConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactParams {
    pub world_size: f64,
    pub food_eat_margin: f64,
    pub food_prefilter: f64,
    pub agent_prefilter: f64,
    pub body_sample_stride: usize,
    pub head_contact_factor: f64,
}

impl ContactParams {
    #[must_use]
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self {
            world_size: config.world_size,
            food_eat_margin: config.food_eat_margin,
            food_prefilter: config.food_prefilter,
            agent_prefilter: config.agent_prefilter,
            body_sample_stride: config.body_sample_stride.max(1),
            head_contact_factor: config.head_contact_factor,
        }
    }
}

impl Default for ContactParams {
    fn default() -> Self {
        Self::from_config(&ArenaConfig::default())
    }
}

/// Hard walls: any coordinate outside `[0, world_size]` is fatal.
#[must_use]
pub fn out_of_bounds(head: Point, world_size: f64) -> bool {
    head.x < 0.0 || head.x > world_size || head.y < 0.0 || head.y > world_size
}

/// Indices into `food` of every pellet a head of `radius` at `head` swallows.
#[must_use]
pub fn reachable_food(
    head: Point,
    radius: f64,
    food: &[Food],
    params: &ContactParams,
) -> SmallVec<[usize; 4]> {
    let reach = radius + params.food_eat_margin;
    let reach_sq = reach * reach;
    food.iter()
        .enumerate()
        .filter(|(_, pellet)| head.within_box(pellet.position, params.food_prefilter))
        .filter(|(_, pellet)| head.distance_sq(pellet.position) < reach_sq)
        .map(|(idx, _)| idx)
        .collect()
}

/// Whether a head of `radius` at `probe` touches the sampled body of `other`.
#[must_use]
pub fn touches_body(probe: Point, radius: f64, other: &Agent, params: &ContactParams) -> bool {
    if !probe.within_box(other.head(), params.agent_prefilter) {
        return false;
    }
    let reach = other.radius() + radius * params.head_contact_factor;
    let reach_sq = reach * reach;
    other
        .segments
        .iter()
        .step_by(params.body_sample_stride)
        .any(|segment| probe.distance_sq(*segment) < reach_sq)
}

/// First live agent other than `exclude` whose body a head at `probe` would touch.
///
/// Shared by collision resolution and autopilot look-ahead; it never mutates.
pub fn body_contact<'a>(
    probe: Point,
    radius: f64,
    exclude: AgentId,
    agents: impl IntoIterator<Item = &'a Agent>,
    params: &ContactParams,
) -> Option<AgentId> {
    agents
        .into_iter()
        .filter(|other| other.id != exclude && !other.is_dead)
        .find(|other| touches_body(probe, radius, other, params))
        .map(|other| other.id)
}

impl World {
    /// Resolves boundary, food and body contact for every locally simulated agent, in that order.
    ///
    /// Deaths apply immediately so an agent killed earlier in the pass is no
    /// longer an obstacle for later ones.
    pub(crate) fn stage_collisions(&mut self, events: &mut TickEvents) {
        let movers: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|(_, agent)| agent.is_simulated())
            .map(|(id, _)| id)
            .collect();

        for id in movers {
            let Some(agent) = self.agents.get(id) else {
                continue;
            };
            if agent.is_dead {
                continue;
            }

            let head = agent.head();
            if out_of_bounds(head, self.contact.world_size) {
                self.kill(id, DeathCause::Boundary, events);
                continue;
            }

            let eaten = reachable_food(head, agent.radius(), &self.food, &self.contact);
            if !eaten.is_empty() {
                self.consume_food(id, eaten, events);
            }

            let Some(agent) = self.agents.get(id) else {
                continue;
            };
            if let Some(other) = body_contact(
                agent.head(),
                agent.radius(),
                id,
                self.agents.values(),
                &self.contact,
            ) {
                self.kill(id, DeathCause::Collision { other }, events);
            }
        }
    }

    fn consume_food(
        &mut self,
        id: AgentId,
        mut eaten: SmallVec<[usize; 4]>,
        events: &mut TickEvents,
    ) {
        eaten.sort_unstable_by(|a, b| b.cmp(a));
        let mut nutrition = 0u32;
        for idx in eaten {
            let pellet = self.food.swap_remove(idx);
            nutrition += u32::from(pellet.value);
            events.food_consumed.push(pellet.id);
        }
        if let Some(agent) = self.agents.get_mut(id) {
            agent.score = agent.score.saturating_add(nutrition * 5);
            agent.grow(nutrition as usize);
        }
        events.food_spawned += self.top_up_food();
    }

    /// Marks an agent dead and applies the death side effects for its role.
    pub(crate) fn kill(&mut self, id: AgentId, cause: DeathCause, events: &mut TickEvents) {
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        if agent.is_dead {
            return;
        }
        agent.is_dead = true;
        agent.is_boosting = false;
        debug!(agent = %agent.name, score = agent.score, ?cause, "agent died");

        if agent.is_controlled() {
            events.player_died = true;
        } else if agent.is_autonomous() {
            events.food_spawned += self.drop_remains(id);
        }
        events.deaths.push(DeathRecord { agent: id, cause });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentRole, Autopilot, FoodId};
    use slotmap::SlotMap;

    fn spawn(
        agents: &mut SlotMap<AgentId, Agent>,
        head: Point,
        heading: f64,
        length: usize,
    ) -> AgentId {
        agents.insert_with_key(|id| {
            Agent::new(
                id,
                "probe",
                head,
                heading,
                length,
                5.0,
                [0.5, 0.5, 0.5],
                AgentRole::Autonomous(Autopilot::new(heading, 10)),
            )
        })
    }

    #[test]
    fn walls_are_inclusive_bounds() {
        assert!(!out_of_bounds(Point::new(0.0, 20_000.0), 20_000.0));
        assert!(out_of_bounds(Point::new(-0.01, 10.0), 20_000.0));
        assert!(out_of_bounds(Point::new(10.0, 20_000.5), 20_000.0));
    }

    #[test]
    fn food_reach_uses_radius_plus_margin() {
        let params = ContactParams::default();
        let pellet = |id, x| Food {
            id: FoodId(id),
            position: Point::new(x, 0.0),
            value: 1,
            color: [1.0; 3],
        };
        let food = vec![pellet(0, 26.9), pellet(1, 27.0), pellet(2, 150.0)];
        let eaten = reachable_food(Point::new(0.0, 0.0), 12.0, &food, &params);
        assert_eq!(eaten.as_slice(), &[0]);
    }

    #[test]
    fn body_probe_only_reports_other_live_agents() {
        let params = ContactParams::default();
        let mut agents = SlotMap::with_key();
        let wall = spawn(&mut agents, Point::new(1_000.0, 1_000.0), -std::f64::consts::FRAC_PI_2, 60);
        let prober = spawn(&mut agents, Point::new(900.0, 1_100.0), 0.0, 15);

        let hit = body_contact(Point::new(1_000.0, 1_100.0), 12.0, prober, agents.values(), &params);
        assert_eq!(hit, Some(wall));

        let miss = body_contact(Point::new(1_040.0, 1_100.0), 12.0, prober, agents.values(), &params);
        assert_eq!(miss, None);

        let own = body_contact(Point::new(1_000.0, 1_100.0), 12.0, wall, agents.values(), &params);
        assert_eq!(own, None);

        agents[wall].is_dead = true;
        let dead = body_contact(Point::new(1_000.0, 1_100.0), 12.0, prober, agents.values(), &params);
        assert_eq!(dead, None);
    }

    #[test]
    fn distant_heads_are_rejected_before_segment_tests() {
        let params = ContactParams {
            agent_prefilter: 100.0,
            ..ContactParams::default()
        };
        let mut agents = SlotMap::with_key();
        // Long body whose head is far from the probe but whose tail passes through it.
        let long = spawn(&mut agents, Point::new(2_000.0, 1_000.0), 0.0, 300);
        let probe = Point::new(1_000.0, 1_000.0);
        assert!(!touches_body(probe, 12.0, &agents[long], &params));
        let wide = ContactParams::default();
        assert!(touches_body(probe, 12.0, &agents[long], &wide));
    }
}
