//! Steering for autonomous agents.
//!
//! Each agent re-plans only when its countdown expires. A re-plan checks, in
//! priority order: wall proximity, imminent body contact along look-ahead rays,
//! the nearest pellet in range, and finally a small random wander.

use ordered_float::OrderedFloat;
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use slotmap::SlotMap;
use tracing::trace;

use crate::collision::{ContactParams, body_contact};
use crate::{Agent, AgentId, ArenaConfig, Food, Point, World};

/// Planning constants extracted from [`ArenaConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct AutopilotParams {
    pub world_size: f64,
    pub edge_margin: f64,
    pub lookahead_base: f64,
    pub lookahead_radius_factor: f64,
    pub lookahead_offsets: Vec<f64>,
    pub flee_countdown: u32,
    pub replan_min: u32,
    pub replan_max: u32,
    pub food_search_extent: f64,
    pub wander_jitter: f64,
    pub boost_release_chance: f64,
    /// Evasion only forces a boost above this length.
    pub initial_length: usize,
}

impl AutopilotParams {
    #[must_use]
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self {
            world_size: config.world_size,
            edge_margin: config.edge_margin,
            lookahead_base: config.lookahead_base,
            lookahead_radius_factor: config.lookahead_radius_factor,
            lookahead_offsets: config.lookahead_offsets.clone(),
            flee_countdown: config.flee_countdown,
            replan_min: config.replan_min,
            replan_max: config.replan_max,
            food_search_extent: config.food_search_extent,
            wander_jitter: config.wander_jitter,
            boost_release_chance: config.boost_release_chance,
            initial_length: config.initial_length,
        }
    }
}

impl Default for AutopilotParams {
    fn default() -> Self {
        Self::from_config(&ArenaConfig::default())
    }
}

/// Why a re-plan picked its heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Too close to a wall; turn straight away from it.
    Edge,
    /// Straight ahead would hit a body; swerve and boost.
    Evade,
    /// Head for the nearest pellet in range.
    Seek,
    Wander,
}

/// Outcome of a single re-plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub kind: PlanKind,
    pub target_heading: f64,
    pub countdown: u32,
}

/// Heading pointing away from every wall within `margin` of `head`.
#[must_use]
pub fn edge_escape(head: Point, margin: f64, world_size: f64) -> Option<f64> {
    let mut away_x = 0.0;
    let mut away_y = 0.0;
    if head.x < margin {
        away_x += 1.0;
    }
    if head.x > world_size - margin {
        away_x -= 1.0;
    }
    if head.y < margin {
        away_y += 1.0;
    }
    if head.y > world_size - margin {
        away_y -= 1.0;
    }
    let near_wall = head.x < margin
        || head.x > world_size - margin
        || head.y < margin
        || head.y > world_size - margin;
    if !near_wall {
        return None;
    }
    if away_x == 0.0 && away_y == 0.0 {
        // Opposing walls both in range: aim for the centre instead.
        let centre = Point::new(world_size * 0.5, world_size * 0.5);
        return Some(head.angle_to(centre).unwrap_or(0.0));
    }
    Some(f64::atan2(away_y, away_x))
}

/// Look-ahead test: swerve heading when straight ahead is blocked, `None` when clear.
///
/// Candidates are tried in offset order; if every ray is blocked the agent reverses.
pub fn evasive_heading<'a, I>(
    agent: &Agent,
    agents: I,
    params: &AutopilotParams,
    contact: &ContactParams,
) -> Option<f64>
where
    I: IntoIterator<Item = &'a Agent> + Clone,
{
    let radius = agent.radius();
    let reach = params.lookahead_base + radius * params.lookahead_radius_factor;
    let head = agent.head();
    let blocked = |offset: f64| {
        let probe = head.offset(agent.heading + offset, reach);
        body_contact(probe, radius, agent.id, agents.clone(), contact).is_some()
    };

    let (&straight, swerves) = params.lookahead_offsets.split_first()?;
    if !blocked(straight) {
        return None;
    }
    let heading = swerves
        .iter()
        .copied()
        .find(|offset| !blocked(*offset))
        .map_or(agent.heading + std::f64::consts::PI, |offset| {
            agent.heading + offset
        });
    Some(heading)
}

/// Nearest pellet inside the square search window around `head`.
#[must_use]
pub fn nearest_food(head: Point, food: &[Food], extent: f64) -> Option<&Food> {
    food.iter()
        .filter(|pellet| head.within_box(pellet.position, extent))
        .min_by_key(|pellet| OrderedFloat(head.distance_sq(pellet.position)))
}

/// Runs one re-plan for `agent` against the current world contents.
pub fn plan<R: Rng + ?Sized>(
    agent: &Agent,
    agents: &SlotMap<AgentId, Agent>,
    food: &[Food],
    params: &AutopilotParams,
    contact: &ContactParams,
    rng: &mut R,
) -> Decision {
    let head = agent.head();
    if let Some(heading) = edge_escape(head, params.edge_margin, params.world_size) {
        return Decision {
            kind: PlanKind::Edge,
            target_heading: heading,
            countdown: params.flee_countdown,
        };
    }

    if let Some(heading) = evasive_heading(agent, agents.values(), params, contact) {
        return Decision {
            kind: PlanKind::Evade,
            target_heading: heading,
            countdown: params.flee_countdown,
        };
    }

    let countdown = rng.random_range(params.replan_min..=params.replan_max);
    if let Some(heading) = nearest_food(head, food, params.food_search_extent)
        .and_then(|pellet| head.angle_to(pellet.position))
    {
        return Decision {
            kind: PlanKind::Seek,
            target_heading: heading,
            countdown,
        };
    }

    let jitter = if params.wander_jitter > 0.0 {
        rng.random_range(-params.wander_jitter..=params.wander_jitter)
    } else {
        0.0
    };
    Decision {
        kind: PlanKind::Wander,
        target_heading: agent.heading + jitter,
        countdown,
    }
}

/// Applies a decision to an autonomous agent; no-op for other roles.
///
/// An evasion boosts only while the body is longer than `initial_length`.
pub fn apply(agent: &mut Agent, decision: &Decision, initial_length: usize) {
    let evading = decision.kind == PlanKind::Evade;
    let can_boost = agent.len() > initial_length;
    let Some(pilot) = agent.autopilot_mut() else {
        return;
    };
    pilot.target_heading = decision.target_heading;
    pilot.countdown = decision.countdown;
    pilot.fleeing = evading;
    if evading && can_boost {
        agent.is_boosting = true;
    }
}

impl World {
    /// Counts down every autonomous agent, re-plans the expired ones in parallel,
    /// then rolls the per-tick boost release.
    pub(crate) fn stage_autopilot(&mut self) {
        let mut due: Vec<(AgentId, u64)> = Vec::new();
        for (id, agent) in &mut self.agents {
            if agent.is_dead {
                continue;
            }
            if let Some(pilot) = agent.autopilot_mut() {
                pilot.countdown = pilot.countdown.saturating_sub(1);
                if pilot.countdown == 0 {
                    due.push((id, 0));
                }
            }
        }
        // Sub-seeds are drawn sequentially so the parallel pass stays reproducible.
        for entry in &mut due {
            entry.1 = self.rng.next_u64();
        }

        let agents = &self.agents;
        let food = &self.food;
        let params = &self.autopilot;
        let contact = &self.contact;
        let decisions: Vec<(AgentId, Decision)> = due
            .par_iter()
            .filter_map(|&(id, seed)| {
                let agent = agents.get(id)?;
                let mut rng = SmallRng::seed_from_u64(seed);
                Some((id, plan(agent, agents, food, params, contact, &mut rng)))
            })
            .collect();

        let initial_length = self.autopilot.initial_length;
        for (id, decision) in &decisions {
            if let Some(agent) = self.agents.get_mut(*id) {
                if decision.kind == PlanKind::Evade {
                    trace!(agent = %agent.name, heading = decision.target_heading, "evading");
                }
                apply(agent, decision, initial_length);
            }
        }

        let chance = self.autopilot.boost_release_chance;
        if chance <= 0.0 {
            return;
        }
        for agent in self.agents.values_mut() {
            if agent.is_dead || !agent.is_boosting {
                continue;
            }
            let fleeing = match agent.autopilot() {
                Some(pilot) => pilot.fleeing,
                None => continue,
            };
            if !fleeing && self.rng.random_bool(chance) {
                agent.is_boosting = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentRole, Autopilot, FoodId};
    use std::f64::consts::PI;

    fn spawn(
        agents: &mut SlotMap<AgentId, Agent>,
        head: Point,
        heading: f64,
        length: usize,
    ) -> AgentId {
        agents.insert_with_key(|id| {
            Agent::new(
                id,
                "bot",
                head,
                heading,
                length,
                5.0,
                [0.2, 0.4, 0.6],
                AgentRole::Autonomous(Autopilot::new(heading, 1)),
            )
        })
    }

    #[test]
    fn edge_escape_points_back_into_the_arena() {
        let heading = edge_escape(Point::new(150.0, 10_000.0), 200.0, 20_000.0).expect("left");
        assert!(heading.cos() > 0.99);
        let heading = edge_escape(Point::new(10_000.0, 19_900.0), 200.0, 20_000.0).expect("bottom");
        assert!(heading.sin() < -0.99);
        let corner = edge_escape(Point::new(19_950.0, 50.0), 200.0, 20_000.0).expect("corner");
        assert!(corner.cos() < 0.0 && corner.sin() > 0.0);
        assert_eq!(edge_escape(Point::new(500.0, 500.0), 200.0, 20_000.0), None);
    }

    #[test]
    fn evasion_picks_first_clear_candidate() {
        let params = AutopilotParams::default();
        let contact = ContactParams::default();
        let mut agents = SlotMap::with_key();
        let bot = spawn(&mut agents, Point::new(5_000.0, 5_000.0), 0.0, 15);
        // A vertical body crossing the bot's path 144 units ahead (120 + 2 * radius).
        let _wall = spawn(&mut agents, Point::new(5_144.0, 4_950.0), PI / 2.0 + PI, 20);

        let heading =
            evasive_heading(&agents[bot], agents.values(), &params, &contact).expect("blocked");
        assert!((heading - 0.5).abs() < 1e-12 || (heading - 1.0).abs() < 1e-12);
        let decision = plan(
            &agents[bot],
            &agents,
            &[],
            &params,
            &contact,
            &mut SmallRng::seed_from_u64(1),
        );
        assert_eq!(decision.kind, PlanKind::Evade);
        assert_eq!(decision.countdown, params.flee_countdown);
    }

    #[test]
    fn clear_path_seeks_nearest_food() {
        let params = AutopilotParams::default();
        let contact = ContactParams::default();
        let mut agents = SlotMap::with_key();
        let bot = spawn(&mut agents, Point::new(5_000.0, 5_000.0), 0.0, 15);
        let pellet = |id, x, y| Food {
            id: FoodId(id),
            position: Point::new(x, y),
            value: 1,
            color: [1.0; 3],
        };
        let food = vec![
            pellet(1, 5_000.0, 5_300.0),
            pellet(2, 5_000.0, 4_900.0),
            pellet(3, 5_600.0, 5_000.0),
        ];
        let mut rng = SmallRng::seed_from_u64(9);
        let decision = plan(&agents[bot], &agents, &food, &params, &contact, &mut rng);
        assert_eq!(decision.kind, PlanKind::Seek);
        assert!((decision.target_heading + PI / 2.0).abs() < 1e-12);
        assert!((params.replan_min..=params.replan_max).contains(&decision.countdown));

        let decision = plan(&agents[bot], &agents, &[], &params, &contact, &mut rng);
        assert_eq!(decision.kind, PlanKind::Wander);
        assert!(decision.target_heading.abs() <= params.wander_jitter + 1e-12);
    }

    #[test]
    fn applying_an_evasion_forces_boost_and_flee() {
        let mut agents = SlotMap::with_key();
        let bot = spawn(&mut agents, Point::new(5_000.0, 5_000.0), 0.0, 20);
        let decision = Decision {
            kind: PlanKind::Evade,
            target_heading: 1.0,
            countdown: 5,
        };
        apply(&mut agents[bot], &decision, 15);
        let pilot = agents[bot].autopilot().expect("autopilot");
        assert!(pilot.fleeing);
        assert_eq!(pilot.countdown, 5);
        assert!(agents[bot].is_boosting);
    }

    #[test]
    fn evasion_at_starting_length_flees_without_boost() {
        let mut agents = SlotMap::with_key();
        let bot = spawn(&mut agents, Point::new(5_000.0, 5_000.0), 0.0, 15);
        let decision = Decision {
            kind: PlanKind::Evade,
            target_heading: 1.0,
            countdown: 5,
        };
        apply(&mut agents[bot], &decision, 15);
        assert!(agents[bot].autopilot().is_some_and(|pilot| pilot.fleeing));
        assert!(!agents[bot].is_boosting);
    }

    fn release_world() -> World {
        World::new(ArenaConfig {
            rng_seed: Some(17),
            autonomous_target: 0,
            food_initial: 0,
            food_floor: 0,
            boost_release_chance: 1.0,
            ..ArenaConfig::default()
        })
        .expect("world")
    }

    #[test]
    fn boost_release_spares_fleeing_agents() {
        let mut world = release_world();
        let cruising = world.spawn_autonomous_at(Point::new(3_000.0, 3_000.0), 0.0);
        let fleeing = world.spawn_autonomous_at(Point::new(7_000.0, 7_000.0), 0.0);
        for (id, flee) in [(cruising, false), (fleeing, true)] {
            let agent = &mut world.agents[id];
            agent.is_boosting = true;
            if let Some(pilot) = agent.autopilot_mut() {
                pilot.countdown = 100;
                pilot.fleeing = flee;
            }
        }

        world.stage_autopilot();
        assert!(!world.agents[cruising].is_boosting);
        assert!(world.agents[fleeing].is_boosting);
        assert!(world.agents[fleeing].autopilot().is_some_and(|pilot| pilot.fleeing));
    }
}
