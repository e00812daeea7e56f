use std::collections::HashMap;
use std::f64::consts::PI;

use serpentine_core::{
    AgentId, ArenaConfig, ControlInput, DeathCause, INITIAL_LENGTH, Point, SEGMENT_DISTANCE,
    SessionPhase, World, radius_for_score,
};

fn empty_arena(seed: u64) -> ArenaConfig {
    ArenaConfig {
        rng_seed: Some(seed),
        autonomous_target: 0,
        food_initial: 0,
        food_floor: 0,
        ..ArenaConfig::default()
    }
}

fn crowded_arena(seed: u64) -> ArenaConfig {
    ArenaConfig {
        rng_seed: Some(seed),
        world_size: 4_000.0,
        autonomous_target: 40,
        food_initial: 600,
        food_floor: 500,
        food_batch: 50,
        ..ArenaConfig::default()
    }
}

#[test]
fn eating_a_pellet_scores_grows_and_removes_it() {
    let mut world = World::new(empty_arena(1)).expect("world");
    world.place_player(Point::new(1_000.0, 1_000.0), 0.0);
    let pellet = world.insert_food(Point::new(1_020.0, 1_000.0), 2);

    let mut eaten = false;
    for _ in 0..10 {
        let events = world.step(&ControlInput::default());
        if events.food_consumed.contains(&pellet) {
            eaten = true;
            break;
        }
    }
    assert!(eaten);
    let player = world.player().expect("player");
    assert_eq!(player.score, 10);
    assert_eq!(player.len(), 17);
    assert!(world.food().iter().all(|food| food.id != pellet));
}

#[test]
fn autonomous_agent_turns_away_from_wall_within_one_replan() {
    let mut world = World::new(empty_arena(2)).expect("world");
    let bot = world.spawn_autonomous_at(Point::new(150.0, 5_000.0), PI);

    world.step(&ControlInput::default());
    let pilot = *world
        .agent(bot)
        .and_then(|agent| agent.autopilot())
        .expect("autopilot");
    // Normal of the left wall, pointing back into the arena.
    let normal = (1.0, 0.0);
    let dot = pilot.target_heading.cos() * normal.0 + pilot.target_heading.sin() * normal.1;
    assert!(dot > 0.0, "target heading {} still faces the wall", pilot.target_heading);

    for _ in 0..30 {
        world.step(&ControlInput::default());
    }
    let agent = world.agent(bot).expect("bot survives");
    assert!(!agent.is_dead);
    assert!(agent.heading.cos() > 0.0);
}

#[test]
fn segment_spacing_holds_after_every_update() {
    let mut world = World::new(crowded_arena(3)).expect("world");
    let input = ControlInput::steer(5.0, -8.0);
    for _ in 0..150 {
        let before: HashMap<AgentId, (usize, u32)> = world
            .agents()
            .map(|agent| (agent.id, (agent.len(), agent.score)))
            .collect();
        world.step(&input);
        for agent in world.agents().filter(|agent| !agent.is_dead) {
            // Agents that ate this tick carry coincident tail segments until the next update.
            let ate = before
                .get(&agent.id)
                .is_none_or(|&(len, score)| agent.len() > len || agent.score > score);
            if ate {
                continue;
            }
            for pair in agent.segments.windows(2) {
                let gap = pair[0].distance(pair[1]);
                assert!(
                    (gap - SEGMENT_DISTANCE).abs() < 1e-6,
                    "{} has a {gap} link",
                    agent.name
                );
            }
        }
    }
}

#[test]
fn radius_tracks_score_for_every_agent() {
    let mut world = World::new(crowded_arena(4)).expect("world");
    for _ in 0..120 {
        world.step(&ControlInput::default());
        for agent in world.agents() {
            assert_eq!(agent.radius(), radius_for_score(agent.score));
            assert!(agent.radius() <= 60.0);
        }
    }
}

#[test]
fn boosting_is_refused_at_initial_length() {
    let mut world = World::new(empty_arena(5)).expect("world");
    world.place_player(Point::new(5_000.0, 5_000.0), 0.0);
    let boost = ControlInput::default().with_boost(true);
    world.step(&boost);
    let player = world.player().expect("player");
    assert_eq!(player.len(), INITIAL_LENGTH);
    assert!(!player.is_boosting);
}

#[test]
fn evading_bot_at_initial_length_does_not_boost() {
    let mut world = World::new(empty_arena(12)).expect("world");
    // Controlled body runs vertically across the bot's look-ahead point.
    world.place_player(Point::new(5_150.0, 5_060.0), PI / 2.0);
    let bot = world.spawn_autonomous_at(Point::new(5_000.0, 5_000.0), 0.0);

    let events = world.step(&ControlInput::default());
    assert!(events.deaths.is_empty());
    let agent = world.agent(bot).expect("bot");
    assert!(agent.autopilot().is_some_and(|pilot| pilot.fleeing));
    assert_eq!(agent.len(), INITIAL_LENGTH);
    assert!(!agent.is_boosting);
    let view = world
        .snapshot(SessionPhase::Playing, None)
        .agents
        .into_iter()
        .find(|view| view.id == bot)
        .expect("bot view");
    assert!(!view.is_boosting);

    for _ in 0..10 {
        world.step(&ControlInput::default());
        let agent = world.agent(bot).expect("bot");
        assert!(!(agent.len() <= INITIAL_LENGTH && agent.is_boosting));
    }
}

#[test]
fn boosting_sheds_length_and_drops_food_until_the_floor() {
    let mut world = World::new(empty_arena(6)).expect("world");
    world.place_player(Point::new(5_000.0, 5_000.0), 0.0);
    world.insert_food(Point::new(5_020.0, 5_000.0), 2);
    world.step(&ControlInput::default());
    assert_eq!(world.player().map(|p| p.len()), Some(INITIAL_LENGTH + 2));

    let boost = ControlInput::default().with_boost(true);
    let mut dropped = 0;
    for _ in 0..40 {
        dropped += world.step(&boost).food_spawned;
    }
    let player = world.player().expect("player");
    assert_eq!(player.len(), INITIAL_LENGTH);
    assert!(!player.is_boosting);
    assert_eq!(player.score, 6);
    assert_eq!(dropped, 2);
    assert_eq!(world.food().len(), 2);
    assert!(world.food().iter().all(|food| food.value == 1));
}

#[test]
fn autonomous_population_is_conserved() {
    let mut world = World::new(crowded_arena(7)).expect("world");
    for tick in 0..300 {
        if tick == 150 {
            let victim = world
                .agents()
                .find(|agent| agent.is_autonomous())
                .map(|agent| agent.id)
                .expect("bot");
            assert!(world.remove_agent(victim).is_some());
            assert_eq!(world.autonomous_count(), 39);
        }
        let events = world.step(&ControlInput::default());
        assert_eq!(world.autonomous_count(), 40);
        assert!(world.food().len() >= 500 || events.food_spawned > 0);
        if tick == 150 {
            assert!(events.respawned >= 1);
        }
    }
}

#[test]
fn leaving_the_arena_is_fatal_and_drops_remains() {
    let mut world = World::new(empty_arena(8)).expect("world");
    let bot = world.spawn_autonomous_at(Point::new(2.0, 5_000.0), PI);
    let events = world.step(&ControlInput::default());

    assert!(
        events
            .deaths
            .iter()
            .any(|death| death.agent == bot && death.cause == DeathCause::Boundary)
    );
    assert!(world.agent(bot).is_none());
    // Fifteen segments, every fourth one becomes a value-2 pellet.
    assert_eq!(world.food().len(), 4);
    assert!(world.food().iter().all(|food| food.value == 2));
    assert_eq!(world.autonomous_count(), 0);
}

#[test]
fn only_the_head_owner_dies_on_contact() {
    let mut world = World::new(empty_arena(9)).expect("world");
    world.place_player(Point::new(5_000.0, 5_000.0), 0.0);
    let bot = world.spawn_autonomous_at(Point::new(5_010.0, 5_060.0), PI / 2.0);

    let events = world.step(&ControlInput::default());
    assert!(events.player_died);
    let death = events
        .deaths
        .iter()
        .find(|death| death.agent == world.player_id())
        .expect("player death");
    assert_eq!(death.cause, DeathCause::Collision { other: bot });
    assert!(world.agent(bot).is_some_and(|agent| !agent.is_dead));
    // The controlled agent stays in place for the death presentation.
    assert!(world.player().is_some_and(|player| player.is_dead));
}

#[test]
fn food_is_regenerated_in_batches_below_the_floor() {
    let mut world = World::new(ArenaConfig {
        food_initial: 10,
        food_floor: 20,
        food_batch: 5,
        ..empty_arena(10)
    })
    .expect("world");
    assert_eq!(world.food().len(), 10);
    world.step(&ControlInput::default());
    assert!(world.food().len() >= 15);
    for _ in 0..5 {
        world.step(&ControlInput::default());
    }
    assert!(world.food().len() >= 20);
}

#[test]
fn standings_refresh_once_per_interval() {
    let mut world = World::new(crowded_arena(11)).expect("world");
    let mut refreshes = Vec::new();
    for _ in 0..180 {
        let events = world.step(&ControlInput::default());
        if events.standings_refreshed {
            refreshes.push(events.tick.0);
        }
    }
    assert_eq!(refreshes, vec![60, 120, 180]);
    let standings = world.standings();
    assert!(standings.entries.len() <= 10);
    assert!(
        standings
            .entries
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score)
    );
    if world.player().is_some_and(|player| !player.is_dead) {
        let rank = standings.rank.expect("rank");
        assert!(rank >= 1 && rank <= standings.total);
    }
}
