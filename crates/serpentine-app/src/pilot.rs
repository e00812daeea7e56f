//! Scripted stand-in for a human player, emitting input commands each tick.

use serpentine_core::World;

use crate::command::InputCommand;

/// Sweeping pursuit with periodic boosts that steers back to the centre near walls.
#[derive(Debug, Clone)]
pub struct ScriptedPilot {
    /// Ticks per full left/right sweep.
    pub sweep_period: u64,
    /// Peak steering offset from the current heading, in radians.
    pub sweep_amplitude: f64,
    /// Distance from a wall at which the pilot heads for the centre.
    pub wall_margin: f64,
    /// A boost burst starts every this many ticks.
    pub boost_every: u64,
    pub boost_ticks: u64,
    /// Magnitude of the emitted steering vector; must exceed the deadzone.
    pub reach: f64,
}

impl Default for ScriptedPilot {
    fn default() -> Self {
        Self {
            sweep_period: 240,
            sweep_amplitude: 0.6,
            wall_margin: 1_500.0,
            boost_every: 300,
            boost_ticks: 40,
            reach: 60.0,
        }
    }
}

impl ScriptedPilot {
    /// Commands for the tick about to run; empty while the controlled agent is dead.
    #[must_use]
    pub fn commands(&self, world: &World) -> Vec<InputCommand> {
        let Some(player) = world.player().filter(|player| !player.is_dead) else {
            return Vec::new();
        };
        let tick = world.tick().0;
        let head = player.head();
        let size = world.config().world_size;
        let near_wall = head.x < self.wall_margin
            || head.y < self.wall_margin
            || head.x > size - self.wall_margin
            || head.y > size - self.wall_margin;

        let angle = if near_wall {
            (size * 0.5 - head.y).atan2(size * 0.5 - head.x)
        } else {
            let phase = (tick % self.sweep_period.max(1)) as f64 / self.sweep_period.max(1) as f64;
            player.heading + self.sweep_amplitude * (phase * std::f64::consts::TAU).sin()
        };
        let boost = !near_wall
            && self.boost_every > 0
            && tick % self.boost_every < self.boost_ticks
            && player.len() > world.config().initial_length;

        vec![
            InputCommand::Steer {
                x: angle.cos() * self.reach,
                y: angle.sin() * self.reach,
            },
            InputCommand::Boost(boost),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serpentine_core::{ArenaConfig, Point};

    fn world() -> World {
        World::new(ArenaConfig {
            rng_seed: Some(4),
            autonomous_target: 0,
            food_initial: 0,
            food_floor: 0,
            ..ArenaConfig::default()
        })
        .expect("world")
    }

    #[test]
    fn heads_for_the_centre_near_walls() {
        let mut world = world();
        world.place_player(Point::new(500.0, 10_000.0), std::f64::consts::PI);
        let commands = ScriptedPilot::default().commands(&world);
        match commands.as_slice() {
            [InputCommand::Steer { x, y }, InputCommand::Boost(false)] => {
                assert!(*x > 59.0);
                assert!(y.abs() < 1e-6);
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn no_boost_at_starting_length() {
        let mut world = world();
        world.place_player(Point::new(10_000.0, 10_000.0), 0.0);
        let commands = ScriptedPilot::default().commands(&world);
        assert!(commands.contains(&InputCommand::Boost(false)));
    }
}
