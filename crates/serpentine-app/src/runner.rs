//! Headless session loops for single-player and loopback online play.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serpentine_core::{ArenaConfig, ControlInput, Point, Session, SessionPhase, TickEvents};
use tracing::{debug, info};

use crate::command::{
    CommandReceiver, CommandSubmit, InputCommand, create_command_bus, drain_pending_commands,
    make_command_submit,
};
use crate::loopback::loopback_pair;
use crate::pilot::ScriptedPilot;

const COMMAND_CAPACITY: usize = 64;
const PEER_CAPACITY: usize = 1_024;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on frames processed, including frozen dying frames.
    pub ticks: u64,
    /// Sleep between frames to match the configured tick rate.
    pub realtime: bool,
    /// Extra runs started after game over.
    pub restarts: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ticks: 600,
            realtime: false,
            restarts: 0,
        }
    }
}

/// Totals for one headless session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub simulated_ticks: u64,
    pub runs: u64,
    pub deaths: usize,
    pub food_eaten: usize,
    pub best_score: u32,
    pub last_score: Option<u32>,
    pub final_phase: SessionPhase,
    pub peers_seen: usize,
}

/// One session wired to its input bus and pilot.
struct Driver {
    label: &'static str,
    session: Session,
    pilot: ScriptedPilot,
    submit: CommandSubmit,
    receiver: CommandReceiver,
    input: ControlInput,
    restarts_left: u32,
    /// Respawn the controlled agent mirrored through the arena centre after each start.
    mirrored: bool,
    summary: RunSummary,
}

impl Driver {
    fn new(label: &'static str, session: Session, restarts: u32) -> Self {
        let (tx, receiver) = create_command_bus(COMMAND_CAPACITY);
        Self {
            label,
            session,
            pilot: ScriptedPilot::default(),
            submit: make_command_submit(tx),
            receiver,
            input: ControlInput::default(),
            restarts_left: restarts,
            mirrored: false,
            summary: RunSummary::default(),
        }
    }

    fn mirrored(mut self) -> Self {
        self.mirrored = true;
        self
    }

    /// Whether the driver has nothing left to do.
    fn finished(&self) -> bool {
        self.session.phase() == SessionPhase::GameOver && self.restarts_left == 0
    }

    fn frame(&mut self) -> Result<()> {
        if let Some(world) = self.session.world() {
            if self.session.phase() == SessionPhase::Playing {
                for command in self.pilot.commands(world) {
                    (self.submit)(command);
                }
            }
        }
        if self.session.phase().can_start() && (self.session.runs() == 0 || self.restarts_left > 0)
        {
            (self.submit)(InputCommand::Restart);
        }

        let restart = drain_pending_commands(&self.receiver, &mut self.input);
        if restart && self.session.phase().can_start() {
            if self.session.runs() > 0 {
                self.restarts_left = self.restarts_left.saturating_sub(1);
            }
            self.session
                .start()
                .with_context(|| format!("failed to start {} session", self.label))?;
            self.input = ControlInput::default();
            if self.mirrored {
                self.mirror_player();
            }
        }

        self.summary.frames += 1;
        if let Some(events) = self.session.step(&self.input) {
            self.record(&events);
        }
        Ok(())
    }

    fn mirror_player(&mut self) {
        let Some(world) = self.session.world_mut() else {
            return;
        };
        let size = world.config().world_size;
        let Some((head, heading)) = world.player().map(|player| (player.head(), player.heading))
        else {
            return;
        };
        let mirrored = Point::new(size - head.x, size - head.y);
        world.place_player(mirrored, heading + std::f64::consts::PI);
    }

    fn record(&mut self, events: &TickEvents) {
        self.summary.simulated_ticks += 1;
        self.summary.food_eaten += events.food_consumed.len();
        self.summary.deaths += events.deaths.len();
        if events.standings_refreshed {
            if let Some(world) = self.session.world() {
                let standings = world.standings();
                info!(
                    peer = self.label,
                    tick = events.tick.0,
                    rank = ?standings.rank,
                    total = standings.total,
                    leaders = %standings.summary(),
                    "leaderboard"
                );
            }
        }
        if events.player_died {
            debug!(peer = self.label, tick = events.tick.0, "controlled agent died");
        }
    }

    fn finish(mut self) -> RunSummary {
        self.summary.runs = self.session.runs();
        self.summary.best_score = self.session.best_score();
        self.summary.last_score = self.session.last_score();
        self.summary.final_phase = self.session.phase();
        self.summary.peers_seen = self
            .session
            .world()
            .map_or(0, |world| world.agents().filter(|agent| agent.is_remote()).count());
        info!(
            peer = self.label,
            frames = self.summary.frames,
            ticks = self.summary.simulated_ticks,
            runs = self.summary.runs,
            best = self.summary.best_score,
            "session finished"
        );
        self.summary
    }
}

/// Paces frames at the configured tick rate when `realtime` is set.
struct Pacer {
    enabled: bool,
    frame: Duration,
    next: Instant,
}

impl Pacer {
    fn new(config: &ArenaConfig, enabled: bool) -> Self {
        let frame = Duration::from_secs_f64(1.0 / f64::from(config.tick_rate_hz.max(1)));
        Self {
            enabled,
            frame,
            next: Instant::now() + frame,
        }
    }

    fn wait(&mut self) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
        }
        self.next += self.frame;
    }
}

/// Runs a single-player session driven by the scripted pilot.
pub fn run_single(config: ArenaConfig, options: &RunOptions) -> Result<RunSummary> {
    let mut pacer = Pacer::new(&config, options.realtime);
    let session = Session::new(config).context("invalid arena configuration")?;
    let mut driver = Driver::new("local", session, options.restarts);
    for _ in 0..options.ticks {
        driver.frame()?;
        if driver.finished() {
            break;
        }
        pacer.wait();
    }
    Ok(driver.finish())
}

/// Runs two online sessions side by side, connected through a loopback link.
pub fn run_online_pair(config: ArenaConfig, options: &RunOptions) -> Result<(RunSummary, RunSummary)> {
    let mut pacer = Pacer::new(&config, options.realtime);
    let (link_a, link_b) = loopback_pair(PEER_CAPACITY);

    let mut config_a = config.clone();
    config_a.sync.peer_id = "alpha".to_string();
    let mut config_b = config;
    config_b.sync.peer_id = "beta".to_string();

    let session_a =
        Session::online(config_a, Box::new(link_a)).context("invalid arena configuration")?;
    let session_b =
        Session::online(config_b, Box::new(link_b)).context("invalid arena configuration")?;
    let mut alpha = Driver::new("alpha", session_a, options.restarts);
    // Same seed means the same food ids and the same spawn point; beta enters opposite alpha.
    let mut beta = Driver::new("beta", session_b, options.restarts).mirrored();

    for _ in 0..options.ticks {
        alpha.frame()?;
        beta.frame()?;
        if alpha.finished() && beta.finished() {
            break;
        }
        pacer.wait();
    }
    Ok((alpha.finish(), beta.finish()))
}
