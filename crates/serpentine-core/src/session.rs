//! Menu / playing / dying / game-over lifecycle around a [`World`].

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    ArenaConfig, ArenaError, ControlInput, GameMode, PeerChannel, PeerSync, TickEvents, World,
    WorldSnapshot,
};

/// Lifecycle phase of the controlled agent's run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Menu,
    Playing,
    /// World frozen while the death presentation runs.
    Dying { remaining: u32 },
    GameOver,
}

impl SessionPhase {
    /// Whether [`Session::start`] may (re)build the world from this phase.
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Menu | Self::GameOver)
    }
}

/// Owns the world for one player, plus the peer link in online mode.
#[derive(Debug)]
pub struct Session {
    config: ArenaConfig,
    phase: SessionPhase,
    world: Option<World>,
    sync: Option<PeerSync>,
    runs: u64,
    last_score: Option<u32>,
    best_score: u32,
}

impl Session {
    /// Single-player session; starts in [`SessionPhase::Menu`].
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        Ok(Self {
            config,
            phase: SessionPhase::Menu,
            world: None,
            sync: None,
            runs: 0,
            last_score: None,
            best_score: 0,
        })
    }

    /// Online session: no autonomous agents, state exchanged over `channel`.
    pub fn online(mut config: ArenaConfig, channel: Box<dyn PeerChannel>) -> Result<Self, ArenaError> {
        config.mode = GameMode::Online;
        let sync = PeerSync::new(config.sync.clone(), channel);
        let mut session = Self::new(config)?;
        session.sync = Some(sync);
        Ok(session)
    }

    /// Rebuilds the world and enters [`SessionPhase::Playing`].
    ///
    /// Returns `Ok(false)` without touching anything unless the session is in
    /// the menu or on the game-over screen.
    pub fn start(&mut self) -> Result<bool, ArenaError> {
        if !self.phase.can_start() {
            return Ok(false);
        }
        let mut config = self.config.clone();
        config.rng_seed = config.rng_seed.map(|seed| seed.wrapping_add(self.runs));
        let world = World::new(config)?;
        if let Some(sync) = &mut self.sync {
            sync.reset();
        }
        self.world = Some(world);
        self.runs += 1;
        self.phase = SessionPhase::Playing;
        info!(run = self.runs, mode = ?self.config.mode, "session started");
        Ok(true)
    }

    /// Advances one frame. Only [`SessionPhase::Playing`] steps the world and
    /// returns its events; the dying countdown ticks without simulating.
    pub fn step(&mut self, input: &ControlInput) -> Option<TickEvents> {
        match self.phase {
            SessionPhase::Menu | SessionPhase::GameOver => None,
            SessionPhase::Dying { remaining } => {
                self.advance_dying(remaining);
                None
            }
            SessionPhase::Playing => {
                let world = self.world.as_mut()?;
                let events = world.step(input);
                if let Some(sync) = &mut self.sync {
                    sync.exchange(world, &events);
                }
                if events.player_died {
                    self.enter_dying();
                }
                Some(events)
            }
        }
    }

    fn enter_dying(&mut self) {
        let score = self
            .world
            .as_ref()
            .and_then(World::player)
            .map_or(0, |player| player.score);
        self.last_score = Some(score);
        self.best_score = self.best_score.max(score);
        let ticks = self.config.dying_ticks();
        info!(score, best = self.best_score, "controlled agent died");
        if ticks == 0 {
            self.enter_game_over();
        } else {
            self.phase = SessionPhase::Dying { remaining: ticks };
        }
    }

    fn advance_dying(&mut self, remaining: u32) {
        if remaining <= 1 {
            self.enter_game_over();
        } else {
            self.phase = SessionPhase::Dying {
                remaining: remaining - 1,
            };
        }
    }

    fn enter_game_over(&mut self) {
        self.phase = SessionPhase::GameOver;
        info!(score = self.last_score.unwrap_or(0), "game over");
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    #[must_use]
    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut World> {
        self.world.as_mut()
    }

    #[must_use]
    pub fn sync(&self) -> Option<&PeerSync> {
        self.sync.as_ref()
    }

    /// Number of times the world has been (re)built.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Controlled agent's score at its most recent death.
    #[must_use]
    pub fn last_score(&self) -> Option<u32> {
        self.last_score
    }

    #[must_use]
    pub fn best_score(&self) -> u32 {
        self.best_score
    }

    /// Render frame tagged with the current phase; `None` before the first start.
    #[must_use]
    pub fn snapshot(&self, view_half_extent: Option<f64>) -> Option<WorldSnapshot> {
        self.world
            .as_ref()
            .map(|world| world.snapshot(self.phase, view_half_extent))
    }
}
