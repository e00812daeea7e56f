//! Headless application plumbing for the serpentine arena: the input command
//! bus, a scripted pilot, an in-process peer link and the session loops.

pub mod command;
pub mod loopback;
pub mod pilot;
pub mod runner;

pub use command::{InputCommand, create_command_bus, drain_pending_commands, make_command_submit};
pub use loopback::{LoopbackChannel, loopback_pair};
pub use pilot::ScriptedPilot;
pub use runner::{RunOptions, RunSummary, run_online_pair, run_single};
