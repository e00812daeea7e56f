use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TryRecvError, TrySendError, detect_backoff_cfg};
use serpentine_core::ControlInput;
use std::sync::Arc;
use tracing::{debug, warn};

/// Input events from whatever drives the controlled agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputCommand {
    /// Pointer or joystick offset from the agent's head.
    Steer { x: f64, y: f64 },
    /// Pointer released; keep the current heading.
    ReleaseSteer,
    Boost(bool),
    /// Leave the menu or game-over screen.
    Restart,
}

pub type CommandSender = MAsyncTx<InputCommand>;
pub type CommandReceiver = MRx<InputCommand>;
pub type CommandSubmit = Arc<dyn Fn(InputCommand) -> bool + Send + Sync>;

pub fn create_command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_tx_async_rx_blocking(capacity)
}

/// Folds every pending command into `input`; returns whether a restart was requested.
pub fn drain_pending_commands(receiver: &CommandReceiver, input: &mut ControlInput) -> bool {
    let mut restart = false;
    loop {
        match receiver.try_recv() {
            Ok(command) => {
                debug!(?command, "applying input command");
                match command {
                    InputCommand::Steer { x, y } => input.steer = Some((x, y)),
                    InputCommand::ReleaseSteer => input.steer = None,
                    InputCommand::Boost(held) => input.boost = held,
                    InputCommand::Restart => restart = true,
                }
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    restart
}

pub fn make_command_submit(sender: CommandSender) -> CommandSubmit {
    let sender = Arc::new(sender);
    Arc::new(
        move |command: InputCommand| match sender.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!(?cmd, "input command queue full; dropping command");
                false
            }
            Err(TrySendError::Disconnected(cmd)) => {
                warn!(?cmd, "input command queue disconnected");
                false
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_commands_override_earlier_ones() {
        let (tx, rx) = create_command_bus(8);
        let submit = make_command_submit(tx);
        assert!(submit(InputCommand::Steer { x: 4.0, y: 0.0 }));
        assert!(submit(InputCommand::Boost(true)));
        assert!(submit(InputCommand::Steer { x: 0.0, y: -9.0 }));

        let mut input = ControlInput::default();
        assert!(!drain_pending_commands(&rx, &mut input));
        assert_eq!(input.steer, Some((0.0, -9.0)));
        assert!(input.boost);

        assert!(submit(InputCommand::ReleaseSteer));
        assert!(submit(InputCommand::Restart));
        assert!(drain_pending_commands(&rx, &mut input));
        assert_eq!(input.steer, None);
        assert!(input.boost);
    }

    #[test]
    fn full_queue_drops_commands() {
        let (tx, _rx) = create_command_bus(2);
        let submit = make_command_submit(tx);
        assert!(submit(InputCommand::Boost(true)));
        let accepted = (0..64)
            .map(|_| submit(InputCommand::Restart))
            .filter(|ok| *ok)
            .count();
        assert!(accepted < 64);
    }
}
