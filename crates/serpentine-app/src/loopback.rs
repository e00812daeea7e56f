//! In-process peer link: two sessions exchanging JSON-encoded messages over
//! crossfire queues, standing in for a network transport.

use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TryRecvError, TrySendError, detect_backoff_cfg};
use serpentine_core::{PeerChannel, PeerMessage, SyncError};

pub struct LoopbackChannel {
    tx: MAsyncTx<String>,
    rx: MRx<String>,
}

/// Two connected endpoints; what one sends the other receives.
pub fn loopback_pair(capacity: usize) -> (LoopbackChannel, LoopbackChannel) {
    detect_backoff_cfg();
    let (a_tx, b_rx) = mpmc::bounded_tx_async_rx_blocking(capacity);
    let (b_tx, a_rx) = mpmc::bounded_tx_async_rx_blocking(capacity);
    (
        LoopbackChannel { tx: a_tx, rx: a_rx },
        LoopbackChannel { tx: b_tx, rx: b_rx },
    )
}

impl PeerChannel for LoopbackChannel {
    fn send(&mut self, message: &PeerMessage) -> Result<(), SyncError> {
        let raw = message.encode()?;
        match self.tx.try_send(raw) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SyncError::Full),
            Err(TrySendError::Disconnected(_)) => Err(SyncError::Closed),
        }
    }

    fn try_recv(&mut self) -> Result<Option<PeerMessage>, SyncError> {
        match self.rx.try_recv() {
            Ok(raw) => PeerMessage::decode(&raw).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(SyncError::Closed),
        }
    }
}
