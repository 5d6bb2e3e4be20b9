//! In-process transport over a pair of mpsc queues, mainly for tests and
//! same-process client/server setups.

use std::io;
use std::sync::mpsc::{channel, Receiver, Sender};

use super::Transport;

/// One end of an in-process duplex message queue.
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Creates two connected ends; what one sends the other receives.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = channel();
        let (right_tx, left_rx) = channel();
        (
            Self { tx: left_tx, rx: left_rx },
            Self { tx: right_tx, rx: right_rx },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer disconnected"))
    }

    fn receive(&mut self) -> io::Result<Vec<u8>> {
        self.rx
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "peer disconnected"))
    }
}
