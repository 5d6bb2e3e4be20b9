//! The byte-shuttling seam between client and server.
//!
//! The protocol core never touches sockets; everything goes through
//! [`Transport`] (client side, one whole message per call) and
//! [`CallbackChannel`] (server side, the reverse-direction exchange a
//! handler uses to reach its client mid-call).

use std::io;

use crate::error::RpcError;

pub mod channel;
pub mod tcp;

/// Blocking, message-oriented byte shuttle. One `send` or `receive` moves
/// exactly one serialized message; framing is the implementor's problem.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn receive(&mut self) -> io::Result<Vec<u8>>;
}

/// Server-to-client path used for nested callback exchanges.
pub trait CallbackChannel {
    /// Sends one callback request and blocks for its response.
    fn exchange(&mut self, bytes: &[u8]) -> Result<Vec<u8>, RpcError>;
}

/// Adapts any [`Transport`] into a [`CallbackChannel`].
pub struct TransportChannel<'a, T: Transport>(pub &'a mut T);

impl<T: Transport> CallbackChannel for TransportChannel<'_, T> {
    fn exchange(&mut self, bytes: &[u8]) -> Result<Vec<u8>, RpcError> {
        self.0
            .send(bytes)
            .map_err(|err| RpcError::ServerSend(err.to_string()))?;
        self.0
            .receive()
            .map_err(|err| RpcError::ServerReceive(err.to_string()))
    }
}

/// Channel for dispatch paths with no way back to the client; any callback
/// attempt fails with [`RpcError::CallbackMissing`].
pub struct NoCallbacks;

impl CallbackChannel for NoCallbacks {
    fn exchange(&mut self, _bytes: &[u8]) -> Result<Vec<u8>, RpcError> {
        Err(RpcError::CallbackMissing(
            "this dispatch path has no callback channel".into(),
        ))
    }
}
