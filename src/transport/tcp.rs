//! TCP transport with u32 little-endian length-prefix framing, plus small
//! sequential serving loops for hosting an [`RpcServer`] on a listener.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use tracing::{info, warn};

use super::{Transport, TransportChannel};
use crate::adapter::SerialAdapter;
use crate::server::RpcServer;

// Refuse absurd frames rather than allocating whatever a peer claims.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// A framed, blocking TCP connection.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self { stream: TcpStream::connect(addr)? })
    }

    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let len = u32::try_from(bytes.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "message too large"))?;
        self.stream.write_all(&len.to_le_bytes())?;
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn receive(&mut self) -> io::Result<Vec<u8>> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header)?;
        let len = u32::from_le_bytes(header);
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
        }
        let mut frame = vec![0u8; len as usize];
        self.stream.read_exact(&mut frame)?;
        Ok(frame)
    }
}

/// Serves one connection until the peer hangs up.
pub fn serve_connection<S: SerialAdapter>(
    server: &mut RpcServer<S>,
    stream: TcpStream,
) -> io::Result<()> {
    let mut transport = TcpTransport::new(stream);
    loop {
        let request = match transport.receive() {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };
        let response = {
            let mut channel = TransportChannel(&mut transport);
            server.dispatch_with(&mut channel, &request)
        };
        transport.send(&response)?;
    }
}

/// Accepts connections forever, serving them one at a time.
pub fn serve<S: SerialAdapter>(server: &mut RpcServer<S>, listener: TcpListener) -> io::Result<()> {
    for stream in listener.incoming() {
        let stream = stream?;
        let peer = stream.peer_addr()?;
        info!(%peer, "accepted connection");
        if let Err(err) = serve_connection(server, stream) {
            warn!(%peer, error = %err, "connection ended with an error");
        }
    }
    Ok(())
}
