use std::net::{SocketAddr, TcpStream};

/// A freshly accepted client socket and the address it came from.
///
/// Ownership moves to the sink on dispatch; the accept loop keeps nothing.
#[derive(Debug)]
pub struct ConnectionHandle {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ConnectionHandle {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    pub fn into_parts(self) -> (TcpStream, SocketAddr) {
        (self.stream, self.peer)
    }
}
