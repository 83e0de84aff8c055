use crate::common::error::{ListenerError, Result};
use crate::core::net::connection::ConnectionHandle;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Consumer of accepted connections.
///
/// Called on the accept loop's thread once per connection, so it must not
/// block for long. An `Err` is logged and the loop moves on.
pub trait ConnectionSink: Send + 'static {
    fn on_accept(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()>;
}

impl<F> ConnectionSink for F
where
    F: FnMut(TcpStream, SocketAddr) -> Result<()> + Send + 'static,
{
    fn on_accept(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        self(stream, peer)
    }
}

/// Hands connections to another thread through a bounded queue.
///
/// When the queue stays full for `send_timeout` the connection is dropped
/// and reported as a dispatch failure.
pub struct ChannelSink {
    sender: Sender<ConnectionHandle>,
    send_timeout: Duration,
}

impl ChannelSink {
    pub fn bounded(capacity: usize, send_timeout: Duration) -> (Self, Receiver<ConnectionHandle>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                send_timeout,
            },
            receiver,
        )
    }
}

impl ConnectionSink for ChannelSink {
    fn on_accept(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        self.sender
            .send_timeout(ConnectionHandle::new(stream, peer), self.send_timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(conn) => ListenerError::DispatchError(format!(
                    "queue full, dropped connection from {}",
                    conn.peer_addr()
                )),
                SendTimeoutError::Disconnected(conn) => ListenerError::DispatchError(format!(
                    "consumer gone, dropped connection from {}",
                    conn.peer_addr()
                )),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    fn connected_pair() -> (TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        drop(client);
        (server, peer)
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let mut sink = move |_stream: TcpStream, peer: SocketAddr| -> Result<()> {
            recorder.lock().unwrap().push(peer);
            Ok(())
        };
        let (stream, peer) = connected_pair();
        ConnectionSink::on_accept(&mut sink, stream, peer).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![peer]);
    }

    #[test]
    fn test_channel_sink_delivers() {
        let (mut sink, rx) = ChannelSink::bounded(4, Duration::from_millis(50));
        let (stream, peer) = connected_pair();
        sink.on_accept(stream, peer).unwrap();
        assert_eq!(rx.try_recv().unwrap().peer_addr(), peer);
    }

    #[test]
    fn test_channel_sink_full_queue() {
        let (mut sink, _rx) = ChannelSink::bounded(1, Duration::from_millis(20));
        let (stream, peer) = connected_pair();
        sink.on_accept(stream, peer).unwrap();
        let (stream, peer) = connected_pair();
        assert!(matches!(
            sink.on_accept(stream, peer),
            Err(ListenerError::DispatchError(_))
        ));
    }

    #[test]
    fn test_channel_sink_disconnected() {
        let (mut sink, rx) = ChannelSink::bounded(1, Duration::from_millis(20));
        drop(rx);
        let (stream, peer) = connected_pair();
        let err = sink.on_accept(stream, peer).unwrap_err();
        assert!(err.to_string().contains("consumer gone"));
    }
}
