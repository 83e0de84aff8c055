// Shared helpers for listener integration tests

use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use passive_listener::common::logger::Logger;
use passive_listener::{Address, Backlog, Result, ThreadedListener};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Records the peer address of every dispatched connection, in order
#[derive(Clone, Default)]
pub struct Recorder {
    peers: Arc<Mutex<Vec<SocketAddr>>>,
    streams: Arc<Mutex<Vec<TcpStream>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink closure that keeps the stream open and remembers the peer
    pub fn sink(&self) -> impl FnMut(TcpStream, SocketAddr) -> Result<()> + Send + 'static {
        let peers = Arc::clone(&self.peers);
        let streams = Arc::clone(&self.streams);
        move |stream: TcpStream, peer: SocketAddr| -> Result<()> {
            peers.lock().unwrap().push(peer);
            streams.lock().unwrap().push(stream);
            Ok(())
        }
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

/// Build a loopback listener on an ephemeral port
pub fn loopback_listener<S>(backlog: u32, sink: S) -> ThreadedListener<S>
where
    S: passive_listener::ConnectionSink,
{
    Logger::init_for_tests();
    ThreadedListener::new(
        Address::parse("127.0.0.1:0").unwrap(),
        Backlog::new(backlog).unwrap(),
        sink,
    )
    .with_poll_interval(POLL_INTERVAL)
}

/// Bind, listen and return the bound address
#[allow(dead_code)] // Not every test file starts the loop right away
pub fn bind_and_listen<S>(listener: &ThreadedListener<S>) -> SocketAddr
where
    S: passive_listener::ConnectionSink,
{
    let addr = listener.bind().expect("bind failed");
    listener.listen().expect("listen failed");
    addr
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).expect("Failed to connect to listener")
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
