use crate::common::error::{ListenerError, Result};
use crate::common::time::Timeout;
use crate::core::net::address::{Address, Backlog};
use crate::core::net::connection::ConnectionHandle;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unbound,
    Bound,
    Listening,
    Closed,
}

/// Result of a bounded wait for a new connection.
#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted(ConnectionHandle),
    TimedOut,
}

/// Source of connections driven by an accept loop.
pub trait Acceptor: Send + Sync + 'static {
    fn accept_with_timeout(&self, timeout: Duration) -> Result<AcceptOutcome>;

    fn local_addr(&self) -> Result<SocketAddr>;

    /// Reserve the source for a single accept loop.
    fn claim_accept_loop(&self) -> Result<()>;
}

struct SocketMeta {
    state: SocketState,
    local_addr: Option<SocketAddr>,
}

/// A passive TCP socket: bind, listen, bounded accept, close.
///
/// Every operation takes `&self` so the owner and the accept loop can share
/// one instance through an `Arc`. The socket lock is held for the whole
/// bounded wait, so `close()` never releases a descriptor that an accept is
/// still polling; it waits for that one accept to return instead. State and
/// address sit behind a separate lock that is only held briefly.
pub struct ListenSocket {
    socket: Mutex<Option<Socket>>,
    meta: Mutex<SocketMeta>,
    closing: AtomicBool,
    loop_attached: AtomicBool,
}

impl ListenSocket {
    pub fn new() -> Self {
        Self {
            socket: Mutex::new(None),
            meta: Mutex::new(SocketMeta {
                state: SocketState::Unbound,
                local_addr: None,
            }),
            closing: AtomicBool::new(false),
            loop_attached: AtomicBool::new(false),
        }
    }

    // Lock order when both are needed: socket, then meta.
    fn lock_socket(&self) -> MutexGuard<'_, Option<Socket>> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_meta(&self) -> MutexGuard<'_, SocketMeta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SocketState {
        self.lock_meta().state
    }

    /// Create the OS socket and bind it to `address`.
    ///
    /// Returns the address actually bound, which differs from `address` when
    /// port 0 was requested. On failure the socket stays unbound and holds no
    /// descriptor.
    pub fn bind(&self, address: &Address) -> Result<SocketAddr> {
        let mut slot = self.lock_socket();
        let mut meta = self.lock_meta();
        match meta.state {
            SocketState::Closed => return Err(ListenerError::Closed),
            SocketState::Bound | SocketState::Listening => {
                return Err(ListenerError::AlreadyBound)
            }
            SocketState::Unbound => {}
        }

        let addr = address.socket_addr();
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        // Close-on-exec is set by socket2 at creation.
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(|e| {
            match e.raw_os_error() {
                Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM) => {
                    ListenerError::ResourceExhausted(e)
                }
                _ => ListenerError::system("socket", e),
            }
        })?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ListenerError::system("setsockopt(SO_REUSEADDR)", e))?;

        socket.bind(&addr.into()).map_err(|e| match e.raw_os_error() {
            Some(libc::EADDRINUSE) => ListenerError::AddressInUse(addr),
            Some(libc::EACCES | libc::EPERM) => ListenerError::PermissionDenied(addr),
            _ => ListenerError::system("bind", e),
        })?;

        let local = socket
            .local_addr()
            .map_err(|e| ListenerError::system("getsockname", e))?
            .as_socket()
            .ok_or_else(|| {
                ListenerError::system(
                    "getsockname",
                    io::Error::new(io::ErrorKind::InvalidData, "not an inet address"),
                )
            })?;
        *slot = Some(socket);
        meta.local_addr = Some(local);
        meta.state = SocketState::Bound;

        info!(addr = %local, "socket bound");
        Ok(local)
    }

    /// Mark the bound socket passive. Allowed once.
    pub fn listen(&self, backlog: Backlog) -> Result<()> {
        let slot = self.lock_socket();
        let mut meta = self.lock_meta();
        match meta.state {
            SocketState::Closed => return Err(ListenerError::Closed),
            SocketState::Listening => return Err(ListenerError::AlreadyListening),
            SocketState::Unbound => return Err(ListenerError::NotBound),
            SocketState::Bound => {}
        }

        let socket = slot.as_ref().ok_or(ListenerError::NotBound)?;
        socket
            .listen(backlog.get() as i32)
            .map_err(|e| ListenerError::system("listen", e))?;

        // A pending connection can vanish between poll and accept; a
        // blocking accept would then hang past the timeout.
        socket
            .set_nonblocking(true)
            .map_err(|e| ListenerError::system("fcntl(O_NONBLOCK)", e))?;
        meta.state = SocketState::Listening;

        info!(
            addr = ?meta.local_addr,
            backlog = backlog.get(),
            "socket listening"
        );
        Ok(())
    }

    /// Wait up to `timeout` for one incoming connection.
    ///
    /// `TimedOut` is a normal outcome. Interrupted waits and connections that
    /// disappear before they are accepted are absorbed while time remains.
    pub fn accept_with_timeout(&self, timeout: Duration) -> Result<AcceptOutcome> {
        if self.closing.load(Ordering::Acquire) {
            return Err(ListenerError::Closed);
        }
        match self.state() {
            SocketState::Closed => return Err(ListenerError::Closed),
            SocketState::Unbound | SocketState::Bound => {
                return Err(ListenerError::NotListening)
            }
            SocketState::Listening => {}
        }

        let slot = self.lock_socket();
        let socket = slot.as_ref().ok_or(ListenerError::Closed)?;

        let deadline = Timeout::new(timeout);
        loop {
            match wait_readable(socket.as_raw_fd(), deadline.remaining_poll_ms()) {
                Ok(true) => {}
                Ok(false) => return Ok(AcceptOutcome::TimedOut),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if deadline.is_expired() {
                        return Ok(AcceptOutcome::TimedOut);
                    }
                    continue;
                }
                Err(e) => return Err(ListenerError::system("poll", e)),
            }

            match accept_connection(socket) {
                Ok(conn) => return Ok(AcceptOutcome::Accepted(conn)),
                Err(e) if is_retryable(&e) => {
                    if deadline.is_expired() {
                        return Ok(AcceptOutcome::TimedOut);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Release the descriptor. Safe from any state and idempotent.
    ///
    /// If an accept is in flight this waits for it to return.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        let mut slot = self.lock_socket();
        let socket = slot.take();
        let mut meta = self.lock_meta();
        if socket.is_some() {
            debug!(addr = ?meta.local_addr, "closing listening socket");
        }
        meta.state = SocketState::Closed;
        drop(socket);
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let meta = self.lock_meta();
        match meta.state {
            SocketState::Closed => Err(ListenerError::Closed),
            SocketState::Unbound => Err(ListenerError::NotBound),
            SocketState::Bound | SocketState::Listening => {
                meta.local_addr.ok_or(ListenerError::NotBound)
            }
        }
    }

    /// Reserve this socket for a single accept loop.
    pub fn claim_accept_loop(&self) -> Result<()> {
        if self.loop_attached.swap(true, Ordering::AcqRel) {
            return Err(ListenerError::AlreadyStarted);
        }
        Ok(())
    }
}

impl Default for ListenSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Acceptor for ListenSocket {
    fn accept_with_timeout(&self, timeout: Duration) -> Result<AcceptOutcome> {
        ListenSocket::accept_with_timeout(self, timeout)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        ListenSocket::local_addr(self)
    }

    fn claim_accept_loop(&self) -> Result<()> {
        ListenSocket::claim_accept_loop(self)
    }
}

// Ok(false) when the wait expired with nothing pending.
fn wait_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    if rc > 0 && pfd.revents & libc::POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    Ok(rc > 0)
}

fn accept_connection(listener: &Socket) -> Result<ConnectionHandle> {
    let (client, peer) = listener
        .accept()
        .map_err(|e| ListenerError::system("accept", e))?;
    // BSD-derived systems copy O_NONBLOCK from the listener.
    client
        .set_nonblocking(false)
        .map_err(|e| ListenerError::system("fcntl(O_NONBLOCK)", e))?;

    let stream = TcpStream::from(client);
    let peer = match peer.as_socket() {
        Some(peer) => peer,
        None => stream
            .peer_addr()
            .map_err(|e| ListenerError::system("getpeername", e))?,
    };
    Ok(ConnectionHandle::new(stream, peer))
}

fn is_retryable(err: &ListenerError) -> bool {
    match err {
        ListenerError::SystemError { op: "accept", source } => matches!(
            source.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn loopback() -> Address {
        Address::parse("127.0.0.1:0").unwrap()
    }

    fn listening() -> ListenSocket {
        let socket = ListenSocket::new();
        socket.bind(&loopback()).unwrap();
        socket.listen(Backlog::default()).unwrap();
        socket
    }

    #[test]
    fn test_bind_resolves_ephemeral_port() {
        let socket = ListenSocket::new();
        let local = socket.bind(&loopback()).unwrap();
        assert_ne!(local.port(), 0);
        assert_eq!(socket.local_addr().unwrap(), local);
        assert_eq!(socket.state(), SocketState::Bound);
    }

    #[test]
    fn test_bind_twice_rejected() {
        let socket = ListenSocket::new();
        socket.bind(&loopback()).unwrap();
        assert!(matches!(socket.bind(&loopback()), Err(ListenerError::AlreadyBound)));
    }

    #[test]
    fn test_bind_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = Address::from(taken.local_addr().unwrap());
        let socket = ListenSocket::new();
        match socket.bind(&addr) {
            Err(ListenerError::AddressInUse(a)) => assert_eq!(a, addr.socket_addr()),
            other => panic!("expected AddressInUse, got {:?}", other.map(|_| ())),
        }
        assert_eq!(socket.state(), SocketState::Unbound);
        socket.close();
    }

    #[test]
    fn test_listen_requires_bind() {
        let socket = ListenSocket::new();
        assert!(matches!(
            socket.listen(Backlog::default()),
            Err(ListenerError::NotBound)
        ));
    }

    #[test]
    fn test_listen_twice_rejected() {
        let socket = listening();
        assert!(matches!(
            socket.listen(Backlog::default()),
            Err(ListenerError::AlreadyListening)
        ));
        assert_eq!(socket.state(), SocketState::Listening);
    }

    #[test]
    fn test_accept_requires_listen() {
        let socket = ListenSocket::new();
        socket.bind(&loopback()).unwrap();
        assert!(matches!(
            socket.accept_with_timeout(Duration::from_millis(10)),
            Err(ListenerError::NotListening)
        ));
    }

    #[test]
    fn test_accept_times_out() {
        let socket = listening();
        let start = Instant::now();
        let outcome = socket.accept_with_timeout(Duration::from_millis(50)).unwrap();
        assert!(matches!(outcome, AcceptOutcome::TimedOut));
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_accept_returns_blocking_stream() {
        let socket = listening();
        let addr = socket.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();

        match socket.accept_with_timeout(Duration::from_secs(2)).unwrap() {
            AcceptOutcome::Accepted(conn) => {
                assert_eq!(conn.peer_addr(), client.local_addr().unwrap());
                let flags = unsafe { libc::fcntl(conn.stream().as_raw_fd(), libc::F_GETFL) };
                assert_eq!(flags & libc::O_NONBLOCK, 0);
            }
            AcceptOutcome::TimedOut => panic!("connection was not accepted"),
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let socket = listening();
        socket.close();
        socket.close();
        assert_eq!(socket.state(), SocketState::Closed);
        assert!(matches!(socket.local_addr(), Err(ListenerError::Closed)));
    }

    #[test]
    fn test_operations_after_close() {
        let socket = ListenSocket::new();
        socket.close();
        assert!(matches!(socket.bind(&loopback()), Err(ListenerError::Closed)));
        assert!(matches!(
            socket.listen(Backlog::default()),
            Err(ListenerError::Closed)
        ));
        assert!(matches!(
            socket.accept_with_timeout(Duration::from_millis(1)),
            Err(ListenerError::Closed)
        ));
    }

    #[test]
    fn test_unbounded_accept_takes_pending_client() {
        let socket = listening();
        let client = TcpStream::connect(socket.local_addr().unwrap()).unwrap();

        match socket.accept_with_timeout(Duration::MAX).unwrap() {
            AcceptOutcome::Accepted(conn) => {
                assert_eq!(conn.peer_addr(), client.local_addr().unwrap());
            }
            AcceptOutcome::TimedOut => panic!("connection was not accepted"),
        }
    }

    #[test]
    fn test_accepted_stream_is_cloexec() {
        let socket = listening();
        let _client = TcpStream::connect(socket.local_addr().unwrap()).unwrap();

        match socket.accept_with_timeout(Duration::from_secs(2)).unwrap() {
            AcceptOutcome::Accepted(conn) => {
                let flags = unsafe { libc::fcntl(conn.stream().as_raw_fd(), libc::F_GETFD) };
                assert_ne!(flags & libc::FD_CLOEXEC, 0);
            }
            AcceptOutcome::TimedOut => panic!("connection was not accepted"),
        }
    }

    #[test]
    fn test_single_accept_loop_claim() {
        let socket = listening();
        socket.claim_accept_loop().unwrap();
        assert!(matches!(
            socket.claim_accept_loop(),
            Err(ListenerError::AlreadyStarted)
        ));
    }
}
