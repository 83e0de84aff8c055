use crate::application::config::models::ListenerConfig;
use crate::application::server::accept_loop::{AcceptLoop, LoopStats};
use crate::application::server::sink::ConnectionSink;
use crate::common::constants::{DEFAULT_POLL_INTERVAL_MS, WORKER_THREAD_NAME};
use crate::common::error::{ListenerError, Result};
use crate::core::net::address::{Address, Backlog};
use crate::core::net::socket::{ListenSocket, SocketState};
use crate::core::thread::cancel::CancelToken;
use crate::core::thread::worker::{ThreadState, Worker};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// A listening socket plus the worker thread that accepts on it.
///
/// Supported shutdown order is `request_cancel`, `join`, `close`; dropping
/// the listener performs all three.
pub struct ThreadedListener<S: ConnectionSink> {
    address: Address,
    backlog: Backlog,
    poll_interval: Duration,
    socket: Arc<ListenSocket>,
    sink: Option<S>,
    worker: Option<Worker<AcceptLoop<S>>>,
    stats: Arc<LoopStats>,
}

impl<S: ConnectionSink> ThreadedListener<S> {
    pub fn new(address: Address, backlog: Backlog, sink: S) -> Self {
        Self {
            address,
            backlog,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            socket: Arc::new(ListenSocket::new()),
            sink: Some(sink),
            worker: None,
            stats: Arc::new(LoopStats::default()),
        }
    }

    pub fn from_config(config: &ListenerConfig, sink: S) -> Result<Self> {
        let address = Address::parse(&config.address)?;
        let backlog = Backlog::new(config.backlog)?;
        Ok(Self::new(address, backlog, sink).with_poll_interval(config.poll_interval()))
    }

    /// Bound on each accept wait, and so on cancellation latency.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn bind(&self) -> Result<SocketAddr> {
        self.socket.bind(&self.address)
    }

    pub fn listen(&self) -> Result<()> {
        self.socket.listen(self.backlog)
    }

    /// Launch the accept loop on its own thread. Only the first call
    /// succeeds.
    pub fn start(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.as_mut() {
            return worker.start();
        }

        match self.socket.state() {
            SocketState::Listening => {}
            SocketState::Closed => return Err(ListenerError::Closed),
            SocketState::Unbound | SocketState::Bound => return Err(ListenerError::NotListening),
        }

        let sink = self.sink.take().ok_or(ListenerError::AlreadyStarted)?;
        let accept_loop = AcceptLoop::with_stats(
            Arc::clone(&self.socket),
            sink,
            self.poll_interval,
            Arc::clone(&self.stats),
        )?;
        let mut worker = Worker::new(WORKER_THREAD_NAME, accept_loop);
        let started = worker.start();
        self.worker = Some(worker);
        started
    }

    pub fn request_cancel(&self) {
        if let Some(worker) = self.worker.as_ref() {
            worker.request_cancel();
        }
    }

    /// Wait for the accept loop to finish and return its fatal error, if
    /// it stopped on one.
    pub fn join(&mut self) -> Result<()> {
        self.worker
            .as_mut()
            .ok_or(ListenerError::NotStarted)?
            .join()
    }

    pub fn close(&self) {
        self.socket.close();
    }

    /// Cancel, join and close in the supported order.
    pub fn shutdown(&mut self) -> Result<()> {
        self.request_cancel();
        let joined = match self.worker.as_mut() {
            Some(worker) => worker.join(),
            None => Ok(()),
        };
        self.close();
        joined
    }

    /// Token that cancels the running loop from another thread.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.worker.as_ref().map(Worker::cancel_token)
    }

    pub fn state(&self) -> ThreadState {
        self.worker
            .as_ref()
            .map(Worker::state)
            .unwrap_or(ThreadState::Idle)
    }

    pub fn socket_state(&self) -> SocketState {
        self.socket.state()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn backlog(&self) -> Backlog {
        self.backlog
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }
}

impl<S: ConnectionSink> Drop for ThreadedListener<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(address = %self.address, error = %e, "accept loop ended with an error");
        }
    }
}
