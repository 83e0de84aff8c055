use crate::application::server::sink::ConnectionSink;
use crate::common::error::Result;
use crate::core::net::connection::ConnectionHandle;
use crate::core::net::socket::{AcceptOutcome, Acceptor, ListenSocket};
use crate::core::thread::cancel::CancelToken;
use crate::core::thread::worker::{panic_message, Runnable};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters updated by the accept loop, readable from any thread.
#[derive(Debug, Default)]
pub struct LoopStats {
    accepted: AtomicU64,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
    transient_errors: AtomicU64,
}

impl LoopStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }

    pub fn transient_errors(&self) -> u64 {
        self.transient_errors.load(Ordering::Relaxed)
    }
}

/// Repeatedly accepts on a listening socket and feeds a sink until
/// cancelled. The socket is any [`Acceptor`], normally a [`ListenSocket`].
///
/// Each cycle waits at most `poll_interval`, so a cancellation is noticed
/// within one interval even when no client ever connects. A connection that
/// was accepted is always dispatched before the next cancellation check.
pub struct AcceptLoop<S: ConnectionSink, A: Acceptor = ListenSocket> {
    socket: Arc<A>,
    sink: S,
    poll_interval: Duration,
    stats: Arc<LoopStats>,
}

impl<S: ConnectionSink, A: Acceptor> AcceptLoop<S, A> {
    /// Attach a loop to `socket`. Fails with `AlreadyStarted` if the socket
    /// already has one.
    pub fn new(socket: Arc<A>, sink: S, poll_interval: Duration) -> Result<Self> {
        Self::with_stats(socket, sink, poll_interval, Arc::new(LoopStats::default()))
    }

    pub fn with_stats(
        socket: Arc<A>,
        sink: S,
        poll_interval: Duration,
        stats: Arc<LoopStats>,
    ) -> Result<Self> {
        socket.claim_accept_loop()?;
        Ok(Self {
            socket,
            sink,
            poll_interval,
            stats,
        })
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        Arc::clone(&self.stats)
    }

    fn dispatch(&mut self, conn: ConnectionHandle) {
        let (stream, peer) = conn.into_parts();
        let sink = &mut self.sink;
        match panic::catch_unwind(AssertUnwindSafe(|| sink.on_accept(stream, peer))) {
            Ok(Ok(())) => {
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                debug!(%peer, "connection dispatched");
            }
            Ok(Err(e)) => {
                self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, error = %e, "dispatch failed");
            }
            Err(payload) => {
                self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, panic = %panic_message(&*payload), "sink panicked during dispatch");
            }
        }
    }
}

impl<S: ConnectionSink, A: Acceptor> Runnable for AcceptLoop<S, A> {
    fn run(mut self, cancel: &CancelToken) -> Result<()> {
        let addr = self.socket.local_addr().ok();
        info!(
            addr = ?addr,
            poll_ms = self.poll_interval.as_millis() as u64,
            "accept loop running"
        );

        loop {
            if cancel.is_cancelled() {
                info!(addr = ?addr, accepted = self.stats.accepted(), "accept loop exiting");
                return Ok(());
            }

            match self.socket.accept_with_timeout(self.poll_interval) {
                Ok(AcceptOutcome::TimedOut) => {}
                Ok(AcceptOutcome::Accepted(conn)) => {
                    self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                    self.dispatch(conn);
                }
                Err(e) if e.is_transient() => {
                    self.stats.transient_errors.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, "transient accept error");
                    if e.is_resource_pressure() {
                        cancel.wait_timeout(self.poll_interval);
                    }
                }
                Err(e) => {
                    error!(addr = ?addr, error = %e, "accept loop stopped on fatal error");
                    return Err(e);
                }
            }
        }
    }
}
