use crate::common::error::{ListenerError, Result};
use crate::core::thread::cancel::CancelToken;
use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Lifecycle of a worker. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Idle = 0,
    Running = 1,
    CancelRequested = 2,
    Stopped = 3,
}

impl ThreadState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ThreadState::Idle,
            1 => ThreadState::Running,
            2 => ThreadState::CancelRequested,
            _ => ThreadState::Stopped,
        }
    }
}

/// Body executed on a worker thread.
///
/// The body must check `cancel` at its checkpoints and return once it is
/// set. An `Err` return is handed to whoever joins the worker.
pub trait Runnable: Send + 'static {
    fn run(self, cancel: &CancelToken) -> Result<()>;
}

impl<F> Runnable for F
where
    F: FnOnce(&CancelToken) -> Result<()> + Send + 'static,
{
    fn run(self, cancel: &CancelToken) -> Result<()> {
        self(cancel)
    }
}

struct StateCell(AtomicU8);

impl StateCell {
    fn load(&self) -> ThreadState {
        ThreadState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: ThreadState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn advance(&self, from: ThreadState, to: ThreadState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// Marks the worker stopped when the body returns or unwinds.
struct StopGuard(Arc<StateCell>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.store(ThreadState::Stopped);
    }
}

/// A single background thread that runs one [`Runnable`] exactly once.
pub struct Worker<R: Runnable> {
    name: String,
    body: Option<R>,
    state: Arc<StateCell>,
    cancel: CancelToken,
    handle: Option<JoinHandle<Result<()>>>,
}

impl<R: Runnable> Worker<R> {
    pub fn new(name: impl Into<String>, body: R) -> Self {
        Self {
            name: name.into(),
            body: Some(body),
            state: Arc::new(StateCell(AtomicU8::new(ThreadState::Idle as u8))),
            cancel: CancelToken::new(),
            handle: None,
        }
    }

    /// Current lifecycle state. A cancellation made through any clone of
    /// the token shows as `CancelRequested` until the body returns.
    pub fn state(&self) -> ThreadState {
        if self.cancel.is_cancelled()
            && self
                .state
                .advance(ThreadState::Running, ThreadState::CancelRequested)
        {
            debug!(worker = %self.name, "cancellation observed");
        }
        self.state.load()
    }

    /// Token observed by the body; clones may cancel from other threads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn start(&mut self) -> Result<()> {
        let body = self.body.take().ok_or(ListenerError::AlreadyStarted)?;
        if !self.state.advance(ThreadState::Idle, ThreadState::Running) {
            return Err(ListenerError::AlreadyStarted);
        }

        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _stopped = StopGuard(state);
                body.run(&cancel)
            });

        match spawned {
            Ok(handle) => {
                info!(worker = %self.name, "worker started");
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.store(ThreadState::Stopped);
                Err(ListenerError::ResourceExhausted(e))
            }
        }
    }

    /// Ask the body to stop at its next checkpoint. Never blocks.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
        if self
            .state
            .advance(ThreadState::Running, ThreadState::CancelRequested)
        {
            debug!(worker = %self.name, "cancellation requested");
        }
    }

    /// Wait for the body to return and collect its result.
    ///
    /// The first join after `start` yields the body's result; later joins
    /// return `Ok(())` immediately.
    pub fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                let result = match handle.join() {
                    Ok(result) => result,
                    Err(payload) => Err(ListenerError::WorkerPanicked(panic_message(&*payload))),
                };
                debug!(worker = %self.name, ok = result.is_ok(), "worker joined");
                result
            }
            None if self.state() == ThreadState::Idle => Err(ListenerError::NotStarted),
            None => Ok(()),
        }
    }
}

impl<R: Runnable> Drop for Worker<R> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_cancel();
            let _ = self.join();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
