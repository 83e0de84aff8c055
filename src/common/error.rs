use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Address parse error: {0}")]
    AddressParseError(String),

    #[error("Invalid backlog {0}: must be between 1 and 65535")]
    InvalidBacklog(u64),

    #[error("Resource exhausted while creating socket: {0}")]
    ResourceExhausted(#[source] io::Error),

    #[error("Address {0} is already in use")]
    AddressInUse(SocketAddr),

    #[error("Permission denied binding {0}")]
    PermissionDenied(SocketAddr),

    #[error("Socket is already bound")]
    AlreadyBound,

    #[error("Socket is not bound")]
    NotBound,

    #[error("Socket is already listening")]
    AlreadyListening,

    #[error("Socket is not listening")]
    NotListening,

    #[error("Worker already started")]
    AlreadyStarted,

    #[error("Worker not started")]
    NotStarted,

    #[error("Socket is closed")]
    Closed,

    #[error("System error during {op}: {source}")]
    SystemError {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Dispatch error: {0}")]
    DispatchError(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ListenerError {
    pub fn system(op: &'static str, source: io::Error) -> Self {
        ListenerError::SystemError { op, source }
    }

    /// OS error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ListenerError::SystemError { source, .. } => source.raw_os_error(),
            ListenerError::ResourceExhausted(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// Whether an accept loop may retry after this error.
    ///
    /// Covers a peer resetting before it was accepted, interrupted calls,
    /// per-connection firewall rejections and temporary descriptor or memory
    /// exhaustion. Everything else leaves the socket unusable.
    pub fn is_transient(&self) -> bool {
        match self.raw_os_error() {
            Some(code) => is_transient_errno(code),
            None => false,
        }
    }

    /// Transient errors that persist until something else releases
    /// resources; retrying them immediately would spin.
    pub fn is_resource_pressure(&self) -> bool {
        matches!(
            self.raw_os_error(),
            Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
        )
    }
}

fn is_transient_errno(code: i32) -> bool {
    matches!(
        code,
        libc::ECONNABORTED
            | libc::ECONNRESET
            | libc::ENOTCONN
            | libc::EINTR
            | libc::EAGAIN
            | libc::EPROTO
            | libc::EPERM
            | libc::ETIMEDOUT
            | libc::EHOSTDOWN
            | libc::EHOSTUNREACH
            | libc::ENETDOWN
            | libc::ENETUNREACH
            | libc::EOPNOTSUPP
            | libc::EMFILE
            | libc::ENFILE
            | libc::ENOBUFS
            | libc::ENOMEM
    )
}

pub type Result<T> = std::result::Result<T, ListenerError>;
