//! A TCP listening endpoint that runs its accept loop on a dedicated worker
//! thread and hands every accepted connection to a [`ConnectionSink`].
//!
//! The owner drives the lifecycle explicitly:
//!
//! ```no_run
//! use passive_listener::{Address, Backlog, ThreadedListener};
//! use std::net::{SocketAddr, TcpStream};
//!
//! # fn main() -> passive_listener::Result<()> {
//! let address = Address::parse("127.0.0.1:0")?;
//! let sink = |_stream: TcpStream, peer: SocketAddr| -> passive_listener::Result<()> {
//!     println!("accepted {}", peer);
//!     Ok(())
//! };
//! let mut listener = ThreadedListener::new(address, Backlog::default(), sink);
//! listener.bind()?;
//! listener.listen()?;
//! listener.start()?;
//! // ...
//! listener.request_cancel();
//! listener.join()?;
//! listener.close();
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod common;
pub mod core;

pub use crate::application::config::{ConfigLoader, ListenerConfig};
pub use crate::application::server::{
    AcceptLoop, ChannelSink, ConnectionSink, LoopStats, ThreadedListener,
};
pub use crate::common::error::{ListenerError, Result};
pub use crate::core::net::{
    AcceptOutcome, Acceptor, Address, Backlog, ConnectionHandle, ListenSocket, SocketState,
};
pub use crate::core::thread::{CancelToken, Runnable, ThreadState, Worker};
