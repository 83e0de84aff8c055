pub mod address;
pub mod connection;
pub mod socket;

pub use address::{Address, Backlog};
pub use connection::ConnectionHandle;
pub use socket::{AcceptOutcome, Acceptor, ListenSocket, SocketState};
