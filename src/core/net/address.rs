use crate::common::constants::{DEFAULT_BACKLOG, MAX_BACKLOG};
use crate::common::error::{ListenerError, Result};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::num::NonZeroU32;
use std::str::FromStr;

/// A resolved listening address, fixed once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(SocketAddr);

impl Address {
    /// Parse `host:port` text, resolving host names.
    ///
    /// When a name resolves to several addresses the first one is used.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Ok(addr) = text.parse::<SocketAddr>() {
            return Ok(Self(addr));
        }

        let (host, port) = text.rsplit_once(':').ok_or_else(|| {
            ListenerError::AddressParseError(format!("'{}' is not in host:port form", text))
        })?;
        if host.is_empty() {
            return Err(ListenerError::AddressParseError(format!(
                "'{}' is missing a host",
                text
            )));
        }
        let port: u16 = port.parse().map_err(|_| {
            ListenerError::AddressParseError(format!("'{}' has an invalid port", text))
        })?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        (host, port)
            .to_socket_addrs()
            .map_err(|e| {
                ListenerError::AddressParseError(format!("Failed to resolve '{}': {}", text, e))
            })?
            .next()
            .map(Self)
            .ok_or_else(|| {
                ListenerError::AddressParseError(format!("'{}' resolved to no addresses", text))
            })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for Address {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Length of the pending-connection queue handed to `listen(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backlog(NonZeroU32);

impl Backlog {
    pub fn new(backlog: u32) -> Result<Self> {
        if backlog > MAX_BACKLOG {
            return Err(ListenerError::InvalidBacklog(backlog as u64));
        }
        NonZeroU32::new(backlog)
            .map(Self)
            .ok_or(ListenerError::InvalidBacklog(0))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl Default for Backlog {
    fn default() -> Self {
        Self(NonZeroU32::new(DEFAULT_BACKLOG).unwrap_or(NonZeroU32::MIN))
    }
}

impl TryFrom<u32> for Backlog {
    type Error = ListenerError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}
