//! Stream transports for cascades ports.
//!
//! Provides a unified async interface over the transports a port can bind to
//! or connect through:
//! - TCP (`tcp://host:port`)
//! - Unix domain sockets (`ipc:///path/to.sock`, unix only)
//!
//! This is the lowest layer of cascades. Everything else builds on top of the
//! [`Endpoint`], [`Listener`] and [`IpcStream`] types provided here.

pub mod endpoint;
pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use stream::{IpcStream, Listener};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
