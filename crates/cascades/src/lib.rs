//! Reference components for cascades flow-based programs.
//!
//! Each component is a separate process that talks to its neighbours only
//! through ports. This crate carries the two reference components and the
//! process plumbing they share.
//!
//! # Crate Structure
//!
//! - [`transport`]: Endpoints and stream transports (TCP, Unix sockets)
//! - [`frame`]: Multipart message framing and the IP codec
//! - [`port`]: Ports, the component loop and the shutdown cascade
//! - [`components`]: The console sink and the template transform
//! - [`template`]: The template language used by the template transform

pub mod cli;
pub mod components;
pub mod exit;
pub mod logging;
pub mod manifest;
pub mod template;

/// Re-export transport types.
pub mod transport {
    pub use cascades_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cascades_frame::*;
}

/// Re-export port and component runtime types.
pub mod port {
    pub use cascades_port::*;
}
