//! Ports and the component runtime.
//!
//! This is the "just works" layer a component process is built from:
//! open its ports, hand a transform to [`Component`], and the loop takes care
//! of IP validation, ordering and the shutdown cascade.

pub mod component;
pub mod config;
pub mod error;
pub mod port;
pub mod shutdown;
pub mod transform;

pub use cascades_frame::Ip;
pub use component::{configure, Component, Ports};
pub use config::PortConfig;
pub use error::{PortError, Result, TransformError};
pub use port::{ClosedSignal, Direction, Port, PortState};
pub use shutdown::{Shutdown, ShutdownReason};
pub use transform::{Configure, Emitter, Transform};
