use cascades_frame::FrameError;
use cascades_transport::TransportError;

use crate::port::Direction;

/// Errors that can occur in port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The endpoint could not be resolved or bound.
    #[error("port {port}: connection error: {source}")]
    Connection {
        port: String,
        #[source]
        source: TransportError,
    },

    /// A transient failure on an open port. The port stays usable.
    #[error("port {port}: transport error: {source}")]
    Transport {
        port: String,
        #[source]
        source: FrameError,
    },

    /// The remote side went away. Returned once; the port is now closed.
    #[error("port {port}: disconnected")]
    Disconnected { port: String },

    /// The port was already closed.
    #[error("port {port}: already closed")]
    Closed { port: String },

    /// Receive on an output port or send on an input port.
    #[error("port {port}: operation not supported on {direction} port")]
    WrongDirection { port: String, direction: Direction },

    /// The component was started without a port it needs.
    #[error("component has no {role} port")]
    MissingPort { role: &'static str },
}

impl PortError {
    /// True for the errors that mean the port will never carry data again.
    pub fn is_closed(&self) -> bool {
        matches!(self, PortError::Disconnected { .. } | PortError::Closed { .. })
    }

    /// Name of the port the error concerns, if any.
    pub fn port(&self) -> Option<&str> {
        match self {
            PortError::Connection { port, .. }
            | PortError::Transport { port, .. }
            | PortError::Disconnected { port }
            | PortError::Closed { port }
            | PortError::WrongDirection { port, .. } => Some(port),
            PortError::MissingPort { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PortError>;

/// A transform failed on a valid packet. The packet is dropped.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The payload could not be decoded into what the transform expects.
    #[error("payload decode failed: {0}")]
    Decode(String),

    /// The transform could not produce output from a decoded payload.
    #[error("render failed: {0}")]
    Render(String),

    /// Writing to the component's visible output failed.
    #[error("output write failed: {0}")]
    Io(#[from] std::io::Error),
}
