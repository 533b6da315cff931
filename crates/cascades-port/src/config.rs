use std::time::Duration;

use cascades_frame::DEFAULT_MAX_MESSAGE;

/// Tunables for a single port.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Maximum multipart message body accepted or produced, in bytes.
    pub max_message_size: usize,
    /// Capacity of the inbound and outbound message queues. Zero is treated as one.
    pub queue_capacity: usize,
    /// Delay between connection attempts of an output port.
    pub reconnect_interval: Duration,
    /// Permission mode for `ipc://` socket files bound by input ports.
    pub socket_mode: u32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
            queue_capacity: 1024,
            reconnect_interval: Duration::from_millis(100),
            socket_mode: 0o600,
        }
    }
}
