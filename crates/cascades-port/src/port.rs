use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use cascades_frame::{FrameError, Ip, MessageCodec, FRAME_PREFIX_SIZE};
use cascades_transport::{Endpoint, IpcStream, Listener};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::PortConfig;
use crate::error::{PortError, Result};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const LINGER: Duration = Duration::from_millis(500);

/// Which way IPs flow through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Binds its endpoint and receives from upstream connections.
    Input,
    /// Connects to its endpoint and sends downstream.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Lifecycle of a port. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Open,
    Closed,
}

/// Resolves once the remote side of a port's connection is lost.
///
/// Cloneable and independent of the port itself, so a watcher task can
/// observe a port while the main loop owns it.
#[derive(Debug, Clone)]
pub struct ClosedSignal {
    port: String,
    token: CancellationToken,
}

impl ClosedSignal {
    /// Name of the observed port.
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the connection is lost.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    #[cfg(test)]
    pub(crate) fn for_tests(port: &str) -> Self {
        Self {
            port: port.to_string(),
            token: CancellationToken::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn fire(&self) {
        self.token.cancel();
    }
}

type Inbound = std::result::Result<Vec<Bytes>, FrameError>;

enum Link {
    Input(mpsc::Receiver<Inbound>),
    Output(mpsc::Sender<Vec<Bytes>>),
}

/// A component's exclusively owned binding to one transport endpoint.
///
/// Input ports bind their endpoint and accept upstream connections. Output
/// ports resolve their endpoint up front and connect in the background,
/// retrying until the downstream listener appears; messages sent before then
/// wait in the outbound queue.
///
/// Loss of the remote side (any upstream connection of an input, the
/// downstream connection of an output) fires the port's [`ClosedSignal`]. A
/// local [`Port::close`] does not.
pub struct Port {
    name: String,
    direction: Direction,
    endpoint: Endpoint,
    config: PortConfig,
    state: PortState,
    link: Option<Link>,
    /// Fired on remote connection loss.
    disconnected: CancellationToken,
    /// Child of `disconnected`; also fired by a local close. Stops the I/O tasks.
    stop: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Port {
    /// Open a port with default configuration.
    pub async fn open(
        name: impl Into<String>,
        endpoint: Endpoint,
        direction: Direction,
    ) -> Result<Self> {
        Self::open_with_config(name, endpoint, direction, PortConfig::default()).await
    }

    /// Open a port with explicit configuration.
    ///
    /// Fails with [`PortError::Connection`] if the endpoint cannot be bound
    /// (input) or resolved (output).
    pub async fn open_with_config(
        name: impl Into<String>,
        endpoint: Endpoint,
        direction: Direction,
        config: PortConfig,
    ) -> Result<Self> {
        let name = name.into();
        let disconnected = CancellationToken::new();
        let stop = disconnected.child_token();
        let connection_error = |source| PortError::Connection {
            port: name.clone(),
            source,
        };

        let (link, task) = match direction {
            Direction::Input => {
                let listener = Listener::bind(&endpoint, config.socket_mode)
                    .await
                    .map_err(connection_error)?;
                let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
                let task = tokio::spawn(accept_loop(
                    name.clone(),
                    listener,
                    tx,
                    disconnected.clone(),
                    stop.clone(),
                    config.max_message_size,
                ));
                (Link::Input(rx), task)
            }
            Direction::Output => {
                endpoint.resolve().await.map_err(connection_error)?;
                let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
                let task = tokio::spawn(write_loop(
                    name.clone(),
                    endpoint.clone(),
                    rx,
                    disconnected.clone(),
                    stop.clone(),
                    config.clone(),
                ));
                (Link::Output(tx), task)
            }
        };

        debug!(port = %name, %endpoint, %direction, "port opened");

        Ok(Self {
            name,
            direction,
            endpoint,
            config,
            state: PortState::Open,
            link: Some(link),
            disconnected,
            stop,
            tasks: vec![task],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }

    /// Handle that fires when this port's remote side is lost.
    pub fn closed_signal(&self) -> ClosedSignal {
        ClosedSignal {
            port: self.name.clone(),
            token: self.disconnected.clone(),
        }
    }

    /// Wait for the next multipart message.
    ///
    /// Returns [`PortError::Disconnected`] once when the connection drops, after
    /// which the port is closed and further calls return [`PortError::Closed`].
    /// [`PortError::Transport`] is transient: the next call may succeed.
    pub async fn receive(&mut self) -> Result<Vec<Bytes>> {
        self.ensure_open()?;
        let rx = match self.link.as_mut() {
            Some(Link::Input(rx)) => rx,
            _ => return Err(self.wrong_direction()),
        };

        let received = tokio::select! {
            biased;
            item = rx.recv() => item,
            _ = self.disconnected.cancelled() => None,
        };

        match received {
            Some(Ok(frames)) => Ok(frames),
            Some(Err(source)) => Err(PortError::Transport {
                port: self.name.clone(),
                source,
            }),
            None => {
                self.mark_closed();
                Err(PortError::Disconnected {
                    port: self.name.clone(),
                })
            }
        }
    }

    /// Queue an IP for the downstream connection.
    pub async fn send(&mut self, ip: Ip) -> Result<()> {
        self.send_frames(ip.into_frames()).await
    }

    /// Queue a raw multipart message for the downstream connection.
    ///
    /// Does not wait for a downstream peer to exist; waits only while the
    /// outbound queue is full.
    pub async fn send_frames(&mut self, frames: Vec<Bytes>) -> Result<()> {
        self.ensure_open()?;
        let tx = match self.link.as_ref() {
            Some(Link::Output(tx)) => tx,
            _ => return Err(self.wrong_direction()),
        };

        let size: usize = frames.iter().map(|f| FRAME_PREFIX_SIZE + f.len()).sum();
        if size > self.config.max_message_size {
            return Err(PortError::Transport {
                port: self.name.clone(),
                source: FrameError::MessageTooLarge {
                    size,
                    max: self.config.max_message_size,
                },
            });
        }

        if self.disconnected.is_cancelled() {
            self.mark_closed();
            return Err(PortError::Disconnected {
                port: self.name.clone(),
            });
        }

        let sent = tx.send(frames).await;
        if sent.is_err() {
            self.mark_closed();
            return Err(PortError::Disconnected {
                port: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Close the port and wait for its I/O tasks to finish. Idempotent.
    ///
    /// Messages already queued on an output port get a short grace period to
    /// reach the downstream peer.
    pub async fn close(&mut self) {
        if self.state == PortState::Open {
            debug!(port = %self.name, "closing port");
        }
        self.mark_closed();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    fn mark_closed(&mut self) {
        self.state = PortState::Closed;
        self.link = None;
        self.stop.cancel();
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            PortState::Open => Ok(()),
            PortState::Closed => Err(PortError::Closed {
                port: self.name.clone(),
            }),
        }
    }

    fn wrong_direction(&self) -> PortError {
        PortError::WrongDirection {
            port: self.name.clone(),
            direction: self.direction,
        }
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish()
    }
}

async fn accept_loop(
    port: String,
    listener: Listener,
    tx: mpsc::Sender<Inbound>,
    disconnected: CancellationToken,
    stop: CancellationToken,
    max_message: usize,
) {
    let mut readers = JoinSet::new();
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    debug!(port = %port, transport = stream.transport_name(), "upstream connected");
                    readers.spawn(read_connection(
                        port.clone(),
                        stream,
                        tx.clone(),
                        disconnected.clone(),
                        stop.clone(),
                        max_message,
                    ));
                }
                Err(err) => {
                    warn!(port = %port, error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    readers.shutdown().await;
}

async fn read_connection(
    port: String,
    stream: IpcStream,
    tx: mpsc::Sender<Inbound>,
    disconnected: CancellationToken,
    stop: CancellationToken,
    max_message: usize,
) {
    let mut framed = FramedRead::new(stream, MessageCodec::new(max_message));
    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => return,
            next = framed.next() => next,
        };
        let (item, fatal) = match next {
            Some(Ok(frames)) => (Ok(frames), false),
            // A framing error desynchronizes the stream; report it, then drop
            // the connection.
            Some(Err(err)) => (Err(err), true),
            None => break,
        };
        tokio::select! {
            _ = stop.cancelled() => return,
            sent = tx.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
        }
        if fatal {
            break;
        }
    }
    debug!(port = %port, "upstream disconnected");
    disconnected.cancel();
}

async fn connect_with_retry(port: &str, endpoint: &Endpoint, interval: Duration) -> IpcStream {
    loop {
        match IpcStream::connect(endpoint).await {
            Ok(stream) => return stream,
            Err(err) => {
                trace!(port = %port, error = %err, "downstream not reachable yet");
                tokio::time::sleep(interval).await;
            }
        }
    }
}

async fn write_loop(
    port: String,
    endpoint: Endpoint,
    mut rx: mpsc::Receiver<Vec<Bytes>>,
    disconnected: CancellationToken,
    stop: CancellationToken,
    config: PortConfig,
) {
    let stream = tokio::select! {
        stream = connect_with_retry(&port, &endpoint, config.reconnect_interval) => stream,
        _ = stop.cancelled() => {
            if rx.is_empty() {
                return;
            }
            // Closed before the downstream appeared, with messages queued.
            match tokio::time::timeout(
                LINGER,
                connect_with_retry(&port, &endpoint, config.reconnect_interval),
            )
            .await
            {
                Ok(stream) => stream,
                Err(_) => {
                    debug!(port = %port, queued = rx.len(), "discarding messages for unreachable downstream");
                    return;
                }
            }
        }
    };
    debug!(port = %port, %endpoint, "downstream connected");

    let (mut read_half, write_half) = tokio::io::split(stream);
    let mut sink = FramedWrite::new(write_half, MessageCodec::new(config.max_message_size));
    let mut scratch = [0u8; 64];

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                linger(&port, &mut rx, &mut sink).await;
                return;
            }
            read = read_half.read(&mut scratch) => match read {
                // Downstream ports never write; EOF or error means the peer is gone.
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            },
            next = rx.recv() => {
                let Some(frames) = next else { return };
                // A peer that stops reading stalls the write; a local close
                // must still get through.
                let sent = tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        linger(&port, &mut rx, &mut sink).await;
                        return;
                    }
                    sent = sink.send(frames) => sent,
                };
                match sent {
                    Ok(()) => {}
                    Err(FrameError::Io(err)) => {
                        warn!(port = %port, error = %err, "send failed");
                        break;
                    }
                    Err(err) => warn!(port = %port, error = %err, "dropping unsendable message"),
                }
            }
        }
    }

    debug!(port = %port, "downstream disconnected");
    disconnected.cancel();
}

/// Flush what is still queued, bounded by the linger period.
async fn linger<S>(port: &str, rx: &mut mpsc::Receiver<Vec<Bytes>>, sink: &mut S)
where
    S: futures_util::Sink<Vec<Bytes>, Error = FrameError> + Unpin,
{
    rx.close();
    let drain = async {
        while let Some(frames) = rx.recv().await {
            if sink.send(frames).await.is_err() {
                break;
            }
        }
    };
    if tokio::time::timeout(LINGER, drain).await.is_err() {
        debug!(port = %port, "linger period elapsed with messages pending");
    }
}
