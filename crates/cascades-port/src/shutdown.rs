//! Process-wide termination signal.
//!
//! Every watched port, the component loop itself and OS signal handlers feed
//! one fan-in point. The first trigger wins and records its reason; later
//! triggers are ignored.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::port::ClosedSignal;

/// Why a component stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A watched port lost its remote side.
    PortClosed { port: String },
    /// The process received a termination signal.
    Interrupted { signal: &'static str },
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::PortClosed { port } => write!(f, "port {port} closed"),
            ShutdownReason::Interrupted { signal } => write!(f, "interrupted by {signal}"),
        }
    }
}

/// Cloneable handle on the process-wide termination signal.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. Returns `true` if this call was the first.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        match self.reason.set(reason) {
            Ok(()) => {
                if let Some(reason) = self.reason.get() {
                    info!(%reason, "shutting down");
                }
                self.token.cancel();
                true
            }
            Err(ignored) => {
                debug!(reason = %ignored, "shutdown already triggered");
                false
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The winning reason, once triggered.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().cloned()
    }

    /// Wait for termination and return the winning reason.
    pub async fn triggered(&self) -> ShutdownReason {
        loop {
            self.token.cancelled().await;
            if let Some(reason) = self.reason.get() {
                return reason.clone();
            }
            tokio::task::yield_now().await;
        }
    }

    /// Spawn a watcher that triggers termination when `signal` fires.
    ///
    /// The watcher exits on its own once termination was triggered by
    /// anything else.
    pub fn watch(&self, signal: ClosedSignal) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.closed() => {
                    debug!(port = signal.port(), "port closed, interrupting execution");
                    shutdown.trigger(ShutdownReason::PortClosed {
                        port: signal.port().to_string(),
                    });
                }
                _ = shutdown.token.cancelled() => {}
            }
        })
    }

    /// Spawn a watcher that triggers termination on SIGINT or SIGTERM.
    ///
    /// The handlers are installed before this returns.
    pub fn watch_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        let installed = Signals::install();
        tokio::spawn(async move {
            let mut signals = match installed {
                Ok(signals) => signals,
                Err(err) => {
                    warn!(error = %err, "failed to install signal handlers");
                    return;
                }
            };
            tokio::select! {
                signal = signals.recv() => {
                    shutdown.trigger(ShutdownReason::Interrupted { signal });
                }
                _ = shutdown.token.cancelled() => {}
            }
        })
    }
}

#[cfg(unix)]
struct Signals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(err) => {
                warn!(error = %err, "ctrl-c handler failed");
                std::future::pending().await
            }
        }
    }
}
