//! The component loop.
//!
//! A component owns one primary input, zero or more outputs and at most one
//! configuration port. Input and outputs are watched: losing the remote side
//! of any of them ends the process. The configuration port is not watched; it
//! is read until a usable configuration arrives and then closed.

use std::time::Duration;

use cascades_frame::Ip;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{PortError, Result};
use crate::port::{ClosedSignal, Port};
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::transform::{Configure, Emitter, Transform};

/// Upper bound on closing all ports once a component stops.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// The ports a component runs with.
#[derive(Debug)]
pub struct Ports {
    pub config: Option<Port>,
    pub input: Port,
    pub outputs: Vec<Port>,
}

impl Ports {
    pub fn new(input: Port) -> Self {
        Self {
            config: None,
            input,
            outputs: Vec::new(),
        }
    }

    /// Set the configuration port, replacing any previous one.
    pub fn with_config(mut self, port: Port) -> Self {
        self.config = Some(port);
        self
    }

    pub fn with_output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }

    /// Closed signals of every watched port: the input and all outputs.
    pub fn watched(&self) -> Vec<ClosedSignal> {
        std::iter::once(&self.input)
            .chain(self.outputs.iter())
            .map(Port::closed_signal)
            .collect()
    }

    pub async fn close_all(&mut self) {
        if let Some(port) = self.config.as_mut() {
            port.close().await;
        }
        self.input.close().await;
        for port in &mut self.outputs {
            port.close().await;
        }
    }
}

/// A running unit of the graph: ports, a transform and a shutdown signal.
pub struct Component {
    name: String,
    ports: Ports,
    shutdown: Shutdown,
}

impl Component {
    pub fn new(name: impl Into<String>, ports: Ports) -> Self {
        Self {
            name: name.into(),
            ports,
            shutdown: Shutdown::new(),
        }
    }

    /// Use an existing shutdown signal, e.g. one already fed by OS signals.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for triggering or awaiting this component's termination.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run `transform` over every valid IP on the input until termination.
    pub async fn run<T: Transform>(self, mut transform: T) -> ShutdownReason {
        let Component {
            name,
            mut ports,
            shutdown,
        } = self;
        let watchers = watch(&ports, &shutdown);
        info!(component = %name, input = ports.input.name(), "component started");

        let reason = steady_state(&mut ports, &shutdown, &mut transform).await;
        finish(&name, ports, watchers, reason).await
    }

    /// Configure from the configuration port, then run.
    ///
    /// Invalid IPs and payloads that fail to compile are skipped; the
    /// component keeps waiting. Once configured, the configuration port is
    /// closed without triggering termination.
    pub async fn run_configured<C>(self) -> Result<ShutdownReason>
    where
        C: Configure + Transform,
    {
        let Component {
            name,
            mut ports,
            shutdown,
        } = self;
        let Some(mut config) = ports.config.take() else {
            return Err(PortError::MissingPort {
                role: "configuration",
            });
        };
        let watchers = watch(&ports, &shutdown);
        info!(component = %name, config = config.name(), "waiting for configuration");

        let configured = tokio::select! {
            reason = shutdown.triggered() => Err(reason),
            result = configure::<C>(&mut config) => Ok(result),
        };
        config.close().await;

        let reason = match configured {
            Ok(Ok(mut transform)) => {
                info!(component = %name, "component configured");
                steady_state(&mut ports, &shutdown, &mut transform).await
            }
            Ok(Err(err)) => {
                let port = err.port().unwrap_or("configuration").to_string();
                terminate(&shutdown, port)
            }
            Err(reason) => reason,
        };
        Ok(finish(&name, ports, watchers, reason).await)
    }
}

/// Read configuration IPs from `port` until one compiles, then close the port.
///
/// Only returns an error when the port can no longer deliver anything.
pub async fn configure<C: Configure>(port: &mut Port) -> Result<C> {
    loop {
        let frames = match port.receive().await {
            Ok(frames) => frames,
            Err(err) if err.is_closed() => return Err(err),
            Err(err) => {
                warn!(port = port.name(), error = %err, "error receiving configuration");
                continue;
            }
        };

        let payload = match Ip::decode(&frames) {
            Some(Ip::Packet(payload)) => payload,
            Some(ip) => {
                debug!(port = port.name(), kind = ip.kind(), "ignoring configuration bracket");
                continue;
            }
            None => {
                debug!(port = port.name(), "ignoring invalid configuration IP");
                continue;
            }
        };

        match C::compile(&payload) {
            Ok(configured) => {
                port.close().await;
                return Ok(configured);
            }
            Err(err) => warn!(port = port.name(), error = %err, "failed to configure component"),
        }
    }
}

fn watch(ports: &Ports, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
    ports
        .watched()
        .into_iter()
        .map(|signal| shutdown.watch(signal))
        .collect()
}

fn terminate(shutdown: &Shutdown, port: String) -> ShutdownReason {
    let reason = ShutdownReason::PortClosed { port };
    shutdown.trigger(reason.clone());
    shutdown.reason().unwrap_or(reason)
}

async fn steady_state<T: Transform>(
    ports: &mut Ports,
    shutdown: &Shutdown,
    transform: &mut T,
) -> ShutdownReason {
    tokio::select! {
        reason = shutdown.triggered() => reason,
        port = process(&mut ports.input, &mut ports.outputs, transform) => terminate(shutdown, port),
    }
}

/// The receive/validate/transform/send loop. Returns the name of the port
/// whose loss ended it.
async fn process<T: Transform>(input: &mut Port, outputs: &mut [Port], transform: &mut T) -> String {
    let mut emitter = Emitter::new();
    loop {
        let frames = match input.receive().await {
            Ok(frames) => frames,
            Err(err) if err.is_closed() => return input.name().to_string(),
            Err(err) => {
                warn!(port = input.name(), error = %err, "error receiving message");
                continue;
            }
        };

        let Some(ip) = Ip::decode(&frames) else {
            trace!(port = input.name(), frames = frames.len(), "dropping invalid IP");
            continue;
        };

        if let Err(err) = transform.apply(ip, &mut emitter) {
            warn!(port = input.name(), error = %err, "transform failed, dropping IP");
            emitter.clear();
            continue;
        }

        for (index, ip) in emitter.drain() {
            let Some(port) = outputs.get_mut(index) else {
                warn!(output = index, kind = ip.kind(), "no output port, dropping IP");
                continue;
            };
            match port.send(ip).await {
                Ok(()) => {}
                Err(err) if err.is_closed() => return port.name().to_string(),
                Err(err) => warn!(port = port.name(), error = %err, "error sending message"),
            }
        }
    }
}

async fn finish(
    name: &str,
    mut ports: Ports,
    watchers: Vec<JoinHandle<()>>,
    reason: ShutdownReason,
) -> ShutdownReason {
    for watcher in &watchers {
        watcher.abort();
    }
    if tokio::time::timeout(CLOSE_TIMEOUT, ports.close_all()).await.is_err() {
        warn!(component = %name, "ports did not close in time, abandoning them");
    }
    info!(component = %name, %reason, "component stopped");
    reason
}
