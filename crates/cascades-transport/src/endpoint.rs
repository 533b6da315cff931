use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

#[cfg(unix)]
use std::path::PathBuf;

use crate::error::{Result, TransportError};

/// Host placeholder meaning "all interfaces" when binding.
const ANY_HOST: &str = "*";

/// A transport address a port binds to or connects through.
///
/// Textual forms:
/// - `tcp://127.0.0.1:5000`, `tcp://localhost:5000`, `tcp://*:5000`
/// - `ipc:///tmp/graph/console.in.sock` (unix only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port. The host may be a name, an IP literal or `*`.
    Tcp { host: String, port: u16 },
    /// Filesystem path of a Unix domain socket.
    #[cfg(unix)]
    Ipc(PathBuf),
}

impl Endpoint {
    /// URL scheme of this endpoint.
    pub fn scheme(&self) -> &'static str {
        match self {
            Endpoint::Tcp { .. } => "tcp",
            #[cfg(unix)]
            Endpoint::Ipc(_) => "ipc",
        }
    }

    /// Resolve a TCP endpoint to the first matching socket address.
    ///
    /// `*` resolves to the IPv4 unspecified address.
    pub async fn resolve_tcp(host: &str, port: u16) -> Result<SocketAddr> {
        let endpoint = || format!("tcp://{host}:{port}");
        let lookup_host = if host == ANY_HOST { "0.0.0.0" } else { host };
        let mut addrs = tokio::net::lookup_host((lookup_host, port))
            .await
            .map_err(|source| TransportError::Resolve {
                endpoint: endpoint(),
                source,
            })?;
        addrs.next().ok_or_else(|| TransportError::Resolve {
            endpoint: endpoint(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host resolved to no addresses",
            ),
        })
    }

    /// Check that the endpoint can be resolved, without connecting.
    pub async fn resolve(&self) -> Result<()> {
        match self {
            Endpoint::Tcp { host, port } => Self::resolve_tcp(host, *port).await.map(|_| ()),
            #[cfg(unix)]
            Endpoint::Ipc(_) => Ok(()),
        }
    }
}

fn invalid(endpoint: &str, reason: impl Into<String>) -> TransportError {
    TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.into(),
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| invalid(s, "expected <scheme>://<address>"))?;

        match scheme {
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| invalid(s, "expected tcp://<host>:<port>"))?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                if host.is_empty() {
                    return Err(invalid(s, "host must not be empty"));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid(s, format!("invalid port '{port}'")))?;
                Ok(Endpoint::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            #[cfg(unix)]
            "ipc" => {
                if rest.is_empty() {
                    return Err(invalid(s, "socket path must not be empty"));
                }
                Ok(Endpoint::Ipc(PathBuf::from(rest)))
            }
            #[cfg(not(unix))]
            "ipc" => Err(invalid(s, "ipc endpoints require Unix domain sockets")),
            other => Err(invalid(s, format!("unsupported scheme '{other}'"))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{host}]:{port}")
            }
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            #[cfg(unix)]
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}
