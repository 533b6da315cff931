use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// TCP transport.
///
/// Binds and accepts on a resolved host/port, or connects to one. Streams
/// have `TCP_NODELAY` set since every message is flushed as soon as it is
/// framed.
pub struct TcpTransport {
    listener: TcpListener,
    endpoint: String,
}

impl TcpTransport {
    /// Bind and listen on `host:port`. A host of `*` binds all interfaces.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = Endpoint::resolve_tcp(host, port).await?;
        let endpoint = format!("tcp://{host}:{port}");
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;
        info!(%endpoint, "listening on tcp");
        Ok(Self { listener, endpoint })
    }

    /// Accept an incoming connection.
    pub async fn accept(&self) -> Result<IpcStream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        let _ = stream.set_nodelay(true);
        debug!(endpoint = %self.endpoint, %peer, "accepted tcp connection");
        Ok(IpcStream::from_tcp(stream))
    }

    /// Connect to a listening TCP endpoint.
    pub async fn connect(host: &str, port: u16) -> Result<IpcStream> {
        let addr = Endpoint::resolve_tcp(host, port).await?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: format!("tcp://{host}:{port}"),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        debug!(%addr, "connected over tcp");
        Ok(IpcStream::from_tcp(stream))
    }

    /// The port actually bound (useful when binding port 0).
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn bind_accept_connect_on_ephemeral_port() {
        let listener = TcpTransport::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_port().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpTransport::connect("127.0.0.1", port).await.unwrap();
            stream.write_all(b"hello").await.unwrap();
        });

        let mut server = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        client.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpTransport::bind("127.0.0.1", 0).await.unwrap();
            listener.local_port().unwrap()
        };
        let result = TcpTransport::connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
