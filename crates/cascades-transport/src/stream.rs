use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::tcp::TcpTransport;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A connected stream implementing `AsyncRead + AsyncWrite`.
///
/// This is the fundamental I/O type returned by transport operations,
/// regardless of which endpoint scheme produced it.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    Tcp(tokio::net::TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl IpcStream {
    pub(crate) fn from_tcp(stream: tokio::net::TcpStream) -> Self {
        Self {
            inner: IpcStreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Connect to a listening endpoint.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => TcpTransport::connect(host, *port).await,
            #[cfg(unix)]
            Endpoint::Ipc(path) => UnixDomainSocket::connect(path).await,
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            IpcStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => "unix-domain-socket",
        }
    }
}

impl AsyncRead for IpcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            IpcStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IpcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            IpcStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            IpcStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            IpcStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

/// A bound listener for any endpoint scheme.
pub enum Listener {
    Tcp(TcpTransport),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl Listener {
    /// Bind an endpoint. `socket_mode` applies to `ipc://` endpoints only.
    pub async fn bind(endpoint: &Endpoint, socket_mode: u32) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => Ok(Listener::Tcp(TcpTransport::bind(host, *port).await?)),
            #[cfg(unix)]
            Endpoint::Ipc(path) => Ok(Listener::Unix(UnixDomainSocket::bind_with_mode(
                path,
                socket_mode,
            )?)),
        }
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<IpcStream> {
        match self {
            Listener::Tcp(listener) => listener.accept().await,
            #[cfg(unix)]
            Listener::Unix(listener) => listener.accept().await,
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listener::Tcp(_) => f.debug_struct("Listener").field("type", &"tcp").finish(),
            #[cfg(unix)]
            Listener::Unix(socket) => f
                .debug_struct("Listener")
                .field("type", &"unix")
                .field("path", &socket.path())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn listener_and_stream_over_tcp_endpoint() {
        let listener = TcpTransport::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_port().unwrap();
        let listener = Listener::Tcp(listener);
        let endpoint: Endpoint = format!("tcp://127.0.0.1:{port}").parse().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = IpcStream::connect(&endpoint).await.unwrap();
            assert_eq!(stream.transport_name(), "tcp");
            stream.write_all(b"ping").await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let mut server = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"ping");
        client.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listener_and_stream_over_ipc_endpoint() {
        let dir = std::env::temp_dir().join(format!("cascades-stream-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let endpoint = Endpoint::Ipc(dir.join("stream.sock"));

        let listener = Listener::bind(&endpoint, UnixDomainSocket::DEFAULT_SOCKET_MODE)
            .await
            .unwrap();

        let connect_to = endpoint.clone();
        let client = tokio::spawn(async move {
            let mut stream = IpcStream::connect(&connect_to).await.unwrap();
            assert_eq!(stream.transport_name(), "unix-domain-socket");
            stream.write_all(b"pong").await.unwrap();
        });

        let mut server = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
        client.await.unwrap();

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
