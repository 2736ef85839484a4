use log::debug;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Session state a TLS transport exports after a handshake, so that a later
/// connection can resume it. The content is opaque to the TURN client. The
/// session is released when the last clone is dropped.
#[derive(Clone)]
pub struct TlsSession(Arc<dyn Any + Send + Sync>);

impl TlsSession {
    /// Wraps the native session of a TLS implementation.
    pub fn new<S>(session: S) -> Self
    where
        S: Any + Send + Sync,
    {
        Self(Arc::new(session))
    }

    /// Returns the native session if it is of type `S`.
    pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
        self.0.downcast_ref::<S>()
    }
}

impl fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TlsSession")
    }
}

/// Datagram channel between the client and the TURN server. Every call to
/// [`Transport::recv`] returns exactly one STUN or ChannelData message, so
/// stream transports must do their own framing.
pub trait Transport: Send + Sync + 'static {
    /// Sends one message to the server.
    fn send(&self, buffer: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits for the next message from the server and returns its size.
    fn recv(&self, buffer: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Reliable transports deliver every message, requests are not
    /// retransmitted over them.
    fn is_reliable(&self) -> bool {
        false
    }

    /// Session to resume on the next connection, for TLS transports.
    fn session(&self) -> Option<TlsSession> {
        None
    }
}

/// [`Transport`] over a UDP socket connected to the server.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds a socket to `local` and connects it to `server`.
    pub async fn connect(local: SocketAddr, server: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;
        debug!(
            "UDP transport {} connected to {}",
            socket.local_addr()?,
            server
        );
        Ok(Self { socket })
    }

    /// Local address of the socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl From<UdpSocket> for UdpTransport {
    /// The socket must be connected already.
    fn from(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

impl Transport for UdpTransport {
    async fn send(&self, buffer: &[u8]) -> io::Result<()> {
        let size = self.socket.send(buffer).await?;
        if size != buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("{} of {} bytes sent", size, buffer.len()),
            ));
        }
        Ok(())
    }

    async fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buffer).await
    }
}
