//! Socket listeners for metric writes.
//!
//! [`bind`] opens the socket named by a [`ListenAddr`]; [`serve`] runs its
//! accept or receive loop until the shutdown token fires. Stream sockets
//! get one task per connection, packet sockets are drained by a single
//! task.

use std::io;
use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use socket2::{Domain, SockAddr, Socket, Type};
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, UdpSocket, UnixDatagram, UnixListener};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{Endpoint, ListenAddr, Scheme};
use crate::error::{ServerError, ServerResult};
use crate::ingest::LineHandler;

/// Largest datagram read from a packet socket.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

const SEQPACKET_BACKLOG: i32 = 1024;

/// A unix socket path, removed from the filesystem on drop.
#[derive(Debug)]
pub struct SocketFile(PathBuf);

impl SocketFile {
    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            debug!(path = %self.0.display(), error = %e, "failed to remove socket file");
        }
    }
}

/// An open socket ready to be served.
#[derive(Debug)]
pub enum BoundListener {
    /// TCP listener.
    Tcp(TcpListener),
    /// Unix stream or seqpacket listener.
    Unix(UnixListener, SocketFile),
    /// UDP socket.
    Udp(UdpSocket),
    /// Unix datagram socket.
    UnixGram(UnixDatagram, SocketFile),
}

impl BoundListener {
    /// Returns the bound network address, for inet sockets.
    #[must_use]
    pub fn inet_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            Self::Udp(socket) => socket.local_addr().ok(),
            Self::Unix(..) | Self::UnixGram(..) => None,
        }
    }

    /// Returns the socket path, for unix sockets.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            Self::Unix(_, file) | Self::UnixGram(_, file) => Some(file.path()),
            Self::Tcp(_) | Self::Udp(_) => None,
        }
    }

    /// Returns a printable local address.
    #[must_use]
    pub fn local_addr(&self) -> String {
        match (self.inet_addr(), self.unix_path()) {
            (Some(addr), _) => addr.to_string(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => "unknown".to_string(),
        }
    }
}

/// Opens the socket for a listener address.
///
/// Host names are resolved and filtered by the scheme's address family
/// (`tcp4`, `udp6`, ...). Unix socket files are created here and removed
/// when the returned listener is dropped.
///
/// # Errors
///
/// Returns [`ServerError::BindFailed`] if resolution or binding fails.
pub async fn bind(addr: &ListenAddr) -> ServerResult<BoundListener> {
    let bind_failed = |e: io::Error| ServerError::BindFailed(addr.to_string(), e);

    let bound = match (addr.scheme(), addr.endpoint()) {
        (Scheme::Unix, Endpoint::Unix(path)) => {
            let listener = UnixListener::bind(path).map_err(bind_failed)?;
            BoundListener::Unix(listener, SocketFile(path.clone()))
        }
        (Scheme::UnixPacket, Endpoint::Unix(path)) => {
            let listener = bind_seqpacket(path).map_err(bind_failed)?;
            BoundListener::Unix(listener, SocketFile(path.clone()))
        }
        (Scheme::UnixGram, Endpoint::Unix(path)) => {
            let socket = UnixDatagram::bind(path).map_err(bind_failed)?;
            BoundListener::UnixGram(socket, SocketFile(path.clone()))
        }
        (scheme, Endpoint::Inet(host_port)) if !scheme.is_unix() => {
            let addrs = resolve(scheme, host_port).await.map_err(bind_failed)?;
            if scheme.is_packet() {
                BoundListener::Udp(UdpSocket::bind(&addrs[..]).await.map_err(bind_failed)?)
            } else {
                BoundListener::Tcp(TcpListener::bind(&addrs[..]).await.map_err(bind_failed)?)
            }
        }
        _ => {
            return Err(ServerError::InvalidAddress {
                uri: addr.to_string(),
                reason: "endpoint does not match scheme".to_string(),
            });
        }
    };

    debug!(listener = %addr, local_addr = %bound.local_addr(), "socket bound");
    Ok(bound)
}

async fn resolve(scheme: Scheme, host_port: &str) -> io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(host_port)
        .await?
        .filter(|addr| scheme.accepts(addr))
        .collect();
    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{host_port} has no {scheme} address"),
        ));
    }
    Ok(addrs)
}

// tokio has no seqpacket listener. Accepted seqpacket connections read like
// streams, one packet per read.
fn bind_seqpacket(path: &Path) -> io::Result<UnixListener> {
    let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
    socket.bind(&SockAddr::unix(path)?)?;
    socket.listen(SEQPACKET_BACKLOG)?;
    socket.set_nonblocking(true)?;
    let listener = std::os::unix::net::UnixListener::from(OwnedFd::from(socket));
    UnixListener::from_std(listener)
}

/// Runs the accept or receive loop of a bound listener until `shutdown`
/// is cancelled.
///
/// # Errors
///
/// Returns [`ServerError::InvalidConfig`] if the listener is not a write
/// transport. Per-connection and per-datagram failures are logged, never
/// returned.
pub async fn serve(
    addr: ListenAddr,
    listener: BoundListener,
    handler: LineHandler,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    info!(
        listener = %addr,
        local_addr = %listener.local_addr(),
        strict = handler.is_strict(),
        "listening for writes"
    );

    match listener {
        BoundListener::Tcp(listener) => loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        spawn_connection(stream, peer.to_string(), &handler, &shutdown);
                    }
                    Err(e) => warn!(listener = %addr, error = %e, "failed to accept connection"),
                },
            }
        },
        BoundListener::Unix(listener, _socket_file) => loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        spawn_connection(stream, format!("{peer:?}"), &handler, &shutdown);
                    }
                    Err(e) => warn!(listener = %addr, error = %e, "failed to accept connection"),
                },
            }
        },
        BoundListener::Udp(socket) => {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, peer)) => receive_datagram(&buf[..len], &peer.to_string(), &handler),
                        Err(e) => warn!(listener = %addr, error = %e, "failed to receive datagram"),
                    },
                }
            }
        }
        BoundListener::UnixGram(socket, _socket_file) => {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, peer)) => receive_datagram(&buf[..len], &format!("{peer:?}"), &handler),
                        Err(e) => warn!(listener = %addr, error = %e, "failed to receive datagram"),
                    },
                }
            }
        }
    }

    info!(listener = %addr, "write listener closed");
    Ok(())
}

fn spawn_connection<S>(
    stream: S,
    remote_addr: String,
    handler: &LineHandler,
    shutdown: &CancellationToken,
) where
    S: AsyncRead + Unpin + Send + 'static,
{
    let handler = handler.clone();
    let shutdown = shutdown.clone();
    let span = info_span!("connection", remote_addr = %remote_addr);

    tokio::spawn(
        async move {
            debug!("connection opened");
            tokio::select! {
                outcome = handler.handle_stream(stream) => {
                    if let Some(error) = outcome.error {
                        warn!(error = %error, "closing connection after bad line in strict mode");
                    }
                }
                () = shutdown.cancelled() => debug!("connection dropped at shutdown"),
            }
        }
        .instrument(span),
    );
}

fn receive_datagram(datagram: &[u8], remote_addr: &str, handler: &LineHandler) {
    let _span = info_span!("datagram", remote_addr = %remote_addr).entered();
    let outcome = handler.handle_datagram(datagram);
    debug!(accepted = outcome.accepted, rejected = outcome.rejected, "datagram handled");
}
