//! Deferred-bind listener.
//!
//! # Responsibilities
//! - Report the requested address before any socket exists
//! - Bind on the first `accept` only and reuse the socket afterwards
//! - Bind TCP addresses with the family of their IP literal, Unix sockets natively
//! - Plug into `axum::serve` as a [`axum::serve::Listener`]
//! - Report bind failures and closure to the server through [`ListenerFailure`]
//!
//! # Design Decisions
//! - The gateway must know its listen address before the services it
//!   launches have bound theirs; binding lazily avoids racing them for ports.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{watch, Mutex};

use crate::net::addr::{Family, ListenAddress};

const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(io::Error),
    /// Failed to accept connection.
    Accept(io::Error),
    /// The listener was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Listener closed"),
        }
    }
}

impl std::error::Error for ListenerError {}

impl ListenerError {
    /// Whether accepting again could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ListenerError::Accept(_))
    }

    fn kind(&self) -> io::ErrorKind {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => e.kind(),
            ListenerError::Closed => io::ErrorKind::NotConnected,
        }
    }
}

type Fault = Option<(io::ErrorKind, String)>;

/// Resolves once the listener it came from has failed for good.
#[derive(Clone)]
pub struct ListenerFailure {
    rx: watch::Receiver<Fault>,
}

impl ListenerFailure {
    /// Wait for a terminal failure. Never resolves if the listener is
    /// dropped without failing.
    pub async fn wait(mut self) -> io::Error {
        let fault = match self.rx.wait_for(Option::is_some).await {
            Ok(fault) => fault.clone(),
            Err(_) => None,
        };
        match fault {
            Some((kind, message)) => io::Error::new(kind, message),
            None => std::future::pending().await,
        }
    }
}

/// Socket bound by the first accept.
enum Bound {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

enum State {
    Pending,
    Bound(Arc<Bound>),
    Closed,
}

/// A listener that only binds its socket once `accept` is first called.
pub struct DeferredListener {
    addr: ListenAddress,
    state: Mutex<State>,
    closed: watch::Sender<bool>,
    fault: watch::Sender<Fault>,
}

impl DeferredListener {
    pub fn new(addr: ListenAddress) -> Self {
        Self {
            addr,
            state: Mutex::new(State::Pending),
            closed: watch::Sender::new(false),
            fault: watch::Sender::new(None),
        }
    }

    /// The requested address, available before and after binding.
    pub fn addr(&self) -> &ListenAddress {
        &self.addr
    }

    /// Whether the underlying socket has been bound yet.
    pub async fn is_bound(&self) -> bool {
        matches!(*self.state.lock().await, State::Bound(_))
    }

    /// The address the socket actually bound to (differs from [`addr`]
    /// when port 0 was requested). `None` until the first accept.
    ///
    /// [`addr`]: DeferredListener::addr
    pub async fn bound_addr(&self) -> Option<ListenAddress> {
        match &*self.state.lock().await {
            State::Bound(bound) => match bound.as_ref() {
                Bound::Tcp(l) => l.local_addr().ok().map(ListenAddress::Tcp),
                #[cfg(unix)]
                Bound::Unix(_) => Some(self.addr.clone()),
            },
            _ => None,
        }
    }

    /// A handle that resolves when this listener can no longer accept.
    pub fn failure(&self) -> ListenerFailure {
        ListenerFailure {
            rx: self.fault.subscribe(),
        }
    }

    /// Accept the next connection, binding the socket first if needed.
    ///
    /// A pending accept returns [`ListenerError::Closed`] once [`close`]
    /// is called.
    ///
    /// [`close`]: DeferredListener::close
    pub async fn accept(&self) -> Result<(Connection, PeerAddr), ListenerError> {
        let (bound, mut closed) = {
            let mut state = self.state.lock().await;
            let bound = match &*state {
                State::Bound(bound) => Arc::clone(bound),
                State::Closed => return Err(ListenerError::Closed),
                State::Pending => {
                    let bound = Arc::new(bind(&self.addr).map_err(ListenerError::Bind)?);
                    tracing::info!(
                        address = %self.addr,
                        family = %self.addr.family(),
                        "Listener bound"
                    );
                    *state = State::Bound(Arc::clone(&bound));
                    bound
                }
            };
            (bound, self.closed.subscribe())
        };

        tokio::select! {
            accepted = accept_on(&bound) => accepted,
            _ = closed.wait_for(|closed| *closed) => Err(ListenerError::Closed),
        }
    }

    /// Close the listener. Pending and later accepts fail with
    /// [`ListenerError::Closed`].
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, State::Closed);
        self.closed.send_replace(true);

        // Unix sockets leave their path behind unless removed.
        #[cfg(unix)]
        {
            if let (State::Bound(bound), ListenAddress::Unix(path)) = (&previous, &self.addr) {
                if matches!(bound.as_ref(), Bound::Unix(_)) {
                    if let Err(e) = std::fs::remove_file(path) {
                        tracing::debug!(path = %path.display(), error = %e, "Socket file not removed");
                    }
                }
            }
        }
        drop(previous);
    }

    fn report(&self, error: &ListenerError) {
        self.fault
            .send_replace(Some((error.kind(), format!("listener {}: {}", self.addr, error))));
    }
}

async fn accept_on(bound: &Bound) -> Result<(Connection, PeerAddr), ListenerError> {
    match bound {
        Bound::Tcp(listener) => {
            let (stream, peer) = listener.accept().await.map_err(ListenerError::Accept)?;
            tracing::debug!(peer_addr = %peer, "Connection accepted");
            Ok((Connection::Tcp(stream), PeerAddr::Tcp(peer)))
        }
        #[cfg(unix)]
        Bound::Unix(listener) => {
            let (stream, _) = listener.accept().await.map_err(ListenerError::Accept)?;
            Ok((Connection::Unix(stream), PeerAddr::Unix))
        }
    }
}

fn bind(addr: &ListenAddress) -> io::Result<Bound> {
    match addr {
        ListenAddress::Tcp(sock) => {
            let socket = match addr.family() {
                Family::Tcp4 => TcpSocket::new_v4()?,
                _ => TcpSocket::new_v6()?,
            };
            #[cfg(unix)]
            {
                socket.set_reuseaddr(true)?;
            }
            socket.bind(*sock)?;
            Ok(Bound::Tcp(socket.listen(1024)?))
        }
        #[cfg(unix)]
        ListenAddress::Unix(path) => Ok(Bound::Unix(tokio::net::UnixListener::bind(path)?)),
        #[cfg(not(unix))]
        ListenAddress::Unix(_) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )),
    }
}

/// Remote address of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    Unix,
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "{}", addr),
            PeerAddr::Unix => f.write_str("unix"),
        }
    }
}

/// An accepted stream of either family.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A listener whose terminal failure can be observed while it serves.
pub trait ObservedListener: axum::serve::Listener {
    fn failure(&self) -> ListenerFailure;
}

impl ObservedListener for DeferredListener {
    fn failure(&self) -> ListenerFailure {
        DeferredListener::failure(self)
    }
}

impl axum::serve::Listener for DeferredListener {
    type Io = Connection;
    type Addr = PeerAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match DeferredListener::accept(self).await {
                Ok(accepted) => return accepted,
                Err(e) if e.is_transient() => {
                    tracing::warn!(address = %self.addr, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(e) => {
                    tracing::error!(address = %self.addr, error = %e, "Listener stopped");
                    self.report(&e);
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        match &self.addr {
            ListenAddress::Tcp(sock) => Ok(PeerAddr::Tcp(*sock)),
            ListenAddress::Unix(_) => Ok(PeerAddr::Unix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn closed_listener_rejects_accept() {
        let listener = DeferredListener::new(ListenAddress::parse("127.0.0.1:0", 0).unwrap());
        listener.close().await;
        assert!(matches!(listener.accept().await, Err(ListenerError::Closed)));
        assert!(!listener.is_bound().await);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let mut listener = DeferredListener::new(ListenAddress::Tcp(addr));
        let failure = listener.failure();

        let accepting = tokio::spawn(async move {
            axum::serve::Listener::accept(&mut listener).await;
        });
        let err = tokio::time::timeout(Duration::from_secs(5), failure.wait())
            .await
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        assert!(err.to_string().contains(&addr.to_string()));
        assert!(!accepting.is_finished());
        accepting.abort();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_socket_binds_on_first_accept() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lit.sock");
        let listener = Arc::new(DeferredListener::new(ListenAddress::Unix(path.clone())));
        assert_eq!(listener.addr().family(), Family::Unix);
        assert!(!path.exists());

        let accepting = Arc::clone(&listener);
        let server = tokio::spawn(async move {
            let (mut conn, peer) = accepting.accept().await.unwrap();
            assert_eq!(peer, PeerAddr::Unix);
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).await.unwrap();
            buf
        });

        while !listener.is_bound().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut client = tokio::net::UnixStream::connect(&path).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"ping");

        listener.close().await;
        assert!(!path.exists());
    }
}
