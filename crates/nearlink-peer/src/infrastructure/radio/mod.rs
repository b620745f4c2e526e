//! The transport port: the blocking primitives the link layer is built on.
//!
//! A [`Radio`] hands out endpoints for the two ways a link can come into
//! existence: a [`ListenerEndpoint`] that blocks in `accept` until a remote
//! peer arrives, and a [`ConnectorEndpoint`] that blocks in `connect` until
//! the named peer answers.  Either way the result is a [`LinkStream`], a raw
//! bidirectional byte stream with no framing of its own.
//!
//! All calls are genuinely blocking at the thread level.  Cancellation is
//! cooperative-by-closing: `close()` on an endpoint (or `shutdown()` on a
//! stream) is the only supported way to unblock a pending `accept`,
//! `connect`, or `read`.  An unblocked call reports [`TransportError::Closed`]
//! (or a zero-length read) so the caller can tell deliberate interruption
//! from a genuine transport failure.
//!
//! Two implementations ship with the crate: [`tcp::TcpRadio`], a loopback/LAN
//! stand-in for the short-range radio used by the binary and the end-to-end
//! tests, and [`mock::MockRadio`], a scriptable test double.

use std::sync::Arc;

use thiserror::Error;

use nearlink_core::{PeerAddr, ServiceId};

pub mod mock;
pub mod tcp;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not provide the requested endpoint.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    /// The endpoint or stream was deliberately closed while an operation was
    /// blocked on it.
    #[error("endpoint closed")]
    Closed,
    /// An I/O error occurred on the underlying link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over the underlying point-to-point link technology.
///
/// The production implementation drives real sockets; tests use
/// [`mock::MockRadio`].
pub trait Radio: Send + Sync {
    /// Creates a listening endpoint for the given service.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the endpoint cannot be
    /// created (e.g., the transport is down or the address is taken).
    fn open_listener(&self, service: ServiceId) -> Result<Arc<dyn ListenerEndpoint>, TransportError>;

    /// Creates a connectable endpoint bound to `(peer, service)`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the endpoint cannot be
    /// created (e.g., the peer address cannot be interpreted).
    fn open_connector(
        &self,
        peer: &PeerAddr,
        service: ServiceId,
    ) -> Result<Arc<dyn ConnectorEndpoint>, TransportError>;

    /// Stops any discovery/scan process owned by the transport.
    ///
    /// On this class of transport an active scan degrades connect
    /// reliability, so callers stop it before every connect attempt.
    fn cancel_discovery(&self);
}

/// A listening endpoint awaiting one inbound link.
pub trait ListenerEndpoint: Send + Sync {
    /// Blocks until a remote peer connects or the endpoint is closed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when unblocked by [`close`], or
    /// [`TransportError::Io`] on an accept failure.
    ///
    /// [`close`]: ListenerEndpoint::close
    fn accept(&self) -> Result<Box<dyn LinkStream>, TransportError>;

    /// Closes the endpoint, unblocking a pending [`accept`].  Idempotent.
    ///
    /// [`accept`]: ListenerEndpoint::accept
    fn close(&self);
}

/// A connect-side endpoint bound to one target peer.
pub trait ConnectorEndpoint: Send + Sync {
    /// Blocks until the link to the target peer is established or the
    /// endpoint is closed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when unblocked by [`close`], or
    /// another variant if the connect attempt fails.
    ///
    /// [`close`]: ConnectorEndpoint::close
    fn connect(&self) -> Result<Box<dyn LinkStream>, TransportError>;

    /// Closes the endpoint, unblocking a pending [`connect`].  Idempotent.
    ///
    /// [`connect`]: ConnectorEndpoint::connect
    fn close(&self);
}

/// An established bidirectional byte stream.
pub trait LinkStream: Send {
    /// Derives independent read and write access from the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the halves cannot be derived; the stream is
    /// unusable in that case.
    fn split(self: Box<Self>) -> Result<StreamHalves, TransportError>;
}

/// The three handles derived from one established stream.
///
/// Reader and writer are independently owned so a blocking receive loop and
/// a caller-context write path can run concurrently; the shutdown handle is
/// shared and idempotent.
pub struct StreamHalves {
    pub reader: Box<dyn StreamReader>,
    pub writer: Box<dyn StreamWriter>,
    pub shutdown: Arc<dyn StreamShutdown>,
}

/// Blocking read access to one stream.
pub trait StreamReader: Send {
    /// Blocks until some bytes are available, the peer closes the stream, or
    /// the stream is shut down locally.
    ///
    /// Returns the number of bytes placed in `buf`; `Ok(0)` is the terminal
    /// read (peer closed, or local shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] on a read failure.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Write access to one stream.
pub trait StreamWriter: Send {
    /// Writes all of `bytes` to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] on a write failure.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Shared shutdown handle for one stream.
pub trait StreamShutdown: Send + Sync {
    /// Closes the underlying stream, unblocking a pending read.  Idempotent.
    fn shutdown(&self);
}
