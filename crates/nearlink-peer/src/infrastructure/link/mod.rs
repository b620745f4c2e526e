//! Link lifecycle machinery: establishing a session over the transport port
//! and exchanging raw byte payloads on it.
//!
//! Three kinds of task cooperate, each on its own thread because each sits in
//! a genuinely blocking call:
//!
//! - [`listener::ListenerTask`] blocks in `accept`, waiting for a remote
//!   peer to arrive.
//! - [`initiator::InitiatorTask`] blocks in `connect`, reaching out to a
//!   known peer.
//! - [`session::SessionHandle`] owns one established stream and blocks in
//!   `read`, surfacing inbound chunks.
//!
//! The [`manager::LinkManager`] owns all three as singleton slots and is the
//! only interface callers see.  Whatever happens, at most one session is
//! alive at any instant: a new stream, from either side, supersedes and
//! closes the previous session.

use thiserror::Error;
use tokio::sync::mpsc;

use nearlink_core::PeerAddr;

use super::radio::TransportError;

pub mod initiator;
pub mod listener;
pub mod manager;
pub mod session;

/// Error type for link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A listening or connecting endpoint could not be created.  Non-fatal;
    /// the manager stays usable and the caller may retry.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),
    /// A connect attempt failed.  Non-fatal; retry is the caller's decision.
    #[error("connect to {peer} failed: {source}")]
    ConnectFailed {
        peer: PeerAddr,
        #[source]
        source: TransportError,
    },
    /// A read or write on an established stream failed, ending that session.
    #[error("session I/O error: {0}")]
    SessionIo(#[source] TransportError),
    /// `send` was called while no session is alive.
    #[error("no active session")]
    NoActiveSession,
    /// An in-flight accept or connect was deliberately interrupted.
    #[error("operation canceled")]
    Canceled,
}

/// Which side established the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// The session arrived through the listening endpoint.
    Listener,
    /// The session was initiated towards a known peer.
    Initiator,
}

/// Events emitted by the link layer to the presentation layer.
#[derive(Debug)]
pub enum LinkEvent {
    /// An outbound connection attempt has started.
    ConnectingStarted { peer: PeerAddr },
    /// A session was established.
    Connected { role: LinkRole },
    /// The active session ended: the stream errored, the peer closed it, or
    /// a new session superseded it.
    SessionEnded,
    /// One chunk of bytes arrived on the active session.  Chunk boundaries
    /// are whatever the transport returned from one read; they are not
    /// message boundaries.
    Inbound(Vec<u8>),
}

/// Capacity of the event channel handed out by the manager.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shorthand for the receiving end of the link event channel.
pub type LinkEventReceiver = mpsc::Receiver<LinkEvent>;
