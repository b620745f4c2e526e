//! Peer identity and service rendezvous types.
//!
//! A [`PeerAddr`] names the remote device; a [`ServiceId`] names the logical
//! service both sides must agree on before a link can be established.  Both
//! are opaque to the link layer: the transport implementation decides how an
//! address is interpreted (the TCP stand-in parses it as `host:port`, a real
//! radio stack would treat it as a hardware address).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for identity parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The peer address string was empty.
    #[error("peer address must not be empty")]
    EmptyPeerAddr,
}

/// Opaque, stable identifier of a remote peer device.
///
/// Immutable once obtained.  The string form is transport-defined; this type
/// only guarantees it is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddr(String);

impl PeerAddr {
    /// Creates a peer address from its transport-defined string form.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::EmptyPeerAddr`] if `addr` is empty.
    pub fn new(addr: impl Into<String>) -> Result<Self, IdentityError> {
        let addr = addr.into();
        if addr.is_empty() {
            return Err(IdentityError::EmptyPeerAddr);
        }
        Ok(Self(addr))
    }

    /// Returns the transport-defined string form of the address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerAddr {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Well-known token identifying the logical service both endpoints must share
/// to rendezvous.  Constant for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Uuid);

impl ServiceId {
    /// Wraps an existing UUID as a service identifier.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The service identifier of the NearLink chat service.
///
/// Listener and initiator present this token to the transport so two peers
/// running the application rendezvous on the same logical service.
pub const CHAT_SERVICE: ServiceId =
    ServiceId::from_uuid(Uuid::from_u128(0x52fb_e8a4_6c2d_4d5e_9b1a_37e0_c8d1_f4a2));

// ── Tests ─────────────────────────────────────────────────────────────────────
