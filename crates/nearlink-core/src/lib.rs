//! # nearlink-core
//!
//! Shared library for NearLink containing the peer identity types, the
//! well-known service rendezvous token, and payload helpers.
//!
//! This crate is used by the peer application and its integration tests.
//! It has zero dependencies on OS APIs, sockets, or threads.

// Declare the top-level modules.  Rust will look for each in a file with the
// same name (e.g., src/identity.rs).
pub mod identity;
pub mod payload;

// Re-export the most-used types at the crate root so callers can write
// `nearlink_core::PeerAddr` instead of `nearlink_core::identity::PeerAddr`.
pub use identity::{IdentityError, PeerAddr, ServiceId, CHAT_SERVICE};
