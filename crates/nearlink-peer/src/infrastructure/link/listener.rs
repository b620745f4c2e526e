//! The accept side of link establishment.
//!
//! A `ListenerTask` wraps one listening endpoint and one thread blocked in
//! `accept`.  It is single-shot: one successful accept completes the task,
//! and listening does not re-arm by itself.  Continuous listening is the
//! caller's job (call `LinkManager::start_listening` again after a session
//! ends), which keeps "who is allowed to receive the next connection" an
//! explicit decision instead of an ambient side effect.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::infrastructure::radio::{LinkStream, ListenerEndpoint, TransportError};

/// One single-shot accept task: `Idle -> Accepting -> (Completed | Canceled)`.
///
/// The states live in the thread's control flow: spawning enters `Accepting`,
/// returning from the thread is `Completed`, and an accept unblocked by
/// [`cancel`] is `Canceled`.
///
/// [`cancel`]: ListenerTask::cancel
pub(crate) struct ListenerTask {
    endpoint: Arc<dyn ListenerEndpoint>,
    join: JoinHandle<()>,
}

impl ListenerTask {
    /// Spawns the accept thread.  On success the accepted stream is handed to
    /// `on_connected`, registered here so the task never needs to know who
    /// owns it.
    pub(crate) fn spawn<F>(endpoint: Arc<dyn ListenerEndpoint>, on_connected: F) -> Self
    where
        F: FnOnce(Box<dyn LinkStream>) + Send + 'static,
    {
        let accepting = Arc::clone(&endpoint);
        let join = thread::Builder::new()
            .name("nearlink-accept".to_string())
            .spawn(move || {
                debug!("accept task waiting for an inbound link");
                match accepting.accept() {
                    Ok(stream) => {
                        info!("inbound link accepted");
                        on_connected(stream);
                    }
                    Err(TransportError::Closed) => {
                        debug!("accept task canceled");
                    }
                    Err(e) => {
                        // The attempt is dropped; nothing is propagated.
                        warn!("accept failed: {e}");
                    }
                }
            })
            .expect("failed to spawn accept thread");

        Self { endpoint, join }
    }

    /// Whether the task is still blocked in `accept`.
    pub(crate) fn is_accepting(&self) -> bool {
        !self.join.is_finished()
    }

    /// Closes the listening endpoint, unblocking the pending accept.
    pub(crate) fn cancel(&self) {
        debug!("canceling accept task");
        self.endpoint.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
