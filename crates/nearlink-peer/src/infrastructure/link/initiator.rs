//! The connect side of link establishment.
//!
//! An `InitiatorTask` is one outbound attempt at one peer: it stops any
//! discovery scan first (a scan running during connect makes the connect
//! unreliable on this class of transport), opens a connectable endpoint, and
//! blocks in `connect`.  It runs straight through; the attempt either
//! succeeds, fails, or is canceled.  There is no automatic retry; the caller
//! decides whether to try again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use nearlink_core::{PeerAddr, ServiceId};

use crate::infrastructure::radio::{ConnectorEndpoint, LinkStream, Radio, TransportError};

use super::LinkError;

/// One outbound connect task:
/// `Idle -> Connecting -> (Connected | Failed | Canceled)`.
pub(crate) struct InitiatorTask {
    peer: PeerAddr,
    canceled: Arc<AtomicBool>,
    // Published by the task thread once the endpoint exists, so a cancel
    // arriving mid-attempt can close it and unblock the connect.
    endpoint: Arc<Mutex<Option<Arc<dyn ConnectorEndpoint>>>>,
    #[allow(dead_code)]
    join: JoinHandle<()>,
}

impl InitiatorTask {
    /// Spawns the connect thread for `(peer, service)`.  On success the
    /// stream is handed to `on_connected`.
    pub(crate) fn spawn<F>(
        radio: Arc<dyn Radio>,
        peer: PeerAddr,
        service: ServiceId,
        on_connected: F,
    ) -> Self
    where
        F: FnOnce(Box<dyn LinkStream>) + Send + 'static,
    {
        let canceled = Arc::new(AtomicBool::new(false));
        let endpoint: Arc<Mutex<Option<Arc<dyn ConnectorEndpoint>>>> =
            Arc::new(Mutex::new(None));

        let task_canceled = Arc::clone(&canceled);
        let task_endpoint = Arc::clone(&endpoint);
        let task_peer = peer.clone();
        let join = thread::Builder::new()
            .name("nearlink-connect".to_string())
            .spawn(move || {
                run_connect(
                    radio,
                    task_peer,
                    service,
                    task_canceled,
                    task_endpoint,
                    on_connected,
                );
            })
            .expect("failed to spawn connect thread");

        Self {
            peer,
            canceled,
            endpoint,
            join,
        }
    }

    /// The peer this attempt is bound to.
    pub(crate) fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    /// Cancels the attempt: marks it canceled and closes the connect-side
    /// endpoint so the blocked connect call fails.
    pub(crate) fn cancel(&self) {
        debug!("canceling connect task for {}", self.peer);
        self.canceled.store(true, Ordering::SeqCst);
        if let Some(endpoint) = self.endpoint.lock().expect("lock poisoned").as_ref() {
            endpoint.close();
        }
    }
}

fn run_connect<F>(
    radio: Arc<dyn Radio>,
    peer: PeerAddr,
    service: ServiceId,
    canceled: Arc<AtomicBool>,
    endpoint_slot: Arc<Mutex<Option<Arc<dyn ConnectorEndpoint>>>>,
    on_connected: F,
) where
    F: FnOnce(Box<dyn LinkStream>),
{
    debug!("connect task started for {peer}");

    // An active scan starves the connect of radio time; stop it first.
    radio.cancel_discovery();

    let endpoint = match radio.open_connector(&peer, service) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!(
                "{}",
                LinkError::ConnectFailed {
                    peer,
                    source: e
                }
            );
            return;
        }
    };
    *endpoint_slot.lock().expect("lock poisoned") = Some(Arc::clone(&endpoint));

    // A cancel may have raced with endpoint creation; make sure a canceled
    // task never leaves its endpoint open.
    if canceled.load(Ordering::SeqCst) {
        endpoint.close();
        debug!("connect task for {peer} canceled before connecting");
        return;
    }

    match endpoint.connect() {
        Ok(stream) => {
            if canceled.load(Ordering::SeqCst) {
                // The caller moved on while the connect was succeeding;
                // the won stream must not become a session.
                debug!("connect to {peer} canceled after success; discarding stream");
                drop(stream);
                endpoint.close();
                return;
            }
            info!("outbound link to {peer} established");
            on_connected(stream);
        }
        Err(TransportError::Closed) => {
            debug!("connect to {peer} canceled");
        }
        Err(e) => {
            endpoint.close();
            warn!(
                "{}",
                LinkError::ConnectFailed {
                    peer,
                    source: e
                }
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
