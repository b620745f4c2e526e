//! LinkManager: the single caller-facing surface of the link layer.
//!
//! The manager owns three singleton slots (listener task, initiator task,
//! active session) behind one mutex.  Every slot mutation, whether it comes
//! from caller context (`start_listening`, `initiate_connection`, `send`,
//! `shutdown`) or from a task thread handing in a freshly established stream,
//! goes through that lock.  Two successes racing in from the listener and an
//! initiator therefore serialize: the last writer wins the session slot and
//! the superseded stream is closed on the spot, so at most one session is
//! ever alive.
//!
//! Session and initiator threads never take the slots lock themselves; they
//! communicate through the liveness flag, the event channel, and the
//! `on_connected` callback registered at spawn time.  The callback is the
//! only path back into the lock, and it runs on the task thread, after the
//! blocking call has already returned.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use nearlink_core::{PeerAddr, ServiceId};

use crate::infrastructure::radio::{LinkStream, Radio};

use super::initiator::InitiatorTask;
use super::listener::ListenerTask;
use super::session::SessionHandle;
use super::{LinkError, LinkEvent, LinkEventReceiver, LinkRole, EVENT_CHANNEL_CAPACITY};

/// Orchestrates listening, connecting, and the single active session.
pub struct LinkManager {
    radio: Arc<dyn Radio>,
    service: ServiceId,
    shared: Arc<Shared>,
}

struct Shared {
    slots: Mutex<Slots>,
    events: mpsc::Sender<LinkEvent>,
}

/// The manager's owned state: each entry is replaced, never aliased.
#[derive(Default)]
struct Slots {
    listener: Option<ListenerTask>,
    initiator: Option<InitiatorTask>,
    session: Option<SessionHandle>,
}

impl LinkManager {
    /// Creates a manager and returns it together with the event receiver.
    ///
    /// Nothing is listening yet; call [`start_listening`] to accept inbound
    /// links.
    ///
    /// [`start_listening`]: LinkManager::start_listening
    pub fn new(radio: Arc<dyn Radio>, service: ServiceId) -> (Self, LinkEventReceiver) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Self {
            radio,
            service,
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots::default()),
                events: tx,
            }),
        };
        (manager, rx)
    }

    /// Starts (or re-arms) listening for one inbound link.
    ///
    /// Idempotent: while an accept is already pending this is a no-op.  Each
    /// successful accept is single-shot, so after a session arrives this
    /// must be called again to accept the next one.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::TransportUnavailable`] if the listening endpoint
    /// cannot be created.  The manager stays usable; the caller may retry.
    pub fn start_listening(&self) -> Result<(), LinkError> {
        let mut slots = self.shared.slots.lock().expect("lock poisoned");

        if let Some(task) = &slots.listener {
            if task.is_accepting() {
                debug!("already accepting; start_listening is a no-op");
                return Ok(());
            }
        }
        // Release the completed task (and with it the old endpoint) before
        // opening a new one, otherwise the transport may still consider the
        // address taken.
        slots.listener = None;

        let endpoint = self
            .radio
            .open_listener(self.service)
            .map_err(LinkError::TransportUnavailable)?;

        let shared = Arc::clone(&self.shared);
        slots.listener = Some(ListenerTask::spawn(endpoint, move |stream| {
            install_session(&shared, stream, LinkRole::Listener);
        }));
        info!("listening for an inbound link");
        Ok(())
    }

    /// Starts an outbound connection attempt to `peer`, superseding any
    /// attempt already in flight.
    ///
    /// Never blocks.  Completion is observed through the event channel: a
    /// `Connected` event on success, or nothing but a logged failure
    /// otherwise (retry is the caller's decision).
    pub fn initiate_connection(&self, peer: PeerAddr) {
        let mut slots = self.shared.slots.lock().expect("lock poisoned");

        if let Some(prior) = slots.initiator.take() {
            debug!("superseding connection attempt to {}", prior.peer());
            prior.cancel();
        }

        self.emit(LinkEvent::ConnectingStarted { peer: peer.clone() });

        let shared = Arc::clone(&self.shared);
        slots.initiator = Some(InitiatorTask::spawn(
            Arc::clone(&self.radio),
            peer,
            self.service,
            move |stream| {
                install_session(&shared, stream, LinkRole::Initiator);
            },
        ));
    }

    /// Sends one payload on the active session.
    ///
    /// The payload goes out as a raw byte-stream write; no framing is added,
    /// so the receiver may see it split or coalesced with other payloads.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NoActiveSession`] if no session is alive.  This
    /// is the only error `send` reports; a write failure on a live stream is
    /// logged and surfaces later as the session ending.
    pub fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        let mut slots = self.shared.slots.lock().expect("lock poisoned");
        match &slots.session {
            Some(session) if session.is_alive() => {
                session.write(payload);
                Ok(())
            }
            Some(_) => {
                // The worker already wound down; drop the dead handle.
                slots.session = None;
                Err(LinkError::NoActiveSession)
            }
            None => Err(LinkError::NoActiveSession),
        }
    }

    /// Cancels everything: the pending accept, any in-flight connect, and
    /// the active session.
    pub fn shutdown(&self) {
        debug!("link manager shutting down");
        let mut slots = self.shared.slots.lock().expect("lock poisoned");
        if let Some(listener) = slots.listener.take() {
            listener.cancel();
        }
        if let Some(initiator) = slots.initiator.take() {
            initiator.cancel();
        }
        if let Some(session) = slots.session.take() {
            session.close();
        }
    }

    /// Emits an event from caller context without ever blocking the caller.
    fn emit(&self, event: LinkEvent) {
        if let Err(e) = self.shared.events.try_send(event) {
            warn!("dropping link event, channel unavailable: {e}");
        }
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Installs a freshly established stream as the active session.
///
/// This is the sole mutation point of the session slot.  It runs on the
/// task thread that produced the stream, under the slots lock, so successes
/// from the listener and an initiator cannot interleave.
fn install_session(shared: &Arc<Shared>, stream: Box<dyn LinkStream>, role: LinkRole) {
    let mut slots = shared.slots.lock().expect("lock poisoned");

    if let Some(previous) = slots.session.take() {
        debug!("superseding previous session");
        // The old worker notices the close and reports its own SessionEnded.
        previous.close();
    }

    match SessionHandle::start(stream, shared.events.clone()) {
        Ok(session) => {
            slots.session = Some(session);
            info!("session established ({role:?})");
            if let Err(e) = shared.events.try_send(LinkEvent::Connected { role }) {
                warn!("dropping Connected event, channel unavailable: {e}");
            }
        }
        Err(e) => {
            // Fatal to this session only; the slot simply stays empty.
            error!("could not start session worker: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
