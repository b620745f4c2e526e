//! The established-link worker.
//!
//! A session owns one stream: a dedicated thread loops on the blocking read
//! and surfaces every chunk it gets, while writes pass straight through from
//! caller context.  The two directions are decoupled: a failed write is
//! reported but does not stop the receive loop; only a read error, the
//! peer closing, or a local shutdown ends the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::infrastructure::radio::{
    LinkStream, StreamHalves, StreamReader, StreamShutdown, StreamWriter,
};

use super::{LinkError, LinkEvent};

/// Size of the receive buffer, and therefore the largest chunk one inbound
/// notification can carry.
pub(crate) const RECV_CHUNK: usize = 1024;

/// Handle to one running session: `Starting -> Receiving -> Closed`.
///
/// `Starting` is [`start`] itself (deriving the stream halves); the spawned
/// thread is `Receiving` until its terminal read, error, or shutdown, after
/// which the liveness flag is cleared and `Closed` is permanent.
///
/// [`start`]: SessionHandle::start
pub(crate) struct SessionHandle {
    writer: Mutex<Box<dyn StreamWriter>>,
    shutdown: Arc<dyn StreamShutdown>,
    alive: Arc<AtomicBool>,
    #[allow(dead_code)]
    join: JoinHandle<()>,
}

impl SessionHandle {
    /// Splits the stream and spawns the receive loop.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::SessionIo`] if read/write access cannot be
    /// derived from the stream.  The failure is fatal to this session only.
    pub(crate) fn start(
        stream: Box<dyn LinkStream>,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Self, LinkError> {
        let StreamHalves {
            reader,
            writer,
            shutdown,
        } = stream.split().map_err(LinkError::SessionIo)?;

        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = Arc::clone(&alive);
        let join = thread::Builder::new()
            .name("nearlink-session".to_string())
            .spawn(move || {
                receive_loop(reader, events, loop_alive);
            })
            .expect("failed to spawn session thread");

        Ok(Self {
            writer: Mutex::new(writer),
            shutdown,
            alive,
            join,
        })
    }

    /// Whether the receive loop is still running.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Writes one payload to the stream.  A failure is reported here and
    /// nowhere else; the receive loop keeps running.
    pub(crate) fn write(&self, payload: &[u8]) {
        let mut writer = self.writer.lock().expect("lock poisoned");
        if let Err(e) = writer.write(payload) {
            warn!("session write failed: {e}");
        }
    }

    /// Closes the underlying stream, unblocking the pending read and driving
    /// the receive loop to its end.  Idempotent.
    pub(crate) fn close(&self) {
        self.shutdown.shutdown();
    }
}

/// Runs on the session thread until the stream ends.
fn receive_loop(
    mut reader: Box<dyn StreamReader>,
    events: mpsc::Sender<LinkEvent>,
    alive: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; RECV_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("session stream closed");
                break;
            }
            Ok(n) => {
                if events
                    .blocking_send(LinkEvent::Inbound(buf[..n].to_vec()))
                    .is_err()
                {
                    // Receiver dropped; the application is shutting down.
                    break;
                }
            }
            Err(e) => {
                warn!("session read failed: {e}");
                break;
            }
        }
    }

    // Liveness must be cleared before the event goes out so that a caller
    // reacting to SessionEnded already observes the session as gone.
    alive.store(false, Ordering::SeqCst);
    let _ = events.blocking_send(LinkEvent::SessionEnded);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
