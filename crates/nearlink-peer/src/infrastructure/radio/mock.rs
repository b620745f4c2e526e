//! Mock transport for unit and integration testing.
//!
//! Lets tests drive the whole link lifecycle without sockets:
//!
//! - [`MockRadio::inject_incoming`] simulates a remote peer arriving at the
//!   listening endpoint.
//! - [`MockRadio::script_connect_ok`] / [`script_connect_fail`] /
//!   [`script_connect_hang`] decide, per target peer, what the next connect
//!   attempt does.  `hang` blocks until the endpoint is closed, which is how
//!   tests exercise cancellation.
//! - [`MockRemote`] is the test's end of an established stream: push bytes
//!   for the receive loop, read back what the peer wrote, or close the
//!   stream to simulate the remote going away.
//! - [`ConnectorProbe`] observes whether a scripted endpoint was opened and
//!   whether it has been closed.
//!
//! [`script_connect_fail`]: MockRadio::script_connect_fail
//! [`script_connect_hang`]: MockRadio::script_connect_hang

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use nearlink_core::{PeerAddr, ServiceId};

use super::{
    ConnectorEndpoint, LinkStream, ListenerEndpoint, Radio, StreamHalves, StreamReader,
    StreamShutdown, StreamWriter, TransportError,
};

/// How long blocked mock calls wait between checks of their wake conditions.
const MOCK_POLL: Duration = Duration::from_millis(10);

/// A scriptable implementation of [`Radio`].
pub struct MockRadio {
    state: Mutex<MockState>,
    discovery_cancels: AtomicUsize,
}

#[derive(Default)]
struct MockState {
    fail_next_listener: bool,
    listeners: Vec<Arc<MockListenerEndpoint>>,
    scripts: HashMap<String, VecDeque<ConnectScript>>,
}

struct ConnectScript {
    plan: ConnectPlan,
    opened: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

enum ConnectPlan {
    Succeed(Arc<MockWire>),
    Fail,
    Hang,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            discovery_cancels: AtomicUsize::new(0),
        }
    }

    /// Makes the next `open_listener` call fail, as if the transport were
    /// unavailable.
    pub fn fail_next_listener(&self) {
        self.state.lock().expect("lock poisoned").fail_next_listener = true;
    }

    /// Number of listening endpoints successfully opened so far.
    pub fn listener_open_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").listeners.len()
    }

    /// Whether the `index`-th opened listening endpoint has been closed.
    pub fn listener_closed(&self, index: usize) -> bool {
        let state = self.state.lock().expect("lock poisoned");
        state.listeners[index].closed.load(Ordering::SeqCst)
    }

    /// Simulates a remote peer connecting to the most recently opened
    /// listening endpoint.  Returns the test's end of the new stream.
    ///
    /// Panics if `open_listener` has not been called.
    pub fn inject_incoming(&self) -> MockRemote {
        self.inject_incoming_wire(Arc::new(MockWire::default()))
    }

    /// Like [`inject_incoming`], but the resulting stream refuses to split,
    /// as if read/write access could not be derived from it.
    ///
    /// [`inject_incoming`]: MockRadio::inject_incoming
    pub fn inject_incoming_failing_split(&self) -> MockRemote {
        let wire = Arc::new(MockWire::default());
        wire.split_fail.store(true, Ordering::SeqCst);
        self.inject_incoming_wire(wire)
    }

    fn inject_incoming_wire(&self, wire: Arc<MockWire>) -> MockRemote {
        let state = self.state.lock().expect("lock poisoned");
        let listener = state
            .listeners
            .last()
            .expect("MockRadio::inject_incoming called before open_listener");
        listener.push(Box::new(MockLinkStream::over(Arc::clone(&wire))));
        MockRemote { wire }
    }

    /// Scripts the next connect attempt to `peer` to succeed.
    ///
    /// Returns the endpoint probe and the test's end of the stream the
    /// connect will produce.
    pub fn script_connect_ok(&self, peer: &PeerAddr) -> (ConnectorProbe, MockRemote) {
        let wire = Arc::new(MockWire::default());
        let probe = self.push_script(peer, ConnectPlan::Succeed(Arc::clone(&wire)));
        (probe, MockRemote { wire })
    }

    /// Scripts the next connect attempt to `peer` to fail.
    pub fn script_connect_fail(&self, peer: &PeerAddr) -> ConnectorProbe {
        self.push_script(peer, ConnectPlan::Fail)
    }

    /// Scripts the next connect attempt to `peer` to block until its
    /// endpoint is closed.
    pub fn script_connect_hang(&self, peer: &PeerAddr) -> ConnectorProbe {
        self.push_script(peer, ConnectPlan::Hang)
    }

    fn push_script(&self, peer: &PeerAddr, plan: ConnectPlan) -> ConnectorProbe {
        let opened = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let probe = ConnectorProbe {
            opened: Arc::clone(&opened),
            closed: Arc::clone(&closed),
        };
        self.state
            .lock()
            .expect("lock poisoned")
            .scripts
            .entry(peer.as_str().to_string())
            .or_default()
            .push_back(ConnectScript {
                plan,
                opened,
                closed,
            });
        probe
    }

    /// Number of times `cancel_discovery` has been called.
    pub fn discovery_cancel_count(&self) -> usize {
        self.discovery_cancels.load(Ordering::SeqCst)
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for MockRadio {
    fn open_listener(&self, _service: ServiceId) -> Result<Arc<dyn ListenerEndpoint>, TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_next_listener {
            state.fail_next_listener = false;
            return Err(TransportError::Unavailable(
                "scripted listener failure".to_string(),
            ));
        }
        let endpoint = Arc::new(MockListenerEndpoint::default());
        state.listeners.push(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    fn open_connector(
        &self,
        peer: &PeerAddr,
        _service: ServiceId,
    ) -> Result<Arc<dyn ConnectorEndpoint>, TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let script = state
            .scripts
            .get_mut(peer.as_str())
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| {
                TransportError::Unavailable(format!("no scripted connect outcome for {peer}"))
            })?;
        script.opened.store(true, Ordering::SeqCst);
        Ok(Arc::new(MockConnectorEndpoint {
            plan: Mutex::new(Some(script.plan)),
            closed: script.closed,
        }))
    }

    fn cancel_discovery(&self) {
        self.discovery_cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Observes the lifecycle of one scripted connector endpoint.
pub struct ConnectorProbe {
    opened: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ConnectorProbe {
    /// Whether `open_connector` has consumed this script.
    pub fn endpoint_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// Whether the scripted endpoint has been closed.
    pub fn endpoint_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── Listener endpoint ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MockListenerEndpoint {
    queue: Mutex<VecDeque<Box<dyn LinkStream>>>,
    arrived: Condvar,
    closed: AtomicBool,
}

impl MockListenerEndpoint {
    fn push(&self, stream: Box<dyn LinkStream>) {
        self.queue.lock().expect("lock poisoned").push_back(stream);
        self.arrived.notify_all();
    }
}

impl ListenerEndpoint for MockListenerEndpoint {
    fn accept(&self) -> Result<Box<dyn LinkStream>, TransportError> {
        let mut queue = self.queue.lock().expect("lock poisoned");
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            if let Some(stream) = queue.pop_front() {
                return Ok(stream);
            }
            let (guard, _) = self
                .arrived
                .wait_timeout(queue, MOCK_POLL)
                .expect("lock poisoned");
            queue = guard;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.arrived.notify_all();
    }
}

// ── Connector endpoint ────────────────────────────────────────────────────────

struct MockConnectorEndpoint {
    plan: Mutex<Option<ConnectPlan>>,
    closed: Arc<AtomicBool>,
}

impl ConnectorEndpoint for MockConnectorEndpoint {
    fn connect(&self) -> Result<Box<dyn LinkStream>, TransportError> {
        let plan = self.plan.lock().expect("lock poisoned").take();
        match plan {
            Some(ConnectPlan::Succeed(wire)) => {
                if self.closed.load(Ordering::SeqCst) {
                    return Err(TransportError::Closed);
                }
                Ok(Box::new(MockLinkStream::over(wire)))
            }
            Some(ConnectPlan::Fail) => Err(TransportError::Unavailable(
                "scripted connect failure".to_string(),
            )),
            Some(ConnectPlan::Hang) => loop {
                if self.closed.load(Ordering::SeqCst) {
                    return Err(TransportError::Closed);
                }
                std::thread::sleep(MOCK_POLL);
            },
            // A second connect on the same endpoint is not part of the
            // contract; report it as closed.
            None => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ── Stream ────────────────────────────────────────────────────────────────────

/// Shared state of one in-memory stream: chunks travelling towards the peer
/// under test, bytes it wrote, and the closed flag either side can set.
#[derive(Default)]
struct MockWire {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    arrived: Condvar,
    written: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    write_fail: AtomicBool,
    split_fail: AtomicBool,
}

/// The test's end of an established mock stream.
pub struct MockRemote {
    wire: Arc<MockWire>,
}

impl MockRemote {
    /// Delivers one chunk of bytes to the peer under test.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.wire
            .inbound
            .lock()
            .expect("lock poisoned")
            .push_back(bytes.to_vec());
        self.wire.arrived.notify_all();
    }

    /// Returns every chunk the peer under test has written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.wire.written.lock().expect("lock poisoned").clone()
    }

    /// Closes the stream, as if the remote device went away.
    pub fn close(&self) {
        self.wire.closed.store(true, Ordering::SeqCst);
        self.wire.arrived.notify_all();
    }

    /// Whether either side has closed the stream.
    pub fn is_closed(&self) -> bool {
        self.wire.closed.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write on the peer side fail.
    pub fn fail_writes(&self) {
        self.wire.write_fail.store(true, Ordering::SeqCst);
    }
}

struct MockLinkStream {
    wire: Arc<MockWire>,
    consumed: bool,
}

impl MockLinkStream {
    fn over(wire: Arc<MockWire>) -> Self {
        Self {
            wire,
            consumed: false,
        }
    }
}

impl LinkStream for MockLinkStream {
    fn split(mut self: Box<Self>) -> Result<StreamHalves, TransportError> {
        if self.wire.split_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable(
                "scripted split failure".to_string(),
            ));
        }
        self.consumed = true;
        Ok(StreamHalves {
            reader: Box::new(MockStreamReader {
                wire: Arc::clone(&self.wire),
            }),
            writer: Box::new(MockStreamWriter {
                wire: Arc::clone(&self.wire),
            }),
            shutdown: Arc::new(MockStreamShutdown {
                wire: Arc::clone(&self.wire),
            }),
        })
    }
}

impl Drop for MockLinkStream {
    fn drop(&mut self) {
        // A discarded (never split) stream is gone for both sides.
        if !self.consumed {
            self.wire.closed.store(true, Ordering::SeqCst);
            self.wire.arrived.notify_all();
        }
    }
}

struct MockStreamReader {
    wire: Arc<MockWire>,
}

impl StreamReader for MockStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut inbound = self.wire.inbound.lock().expect("lock poisoned");
        loop {
            // Drain queued chunks before honouring the closed flag so bytes
            // delivered just before a close are not lost.
            if let Some(mut chunk) = inbound.pop_front() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    chunk.drain(..n);
                    inbound.push_front(chunk);
                }
                return Ok(n);
            }
            if self.wire.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            let (guard, _) = self
                .wire
                .arrived
                .wait_timeout(inbound, MOCK_POLL)
                .expect("lock poisoned");
            inbound = guard;
        }
    }
}

struct MockStreamWriter {
    wire: Arc<MockWire>,
}

impl StreamWriter for MockStreamWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.wire.write_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        if self.wire.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stream closed",
            )));
        }
        self.wire
            .written
            .lock()
            .expect("lock poisoned")
            .push(bytes.to_vec());
        Ok(())
    }
}

struct MockStreamShutdown {
    wire: Arc<MockWire>,
}

impl StreamShutdown for MockStreamShutdown {
    fn shutdown(&self) {
        self.wire.closed.store(true, Ordering::SeqCst);
        self.wire.arrived.notify_all();
    }
}

/// Builds a detached stream pair for tests that exercise a component below
/// the manager: the peer-side stream plus the test's remote end.
pub fn wire_pair() -> (Box<dyn LinkStream>, MockRemote) {
    let wire = Arc::new(MockWire::default());
    (
        Box::new(MockLinkStream::over(Arc::clone(&wire))),
        MockRemote { wire },
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
