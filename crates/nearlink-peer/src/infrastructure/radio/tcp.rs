//! TCP-backed transport, the loopback/LAN stand-in for a short-range radio.
//!
//! The binary and the end-to-end tests run over this implementation.  The
//! service UUID has no on-wire representation here: rendezvous is by TCP
//! port, and the UUID is only logged so mismatched configurations are
//! visible in the output of both peers.
//!
//! # Cancellation
//!
//! `std` sockets cannot be forcibly unblocked from another thread, so every
//! blocking call is implemented as a bounded wait in a loop that checks a
//! `closed` flag between waits:
//!
//! - `accept` polls a non-blocking listener, sleeping `accept_poll` between
//!   attempts.
//! - `connect` issues `connect_timeout` slices of `connect_poll` until the
//!   overall `connect_timeout` budget is spent.
//! - `read` uses a socket read timeout of `read_poll`.
//!
//! `WouldBlock` and `TimedOut` are the "check the flag and keep waiting"
//! cases; any other error is a real transport failure.  Closing therefore
//! takes effect within one poll interval rather than instantaneously, which
//! is the same trade-off the rest of this codebase makes for blocking I/O.

use std::net::{IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use nearlink_core::{PeerAddr, ServiceId};

use super::{
    ConnectorEndpoint, LinkStream, ListenerEndpoint, Radio, StreamHalves, StreamReader,
    StreamShutdown, StreamWriter, TransportError,
};

/// Configuration for the TCP transport.
#[derive(Debug, Clone)]
pub struct TcpRadioConfig {
    /// IP address to bind the listening socket to.
    pub bind_address: IpAddr,
    /// TCP port both peers rendezvous on.
    pub port: u16,
    /// Poll interval for a pending accept.
    pub accept_poll: Duration,
    /// Read timeout on established streams; bounds how long a local shutdown
    /// can go unnoticed by the receive loop.
    pub read_poll: Duration,
    /// Length of one `connect_timeout` slice.
    pub connect_poll: Duration,
    /// Overall budget for one connect attempt.
    pub connect_timeout: Duration,
}

impl Default for TcpRadioConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".parse().unwrap(),
            port: 7600,
            accept_poll: Duration::from_millis(100),
            read_poll: Duration::from_millis(200),
            connect_poll: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// TCP implementation of the transport port.
pub struct TcpRadio {
    config: TcpRadioConfig,
}

impl TcpRadio {
    pub fn new(config: TcpRadioConfig) -> Self {
        Self { config }
    }
}

impl Radio for TcpRadio {
    fn open_listener(&self, service: ServiceId) -> Result<Arc<dyn ListenerEndpoint>, TransportError> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(addr)
            .map_err(|e| TransportError::Unavailable(format!("bind failed on {addr}: {e}")))?;
        listener.set_nonblocking(true)?;

        info!("listening on TCP {addr} for service {service}");
        Ok(Arc::new(TcpListenerEndpoint {
            listener,
            closed: AtomicBool::new(false),
            accept_poll: self.config.accept_poll,
            read_poll: self.config.read_poll,
        }))
    }

    fn open_connector(
        &self,
        peer: &PeerAddr,
        service: ServiceId,
    ) -> Result<Arc<dyn ConnectorEndpoint>, TransportError> {
        let target = peer
            .as_str()
            .to_socket_addrs()
            .map_err(|e| TransportError::Unavailable(format!("cannot resolve {peer}: {e}")))?
            .next()
            .ok_or_else(|| TransportError::Unavailable(format!("no address for {peer}")))?;

        debug!("connector created for {target}, service {service}");
        Ok(Arc::new(TcpConnectorEndpoint {
            target,
            closed: AtomicBool::new(false),
            connect_poll: self.config.connect_poll,
            connect_timeout: self.config.connect_timeout,
            read_poll: self.config.read_poll,
        }))
    }

    fn cancel_discovery(&self) {
        // TCP has no scan phase.
        debug!("cancel_discovery: nothing to stop on the TCP transport");
    }
}

// ── Listener endpoint ─────────────────────────────────────────────────────────

struct TcpListenerEndpoint {
    listener: TcpListener,
    closed: AtomicBool,
    accept_poll: Duration,
    read_poll: Duration,
}

impl ListenerEndpoint for TcpListenerEndpoint {
    fn accept(&self) -> Result<Box<dyn LinkStream>, TransportError> {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Err(TransportError::Closed);
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("accepted inbound TCP link from {peer}");
                    // The accepted socket inherits non-blocking mode on some
                    // platforms; put it back into blocking mode.
                    stream.set_nonblocking(false)?;
                    return Ok(Box::new(TcpLinkStream {
                        stream,
                        read_poll: self.read_poll,
                    }));
                }
                Err(e) if is_retry_error(&e) => std::thread::sleep(self.accept_poll),
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

// ── Connector endpoint ────────────────────────────────────────────────────────

struct TcpConnectorEndpoint {
    target: SocketAddr,
    closed: AtomicBool,
    connect_poll: Duration,
    connect_timeout: Duration,
    read_poll: Duration,
}

impl ConnectorEndpoint for TcpConnectorEndpoint {
    fn connect(&self) -> Result<Box<dyn LinkStream>, TransportError> {
        let deadline = Instant::now() + self.connect_timeout;
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Err(TransportError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.target),
                )));
            }
            let slice = remaining.min(self.connect_poll);
            match TcpStream::connect_timeout(&self.target, slice) {
                Ok(stream) => {
                    debug!("outbound TCP link to {} established", self.target);
                    return Ok(Box::new(TcpLinkStream {
                        stream,
                        read_poll: self.read_poll,
                    }));
                }
                Err(e) if is_retry_error(&e) => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

// ── Stream ────────────────────────────────────────────────────────────────────

struct TcpLinkStream {
    stream: TcpStream,
    read_poll: Duration,
}

impl LinkStream for TcpLinkStream {
    fn split(self: Box<Self>) -> Result<StreamHalves, TransportError> {
        let reader = self.stream.try_clone()?;
        let writer = self.stream.try_clone()?;
        // SO_RCVTIMEO is per-socket, so setting it on one clone is enough.
        reader.set_read_timeout(Some(self.read_poll))?;

        let closed = Arc::new(AtomicBool::new(false));
        Ok(StreamHalves {
            reader: Box::new(TcpStreamReader {
                stream: reader,
                closed: Arc::clone(&closed),
            }),
            writer: Box::new(TcpStreamWriter {
                stream: writer,
            }),
            shutdown: Arc::new(TcpStreamShutdown {
                stream: self.stream,
                closed,
            }),
        })
    }
}

struct TcpStreamReader {
    stream: TcpStream,
    closed: Arc<AtomicBool>,
}

impl StreamReader for TcpStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        use std::io::Read;
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Ok(0);
            }
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if is_retry_error(&e) => continue,
                // A shutdown racing with the read can surface as a reset;
                // report it as the terminal read instead of a failure.
                Err(_) if self.closed.load(Ordering::Relaxed) => return Ok(0),
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }
}

struct TcpStreamWriter {
    stream: TcpStream,
}

impl StreamWriter for TcpStreamWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        use std::io::Write;
        self.stream.write_all(bytes)?;
        Ok(())
    }
}

struct TcpStreamShutdown {
    stream: TcpStream,
    closed: Arc<AtomicBool>,
}

impl StreamShutdown for TcpStreamShutdown {
    fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // Already closed by the peer; nothing left to release.
            debug!("stream shutdown reported: {e}");
        }
    }
}

/// Returns `true` for OS timeout / would-block errors that mean "check the
/// closed flag and keep waiting".
fn is_retry_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use nearlink_core::CHAT_SERVICE;

    /// Binds port 0 to let the OS pick a free port, then releases it so the
    /// test can re-bind it through the radio.
    fn free_port() -> u16 {
        let probe = TcpListener::bind("127.0.0.1:0").expect("probe bind");
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        port
    }

    fn test_radio(port: u16) -> TcpRadio {
        TcpRadio::new(TcpRadioConfig {
            bind_address: "127.0.0.1".parse().unwrap(),
            port,
            accept_poll: Duration::from_millis(20),
            read_poll: Duration::from_millis(20),
            connect_poll: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(2),
        })
    }

    #[test]
    fn test_is_retry_error_recognises_timed_out_and_would_block() {
        assert!(is_retry_error(&std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out"
        )));
        assert!(is_retry_error(&std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "would block"
        )));
        assert!(!is_retry_error(&std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused"
        )));
    }

    #[test]
    fn test_open_listener_fails_when_port_is_taken() {
        // Arrange: occupy a port outside the radio
        let holder = TcpListener::bind("127.0.0.1:0").expect("bind holder");
        let port = holder.local_addr().unwrap().port();

        // Act
        let result = test_radio(port).open_listener(CHAT_SERVICE);

        // Assert
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
    }

    #[test]
    fn test_close_unblocks_pending_accept() {
        // Arrange
        let radio = test_radio(free_port());
        let endpoint = radio.open_listener(CHAT_SERVICE).expect("open listener");

        // Act: block in accept on another thread, then close
        let accepting = Arc::clone(&endpoint);
        let handle = std::thread::spawn(move || accepting.accept().err());
        std::thread::sleep(Duration::from_millis(50));
        endpoint.close();

        // Assert: accept returned Closed within the poll interval
        let err = handle.join().expect("join").expect("accept must fail");
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn test_connect_to_refused_port_fails_fast() {
        // Arrange: a freed probe port refuses connections
        let radio = test_radio(7600);
        let peer: PeerAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();
        let connector = radio.open_connector(&peer, CHAT_SERVICE).expect("open");

        // Act
        let started = Instant::now();
        let result = connector.connect();

        // Assert: refused, not retried until the overall timeout
        assert!(matches!(result, Err(TransportError::Io(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_connect_after_close_reports_closed() {
        let radio = test_radio(7600);
        let peer: PeerAddr = "127.0.0.1:1".parse().unwrap();
        let connector = radio.open_connector(&peer, CHAT_SERVICE).expect("open");

        connector.close();

        assert!(matches!(connector.connect(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_open_connector_rejects_unresolvable_peer() {
        let radio = test_radio(7600);
        let peer: PeerAddr = "not-an-address".parse().unwrap();

        let result = radio.open_connector(&peer, CHAT_SERVICE);

        assert!(matches!(result, Err(TransportError::Unavailable(_))));
    }

    #[test]
    fn test_accept_connect_exchange_and_shutdown_round_trip() {
        // Arrange: one listener, one connector, same port
        let port = free_port();
        let radio = test_radio(port);
        let listener = radio.open_listener(CHAT_SERVICE).expect("open listener");

        let accepting = Arc::clone(&listener);
        let accept_thread = std::thread::spawn(move || accepting.accept().expect("accept"));

        let peer: PeerAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let connector = radio.open_connector(&peer, CHAT_SERVICE).expect("open connector");
        let outbound = connector.connect().expect("connect");
        let inbound = accept_thread.join().expect("join accept");

        // Act: split both sides and push bytes each way
        let StreamHalves {
            reader: mut a_reader,
            writer: mut a_writer,
            shutdown: a_shutdown,
        } = outbound.split().expect("split outbound");
        let mut b = inbound.split().expect("split inbound");

        a_writer.write(b"ping").expect("write ping");
        let mut buf = [0u8; 64];
        let n = b.reader.read(&mut buf).expect("read ping");
        assert_eq!(&buf[..n], b"ping");

        b.writer.write(b"pong").expect("write pong");
        let n = a_reader.read(&mut buf).expect("read pong");
        assert_eq!(&buf[..n], b"pong");

        // Act: shut one side down; its blocked reader sees the terminal read
        let reader_thread = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            a_reader.read(&mut buf)
        });
        std::thread::sleep(Duration::from_millis(50));
        a_shutdown.shutdown();

        // Assert
        let terminal = reader_thread.join().expect("join reader").expect("read");
        assert_eq!(terminal, 0, "local shutdown must yield the terminal read");
    }

    #[test]
    fn test_peer_close_yields_terminal_read_on_other_side() {
        // Arrange
        let port = free_port();
        let radio = test_radio(port);
        let listener = radio.open_listener(CHAT_SERVICE).expect("open listener");

        let accepting = Arc::clone(&listener);
        let accept_thread = std::thread::spawn(move || accepting.accept().expect("accept"));

        let peer: PeerAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let connector = radio.open_connector(&peer, CHAT_SERVICE).expect("open connector");
        let outbound = connector.connect().expect("connect");
        let inbound = accept_thread.join().expect("join accept");

        let halves = inbound.split().expect("split");
        let mut reader = halves.reader;

        // Act: drop the whole outbound stream (peer goes away)
        drop(outbound);

        // Assert
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).expect("read after peer close");
        assert_eq!(n, 0, "peer close must yield the terminal read");
    }
}
