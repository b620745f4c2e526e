//! End-to-end tests over the real TCP transport on loopback.
//!
//! These tests put actual sockets under the link manager: a raw `std`
//! socket plays the remote device in the single-manager tests, and the
//! two-manager test runs the full listener-meets-initiator rendezvous the
//! way two devices would.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use nearlink_core::{PeerAddr, CHAT_SERVICE};
use nearlink_peer::infrastructure::link::manager::LinkManager;
use nearlink_peer::infrastructure::link::{LinkError, LinkEvent, LinkEventReceiver, LinkRole};
use nearlink_peer::infrastructure::radio::tcp::{TcpRadio, TcpRadioConfig};
use nearlink_peer::infrastructure::radio::Radio;

const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Binds port 0 to let the OS pick a free port, then releases it so the test
/// can re-bind it through the radio.
fn free_port() -> u16 {
    let probe = TcpListener::bind("127.0.0.1:0").expect("probe bind");
    let port = probe.local_addr().unwrap().port();
    drop(probe);
    port
}

fn manager_on(port: u16) -> (LinkManager, LinkEventReceiver) {
    let radio = Arc::new(TcpRadio::new(TcpRadioConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        port,
        accept_poll: Duration::from_millis(20),
        read_poll: Duration::from_millis(20),
        connect_poll: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(3),
    }));
    LinkManager::new(radio as Arc<dyn Radio>, CHAT_SERVICE)
}

async fn next_event(rx: &mut LinkEventReceiver) -> LinkEvent {
    timeout(EVENT_WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Reads from a raw socket until `expected` bytes arrived or the deadline
/// passes.  Byte-stream reads may split a payload; this reassembles it.
fn read_exactly(stream: &mut TcpStream, expected: usize) -> Vec<u8> {
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .expect("set timeout");
    let mut collected = Vec::new();
    let mut buf = [0u8; 256];
    let end = Instant::now() + EVENT_WAIT;
    while collected.len() < expected && Instant::now() < end {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&buf[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(e) => panic!("peer read failed: {e}"),
        }
    }
    collected
}

/// The reference scenario: listen, let a peer connect, observe exactly one
/// `Connected` event, and see `send(b"hi")` arrive byte-exact on the peer's
/// side of the socket.
#[tokio::test]
async fn test_listener_session_sends_exact_bytes_to_the_peer() {
    let port = free_port();
    let (manager, mut rx) = manager_on(port);
    manager.start_listening().expect("start_listening");

    // The remote device connects with a plain socket.
    let mut peer_socket =
        TcpStream::connect(("127.0.0.1", port)).expect("peer connect");

    match next_event(&mut rx).await {
        LinkEvent::Connected { role } => assert_eq!(role, LinkRole::Listener),
        other => panic!("expected Connected, got {other:?}"),
    }

    manager.send(b"hi").expect("send");

    let received = read_exactly(&mut peer_socket, 2);
    assert_eq!(received, b"hi", "the peer must see the exact payload bytes");

    // No second Connected event is pending.
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "exactly one Connected event expected"
    );
}

/// Inbound direction: bytes written by the peer surface as one or more
/// `Inbound` events that concatenate to the original payload.
#[tokio::test]
async fn test_peer_bytes_surface_as_inbound_events() {
    let port = free_port();
    let (manager, mut rx) = manager_on(port);
    manager.start_listening().expect("start_listening");

    let mut peer_socket =
        TcpStream::connect(("127.0.0.1", port)).expect("peer connect");
    assert!(matches!(
        next_event(&mut rx).await,
        LinkEvent::Connected { .. }
    ));

    peer_socket.write_all(b"over the air").expect("peer write");

    let mut collected = Vec::new();
    while collected.len() < b"over the air".len() {
        match next_event(&mut rx).await {
            LinkEvent::Inbound(bytes) => collected.extend_from_slice(&bytes),
            other => panic!("expected Inbound, got {other:?}"),
        }
    }
    assert_eq!(collected, b"over the air");
}

/// A peer that disappears ends the session: one `SessionEnded`, after which
/// `send` reports `NoActiveSession`.
#[tokio::test]
async fn test_peer_disconnect_ends_the_session() {
    let port = free_port();
    let (manager, mut rx) = manager_on(port);
    manager.start_listening().expect("start_listening");

    let peer_socket = TcpStream::connect(("127.0.0.1", port)).expect("peer connect");
    assert!(matches!(
        next_event(&mut rx).await,
        LinkEvent::Connected { .. }
    ));

    drop(peer_socket);

    assert!(matches!(next_event(&mut rx).await, LinkEvent::SessionEnded));
    let end = Instant::now() + EVENT_WAIT;
    loop {
        match manager.send(b"anyone there?") {
            Err(LinkError::NoActiveSession) => break,
            Ok(()) if Instant::now() < end => {
                tokio::time::sleep(Duration::from_millis(10)).await
            }
            other => panic!("expected NoActiveSession eventually, got {other:?}"),
        }
    }
}

/// Two full manager instances rendezvous and exchange messages, the way two
/// devices running the application would.
#[tokio::test]
async fn test_two_managers_rendezvous_and_exchange() {
    let port = free_port();
    let (listener_mgr, mut listener_rx) = manager_on(port);
    listener_mgr.start_listening().expect("start_listening");

    // The initiator side binds nothing; it only connects out.
    let (initiator_mgr, mut initiator_rx) = manager_on(free_port());
    let target: PeerAddr = format!("127.0.0.1:{port}").parse().expect("peer addr");
    initiator_mgr.initiate_connection(target.clone());

    // Both sides observe their session.
    match next_event(&mut initiator_rx).await {
        LinkEvent::ConnectingStarted { peer } => assert_eq!(peer, target),
        other => panic!("expected ConnectingStarted, got {other:?}"),
    }
    loop {
        match next_event(&mut initiator_rx).await {
            LinkEvent::Connected { role } => {
                assert_eq!(role, LinkRole::Initiator);
                break;
            }
            other => panic!("expected Connected, got {other:?}"),
        }
    }
    match next_event(&mut listener_rx).await {
        LinkEvent::Connected { role } => assert_eq!(role, LinkRole::Listener),
        other => panic!("expected Connected, got {other:?}"),
    }

    // Initiator -> listener.
    initiator_mgr.send(b"ping").expect("send ping");
    let mut collected = Vec::new();
    while collected.len() < 4 {
        match next_event(&mut listener_rx).await {
            LinkEvent::Inbound(bytes) => collected.extend_from_slice(&bytes),
            other => panic!("expected Inbound, got {other:?}"),
        }
    }
    assert_eq!(collected, b"ping");

    // Listener -> initiator.
    listener_mgr.send(b"pong").expect("send pong");
    let mut collected = Vec::new();
    while collected.len() < 4 {
        match next_event(&mut initiator_rx).await {
            LinkEvent::Inbound(bytes) => collected.extend_from_slice(&bytes),
            other => panic!("expected Inbound, got {other:?}"),
        }
    }
    assert_eq!(collected, b"pong");
}

/// A taken port makes `start_listening` fail without poisoning the manager.
#[tokio::test]
async fn test_start_listening_reports_unavailable_port() {
    let holder = TcpListener::bind("127.0.0.1:0").expect("bind holder");
    let port = holder.local_addr().unwrap().port();

    let (manager, _rx) = manager_on(port);
    assert!(matches!(
        manager.start_listening(),
        Err(LinkError::TransportUnavailable(_))
    ));

    // Freeing the port lets a retry succeed.
    drop(holder);
    manager
        .start_listening()
        .expect("retry after the port freed up");
}

/// A connect attempt at a silent port fails on its own; the manager stays
/// usable and a later attempt can still succeed.
#[tokio::test]
async fn test_failed_connect_leaves_the_manager_usable() {
    let dead_port = free_port();
    let (manager, mut rx) = manager_on(free_port());

    let dead: PeerAddr = format!("127.0.0.1:{dead_port}").parse().unwrap();
    manager.initiate_connection(dead);
    assert!(matches!(
        next_event(&mut rx).await,
        LinkEvent::ConnectingStarted { .. }
    ));

    // The refused connect produces no session and no crash.
    assert!(
        timeout(Duration::from_millis(500), rx.recv()).await.is_err(),
        "a failed attempt must not produce a Connected event"
    );
    assert!(matches!(
        manager.send(b"nope"),
        Err(LinkError::NoActiveSession)
    ));

    // A real listener appears; the next attempt succeeds.
    let live_port = free_port();
    let (listener_mgr, mut listener_rx) = manager_on(live_port);
    listener_mgr.start_listening().expect("start_listening");

    let live: PeerAddr = format!("127.0.0.1:{live_port}").parse().unwrap();
    manager.initiate_connection(live);
    loop {
        match next_event(&mut rx).await {
            LinkEvent::Connected { role } => {
                assert_eq!(role, LinkRole::Initiator);
                break;
            }
            LinkEvent::ConnectingStarted { .. } => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(matches!(
        next_event(&mut listener_rx).await,
        LinkEvent::Connected { .. }
    ));
}
