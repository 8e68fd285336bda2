//! Hub integration tests over real loopback sockets.
//!
//! Each test binds a hub on port 0, dials it with client-side messengers
//! over `TokioNetworkProvider`, and exercises the registry, the merged
//! origin-tagged stream, and the lifecycle event streams end to end.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard::{
    DisconnectReason, HubError, MessageHub, Messenger, MessengerConfig, NetworkProvider, PeerId,
    Providers, TokioProviders, message_set,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub n: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub body: String,
}

message_set! {
    /// Messages exchanged by the hub tests.
    pub enum TestMessage {
        "Test.Ping" => Ping,
        "Test.Chat" => Chat,
    }
}

type ClientMessenger = Messenger<TestMessage, tokio::net::TcpStream, TokioProviders>;

/// Run a future on a current-thread runtime inside a `LocalSet`, bounded so
/// a hung test fails instead of wedging the suite.
fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    tokio::task::LocalSet::new().block_on(&runtime, async {
        tokio::time::timeout(Duration::from_secs(10), future)
            .await
            .expect("test timed out")
    })
}

async fn listening_hub() -> (MessageHub<TestMessage, TokioProviders>, String) {
    let mut hub = MessageHub::new(
        TokioProviders::new(),
        TestMessage::registry(),
        MessengerConfig::default(),
    );
    hub.start_listening(0).await.expect("start listening");
    let bound = hub.local_addr().expect("local addr");
    let port = bound.rsplit(':').next().expect("port in addr");
    (hub, format!("127.0.0.1:{port}"))
}

async fn connect_client(addr: &str) -> ClientMessenger {
    let providers = TokioProviders::new();
    let stream = providers.network().connect(addr).await.expect("connect");
    let mut messenger = Messenger::new(
        providers,
        stream,
        addr,
        Rc::new(TestMessage::registry()),
        MessengerConfig::default(),
    );
    messenger.start_executing().await;
    messenger
}

#[test]
fn merged_stream_tags_messages_with_their_origin() {
    run_local(async {
        let (hub, addr) = listening_hub().await;
        let mut all = hub.take_messages().expect("merged stream");
        let mut connected = hub.subscribe_connected();

        let client_a = connect_client(&addr).await;
        let peer_a = connected.recv().await.expect("peer a");
        let client_b = connect_client(&addr).await;
        let peer_b = connected.recv().await.expect("peer b");
        assert_ne!(peer_a.id(), peer_b.id());

        client_a.send(&TestMessage::from(Ping { n: 1 }));
        let inbound = all.recv().await.expect("tagged message");
        assert_eq!(inbound.origin, peer_a.id());
        assert_eq!(inbound.message, TestMessage::from(Ping { n: 1 }));

        client_b.send(&TestMessage::from(Chat {
            body: "from b".to_string(),
        }));
        let inbound = all.recv().await.expect("tagged message");
        assert_eq!(inbound.origin, peer_b.id());
        assert_eq!(
            inbound.message,
            TestMessage::from(Chat {
                body: "from b".to_string()
            })
        );
    });
}

#[test]
fn broadcast_reaches_every_peer_exactly_once() {
    run_local(async {
        let (hub, addr) = listening_hub().await;
        let mut connected = hub.subscribe_connected();

        let client_a = connect_client(&addr).await;
        let client_b = connect_client(&addr).await;
        let mut inbox_a = client_a.subscribe();
        let mut inbox_b = client_b.subscribe();
        connected.recv().await.expect("peer a");
        connected.recv().await.expect("peer b");

        let announcement = TestMessage::from(Chat {
            body: "everyone".to_string(),
        });
        hub.send_to_all(&announcement);

        assert_eq!(inbox_a.recv().await.as_ref(), Some(&announcement));
        assert_eq!(inbox_b.recv().await.as_ref(), Some(&announcement));
        // Exactly one copy each.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(inbox_a.try_recv().is_err());
        assert!(inbox_b.try_recv().is_err());
    });
}

#[test]
fn unicast_reaches_only_the_addressed_peer() {
    run_local(async {
        let (hub, addr) = listening_hub().await;
        let mut connected = hub.subscribe_connected();

        let client_a = connect_client(&addr).await;
        let peer_a = connected.recv().await.expect("peer a");
        let client_b = connect_client(&addr).await;
        connected.recv().await.expect("peer b");
        let mut inbox_a = client_a.subscribe();
        let mut inbox_b = client_b.subscribe();

        let direct = TestMessage::from(Ping { n: 42 });
        hub.send_to(&direct, peer_a.id()).expect("send_to");

        assert_eq!(inbox_a.recv().await, Some(direct));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(inbox_b.try_recv().is_err());
    });
}

#[test]
fn sending_to_an_unknown_peer_is_an_error() {
    run_local(async {
        let (hub, _addr) = listening_hub().await;
        let never_accepted = PeerId::from_parts(0xdead, 0xbeef);

        let result = hub.send_to(&TestMessage::from(Ping { n: 0 }), never_accepted);
        assert!(matches!(
            result,
            Err(HubError::UnknownPeer { peer_id }) if peer_id == never_accepted
        ));
    });
}

#[test]
fn a_disconnected_peer_becomes_unknown() {
    run_local(async {
        let (hub, addr) = listening_hub().await;
        let mut connected = hub.subscribe_connected();
        let mut disconnected = hub.subscribe_disconnected();

        let mut client = connect_client(&addr).await;
        let peer = connected.recv().await.expect("peer");
        assert_eq!(hub.peer_count(), 1);
        assert_eq!(hub.peer(peer.id()), Some(peer.clone()));

        client
            .disconnect(DisconnectReason::Graceful)
            .await
            .expect("client disconnect");

        let event = disconnected.recv().await.expect("disconnect event");
        assert_eq!(event.peer.id(), peer.id());
        assert_eq!(event.reason, DisconnectReason::Graceful);
        assert_eq!(hub.peer_count(), 0);
        assert!(hub.peer(peer.id()).is_none());

        let result = hub.send_to(&TestMessage::from(Ping { n: 0 }), peer.id());
        assert!(matches!(result, Err(HubError::UnknownPeer { .. })));
    });
}

#[test]
fn disconnect_all_drains_the_registry_and_notifies_both_sides() {
    run_local(async {
        let (hub, addr) = listening_hub().await;
        let mut connected = hub.subscribe_connected();
        let mut disconnected = hub.subscribe_disconnected();

        let client_a = connect_client(&addr).await;
        let client_b = connect_client(&addr).await;
        let mut farewell_a = client_a.subscribe_disconnects();
        let mut farewell_b = client_b.subscribe_disconnects();
        connected.recv().await.expect("peer a");
        connected.recv().await.expect("peer b");
        assert_eq!(hub.peer_count(), 2);

        hub.disconnect_all().await;

        assert_eq!(hub.peer_count(), 0);
        let first = disconnected.recv().await.expect("event");
        let second = disconnected.recv().await.expect("event");
        assert_eq!(first.reason, DisconnectReason::Graceful);
        assert_eq!(second.reason, DisconnectReason::Graceful);
        assert_ne!(first.peer.id(), second.peer.id());

        // Each client observed the handshake frame, not an abrupt close.
        assert_eq!(farewell_a.recv().await, Some(DisconnectReason::Graceful));
        assert_eq!(farewell_b.recv().await, Some(DisconnectReason::Graceful));
    });
}

#[test]
fn unexpected_client_drop_is_reported_as_unexpected() {
    run_local(async {
        let (hub, addr) = listening_hub().await;
        let mut connected = hub.subscribe_connected();
        let mut disconnected = hub.subscribe_disconnected();

        let client = connect_client(&addr).await;
        let peer = connected.recv().await.expect("peer");
        drop(client);

        let event = disconnected.recv().await.expect("disconnect event");
        assert_eq!(event.peer.id(), peer.id());
        assert_eq!(event.reason, DisconnectReason::Unexpected);
        assert_eq!(hub.peer_count(), 0);
    });
}

#[test]
fn listening_twice_is_rejected() {
    run_local(async {
        let (mut hub, _addr) = listening_hub().await;
        let result = hub.start_listening(0).await;
        assert!(matches!(result, Err(HubError::AlreadyListening)));
    });
}

#[test]
fn stop_listening_refuses_new_connections_but_keeps_existing_ones() {
    run_local(async {
        let (mut hub, addr) = listening_hub().await;
        let mut connected = hub.subscribe_connected();

        let client = connect_client(&addr).await;
        let peer = connected.recv().await.expect("peer");
        let mut inbox = client.subscribe();

        hub.stop_listening();
        assert!(!hub.is_listening());
        assert!(hub.local_addr().is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let refused = TokioProviders::new().network().connect(&addr).await;
        assert!(refused.is_err(), "listener should be gone");

        // The existing connection still routes.
        let message = TestMessage::from(Ping { n: 5 });
        hub.send_to(&message, peer.id()).expect("send_to");
        assert_eq!(inbox.recv().await, Some(message));
    });
}
