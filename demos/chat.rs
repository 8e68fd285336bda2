//! Chat demo: a hub and two clients in one process.
//!
//! Shows the host wiring end to end: declare a message set, start a hub on
//! an OS-assigned port, dial it with two client messengers, then exercise
//! broadcast, unicast, the origin-tagged merged stream, and a graceful
//! shutdown.
//!
//! ```bash
//! RUST_LOG=switchboard=debug cargo run --example chat
//! ```

use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard::{
    MessageHub, Messenger, MessengerConfig, NetworkProvider, Providers, TokioProviders,
    message_set,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub author: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub body: String,
}

message_set! {
    /// Everything the chat demo exchanges.
    pub enum ChatMessage {
        "Chat.Post" => Post,
        "Chat.Notice" => Notice,
    }
}

type Client = Messenger<ChatMessage, tokio::net::TcpStream, TokioProviders>;

async fn connect_client(addr: &str, author: &str) -> Client {
    let providers = TokioProviders::new();
    let stream = providers
        .network()
        .connect(addr)
        .await
        .expect("connect to hub");
    let mut messenger = Messenger::new(
        providers,
        stream,
        addr,
        Rc::new(ChatMessage::registry()),
        MessengerConfig::default(),
    );
    messenger.start_executing().await;
    println!("[{author}] connected to {addr}");
    messenger
}

async fn run() {
    let mut hub = MessageHub::new(
        TokioProviders::new(),
        ChatMessage::registry(),
        MessengerConfig::default(),
    );
    hub.start_listening(0).await.expect("start listening");
    let bound = hub.local_addr().expect("local addr");
    let port = bound.rsplit(':').next().expect("port");
    let addr = format!("127.0.0.1:{port}");
    println!("[hub] listening on {addr}");

    let mut all = hub.take_messages().expect("merged stream");
    let mut connected = hub.subscribe_connected();
    let mut disconnected = hub.subscribe_disconnected();

    let alice = connect_client(&addr, "alice").await;
    let bob = connect_client(&addr, "bob").await;
    let alice_peer = connected.recv().await.expect("alice accepted");
    let bob_peer = connected.recv().await.expect("bob accepted");
    println!("[hub] alice is peer {}", alice_peer.id());
    println!("[hub] bob   is peer {}", bob_peer.id());

    let mut alice_inbox = alice.subscribe();
    let mut bob_inbox = bob.subscribe();

    // Both clients post; the hub reads one merged stream, each item tagged
    // with the peer it arrived from.
    alice.send(&ChatMessage::from(Post {
        author: "alice".to_string(),
        body: "hello from alice".to_string(),
    }));
    bob.send(&ChatMessage::from(Post {
        author: "bob".to_string(),
        body: "hello from bob".to_string(),
    }));
    for _ in 0..2 {
        let inbound = all.recv().await.expect("merged message");
        println!("[hub] from {}: {:?}", inbound.origin, inbound.message);
    }

    // Broadcast to everyone, then a unicast only bob sees.
    hub.send_to_all(&ChatMessage::from(Notice {
        body: "welcome, both of you".to_string(),
    }));
    hub.send_to(
        &ChatMessage::from(Notice {
            body: "bob, you have a direct message".to_string(),
        }),
        bob_peer.id(),
    )
    .expect("unicast to bob");

    println!("[alice] got {:?}", alice_inbox.recv().await.expect("notice"));
    println!("[bob]   got {:?}", bob_inbox.recv().await.expect("notice"));
    println!("[bob]   got {:?}", bob_inbox.recv().await.expect("direct"));

    // Graceful shutdown: every client observes the handshake frame.
    let mut alice_farewell = alice.subscribe_disconnects();
    let mut bob_farewell = bob.subscribe_disconnects();
    hub.disconnect_all().await;
    while hub.peer_count() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!(
        "[alice] disconnected: {}",
        alice_farewell.recv().await.expect("reason")
    );
    println!(
        "[bob]   disconnected: {}",
        bob_farewell.recv().await.expect("reason")
    );
    while let Ok(event) = disconnected.try_recv() {
        println!("[hub] peer {} left: {}", event.peer.id(), event.reason);
    }

    hub.stop_listening();
    println!("[hub] done");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    tokio::task::LocalSet::new().block_on(&runtime, run());
}
