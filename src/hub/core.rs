//! Core hub implementation: accept loop, registry, routing.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::registry::PeerRegistry;
use crate::error::{HubError, HubResult};
use crate::message::{Inbound, MessageRegistry, WireMessage};
use crate::messenger::{Messenger, MessengerConfig};
use crate::peer::{Disconnection, Peer, PeerId};
use crate::provider::{
    NetworkProvider, Providers, RandomProvider, TaskProvider, TcpListenerTrait, TimeProvider,
};
use crate::stream::{Fanout, MergeStream};
use crate::wire::DisconnectReason;

/// Pause after a failed accept before trying again, so a persistent
/// listener error cannot spin the loop hot.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

type HubStream<P> = <<P as Providers>::Network as NetworkProvider>::TcpStream;
type SharedMessenger<M, P> = Rc<RefCell<Messenger<M, HubStream<P>, P>>>;

/// Mutable hub bookkeeping, guarded by one `RefCell`.
struct HubState<M, P: Providers> {
    registry: PeerRegistry<SharedMessenger<M, P>>,
    merge: MergeStream<PeerId, Inbound<M>, P::Task>,
}

/// State shared with the accept loop and the per-peer disconnect watchers.
struct HubShared<M, P: Providers> {
    state: RefCell<HubState<M, P>>,
    connected: Fanout<Peer>,
    disconnected: Fanout<Disconnection>,
    messages: Rc<MessageRegistry<M>>,
    config: MessengerConfig,
    providers: P,
}

/// Handle for an active listener.
struct Listener {
    local_addr: String,
    accept_handle: JoinHandle<()>,
}

/// Accepts connections, tracks each as an addressable peer, and routes
/// messages.
///
/// Every accepted connection gets a fresh [`PeerId`], its own
/// [`Messenger`], and a registry entry inserted as one unit. The
/// messenger's inbound stream is merged into the hub's single combined
/// stream, with each item tagged by the peer it arrived from; unicast and
/// broadcast sends go the other way through the same registry. Peer
/// lifecycle is observable through the connected/disconnected event
/// streams.
///
/// All bookkeeping lives behind a single coordinator: inserts happen only
/// in the accept path, removals only in disconnect handling, and bulk
/// operations iterate snapshots rather than the live registry.
pub struct MessageHub<M, P: Providers> {
    shared: Rc<HubShared<M, P>>,
    listener: Option<Listener>,
}

impl<M, P> MessageHub<M, P>
where
    M: WireMessage + Clone + 'static,
    P: Providers,
{
    /// Create a hub. `messages` is the whitelist of inbound payload types;
    /// `config` is handed to every messenger the hub constructs.
    pub fn new(providers: P, messages: MessageRegistry<M>, config: MessengerConfig) -> Self {
        let merge = MergeStream::new(providers.task().clone());
        Self {
            shared: Rc::new(HubShared {
                state: RefCell::new(HubState {
                    registry: PeerRegistry::new(),
                    merge,
                }),
                connected: Fanout::new(),
                disconnected: Fanout::new(),
                messages: Rc::new(messages),
                config,
                providers,
            }),
            listener: None,
        }
    }

    /// Bind the given port and start accepting connections.
    ///
    /// Port 0 asks the OS for a free port; [`local_addr`](Self::local_addr)
    /// reveals the choice.
    pub async fn start_listening(&mut self, port: u16) -> HubResult<()> {
        if self.listener.is_some() {
            return Err(HubError::AlreadyListening);
        }
        let address = format!("0.0.0.0:{port}");
        let listener = self
            .shared
            .providers
            .network()
            .bind(&address)
            .await
            .map_err(|source| HubError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| HubError::Bind {
            address,
            source,
        })?;
        tracing::info!(address = %local_addr, "hub listening");

        let accept_handle = self
            .shared
            .providers
            .task()
            .spawn_task("hub-accept-loop", accept_loop(listener, self.shared.clone()));
        self.listener = Some(Listener {
            local_addr,
            accept_handle,
        });
        Ok(())
    }

    /// Stop accepting new connections. Existing connections are unaffected.
    /// Idempotent.
    pub fn stop_listening(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.accept_handle.abort();
            tracing::info!(address = %listener.local_addr, "hub stopped listening");
        }
    }

    /// Whether the hub is currently accepting connections.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// The bound listen address, while listening.
    pub fn local_addr(&self) -> Option<String> {
        self.listener
            .as_ref()
            .map(|listener| listener.local_addr.clone())
    }

    /// Send a message to one peer.
    ///
    /// Enqueues on the peer's messenger with the usual per-connection FIFO
    /// guarantee. Fails with [`HubError::UnknownPeer`] if the id is not
    /// registered: disconnected already, or never accepted.
    pub fn send_to(&self, message: &M, peer_id: PeerId) -> HubResult<()> {
        let state = self.shared.state.borrow();
        match state.registry.get(&peer_id) {
            Some(entry) => {
                entry.messenger.borrow().send(message);
                Ok(())
            }
            None => Err(HubError::UnknownPeer { peer_id }),
        }
    }

    /// Send a message to every currently registered peer.
    ///
    /// Each connection's send is independently ordered; there is no
    /// cross-connection ordering guarantee.
    pub fn send_to_all(&self, message: &M) {
        let messengers = self.shared.state.borrow().registry.messengers();
        for (_, messenger) in messengers {
            messenger.borrow().send(message);
        }
    }

    /// Gracefully disconnect every registered peer.
    ///
    /// Works over a point-in-time snapshot: all entries are unregistered
    /// first, then each connection gets the disconnect handshake in turn.
    /// Peers accepted after the snapshot are untouched.
    pub async fn disconnect_all(&self) {
        let entries = {
            let mut state = self.shared.state.borrow_mut();
            let entries = state.registry.drain_all();
            for entry in &entries {
                state.merge.unmerge(&entry.peer.id());
            }
            entries
        };
        for entry in entries {
            let result = entry
                .messenger
                .borrow_mut()
                .disconnect(DisconnectReason::Graceful)
                .await;
            if let Err(error) = result {
                tracing::warn!(peer = %entry.peer.id(), %error, "graceful disconnect did not complete");
            }
            tracing::info!(peer = %entry.peer.id(), "client disconnected");
            self.shared.disconnected.publish(Disconnection {
                peer: entry.peer,
                reason: DisconnectReason::Graceful,
            });
        }
    }

    /// Take the merged inbound stream across all current and future
    /// connections, each item tagged with the peer it arrived from.
    ///
    /// The stream can be taken once; later calls return `None`.
    pub fn take_messages(&self) -> Option<mpsc::UnboundedReceiver<Inbound<M>>> {
        self.shared.state.borrow_mut().merge.take_output()
    }

    /// Subscribe to peer-connected events.
    pub fn subscribe_connected(&self) -> mpsc::UnboundedReceiver<Peer> {
        self.shared.connected.subscribe()
    }

    /// Subscribe to peer-disconnected events.
    pub fn subscribe_disconnected(&self) -> mpsc::UnboundedReceiver<Disconnection> {
        self.shared.disconnected.subscribe()
    }

    /// Look up a registered peer by id.
    pub fn peer(&self, id: PeerId) -> Option<Peer> {
        self.shared
            .state
            .borrow()
            .registry
            .get(&id)
            .map(|entry| entry.peer.clone())
    }

    /// Snapshot of the currently registered peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.shared.state.borrow().registry.peers()
    }

    /// Number of currently registered peers.
    pub fn peer_count(&self) -> usize {
        self.shared.state.borrow().registry.len()
    }
}

impl<M, P: Providers> Drop for MessageHub<M, P> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.accept_handle.abort();
        }
    }
}

/// Background accept loop: one iteration per inbound connection.
async fn accept_loop<M, P>(listener: <P::Network as NetworkProvider>::TcpListener, shared: Rc<HubShared<M, P>>)
where
    M: WireMessage + Clone + 'static,
    P: Providers,
{
    loop {
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                handle_accepted(stream, remote_addr, &shared).await;
            }
            Err(error) => {
                tracing::error!(%error, "accept failed, pausing before retrying");
                let _ = shared.providers.time().sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Wire up one accepted connection: identity, messenger, registry entry,
/// merge source, lifecycle event, then execution.
async fn handle_accepted<M, P>(stream: HubStream<P>, remote_addr: String, shared: &Rc<HubShared<M, P>>)
where
    M: WireMessage + Clone + 'static,
    P: Providers,
{
    let peer_id = PeerId::generate(shared.providers.random());
    let peer = Peer::new(peer_id, remote_addr.clone());

    let messenger = Messenger::new(
        shared.providers.clone(),
        stream,
        remote_addr,
        shared.messages.clone(),
        shared.config.clone(),
    );
    let inbound_rx = messenger.subscribe();
    let disconnects_rx = messenger.subscribe_disconnects();
    let messenger: SharedMessenger<M, P> = Rc::new(RefCell::new(messenger));

    {
        let mut state = shared.state.borrow_mut();
        state.registry.insert(peer.clone(), messenger.clone());
        state.merge.merge_with(peer_id, inbound_rx, move |message| Inbound {
            origin: peer_id,
            message,
        });
    }
    shared.providers.task().spawn_task(
        "hub-disconnect-watcher",
        watch_disconnect(disconnects_rx, peer.clone(), shared.clone()),
    );
    tracing::info!(peer = %peer_id, address = %peer.address(), "client connected");
    shared.connected.publish(peer);

    // A fresh messenger has no prior run to supersede, so this completes
    // without suspending and the borrow is not held across a real await.
    messenger.borrow_mut().start_executing().await;
}

/// Waits for one messenger's disconnect notification and tears down its
/// registry entry.
///
/// Whichever of this watcher or `disconnect_all` removes the entry emits
/// the disconnected event, so each peer gets it exactly once.
async fn watch_disconnect<M, P>(
    mut disconnects_rx: mpsc::UnboundedReceiver<DisconnectReason>,
    peer: Peer,
    shared: Rc<HubShared<M, P>>,
) where
    M: WireMessage + Clone + 'static,
    P: Providers,
{
    let Some(reason) = disconnects_rx.recv().await else {
        return;
    };
    let removed = {
        let mut state = shared.state.borrow_mut();
        let removed = state.registry.remove(&peer.id()).is_some();
        if removed {
            state.merge.unmerge(&peer.id());
        }
        removed
    };
    if removed {
        tracing::info!(peer = %peer.id(), %reason, "client disconnected");
        shared.disconnected.publish(Disconnection { peer, reason });
    }
}
