//! The hub's connection registry.

use std::collections::HashMap;

use crate::peer::{Peer, PeerId};

/// One registered connection: the peer identity and its messenger handle.
pub(crate) struct PeerEntry<T> {
    /// The durable identity assigned at accept time.
    pub peer: Peer,
    /// Handle to the messenger owning the connection.
    pub messenger: T,
}

/// Registry of live connections, keyed by peer id.
///
/// This is the hub's single coordinator for connection bookkeeping: entries
/// are inserted and removed whole, under one borrow, so an id, its peer
/// record, and its messenger are always present or absent together. Bulk
/// operations hand out snapshots; nothing iterates the live map while it
/// can change.
pub(crate) struct PeerRegistry<T> {
    entries: HashMap<PeerId, PeerEntry<T>>,
}

impl<T> PeerRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert a whole entry. Ids are freshly generated per accept, so a
    /// collision would be a bug; the old entry is replaced if one somehow
    /// exists.
    pub fn insert(&mut self, peer: Peer, messenger: T) {
        self.entries
            .insert(peer.id(), PeerEntry { peer, messenger });
    }

    /// Remove and return a whole entry.
    pub fn remove(&mut self, id: &PeerId) -> Option<PeerEntry<T>> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerEntry<T>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot of the registered peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.entries.values().map(|entry| entry.peer.clone()).collect()
    }

    /// Snapshot of every messenger handle with its peer id.
    pub fn messengers(&self) -> Vec<(PeerId, T)>
    where
        T: Clone,
    {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.messenger.clone()))
            .collect()
    }

    /// Remove every entry, returning them as a snapshot.
    pub fn drain_all(&mut self) -> Vec<PeerEntry<T>> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
