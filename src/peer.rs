//! Peer identity types.
//!
//! The hub assigns every accepted connection a [`PeerId`]: 128 random bits,
//! displayed as 32 hex digits. The id is opaque to callers; its only
//! obligations are uniqueness, cheap copying, and usability as a map key.
//! [`Peer`] pairs the id with the remote address observed at accept time and
//! is never mutated afterward.

use serde::{Deserialize, Serialize};

use crate::provider::RandomProvider;
use crate::wire::DisconnectReason;

/// Opaque unique identifier for one connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId {
    hi: u64,
    lo: u64,
}

impl PeerId {
    /// Create an id from explicit parts. Mostly useful in tests; production
    /// ids come from [`PeerId::generate`].
    pub const fn from_parts(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Generate a fresh random id.
    pub fn generate<R: RandomProvider>(random: &R) -> Self {
        Self {
            hi: random.random(),
            lo: random.random(),
        }
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// One connected remote peer: the hub's durable identity for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    id: PeerId,
    address: String,
}

impl Peer {
    /// Create a peer record.
    pub fn new(id: PeerId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// The peer's identifier.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The remote transport address observed when the connection was
    /// accepted.
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// A peer lifecycle event: the connection ended with the given reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnection {
    /// The peer whose connection ended.
    pub peer: Peer,
    /// Why it ended.
    pub reason: DisconnectReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokioRandomProvider;
    use std::collections::HashMap;

    #[test]
    fn display_is_32_hex_digits() {
        let id = PeerId::from_parts(0x0123_4567_89ab_cdef, 0xfedc_ba98_7654_3210);
        assert_eq!(id.to_string(), "0123456789abcdeffedcba9876543210");
        assert_eq!(PeerId::from_parts(0, 1).to_string().len(), 32);
    }

    #[test]
    fn generated_ids_are_distinct() {
        let random = TokioRandomProvider::new();
        let a = PeerId::generate(&random);
        let b = PeerId::generate(&random);
        assert_ne!(a, b);
    }

    #[test]
    fn id_works_as_map_key() {
        let mut map = HashMap::new();
        let id = PeerId::from_parts(7, 9);
        map.insert(id, "entry");
        assert_eq!(map.get(&PeerId::from_parts(7, 9)), Some(&"entry"));
    }

    #[test]
    fn peer_exposes_id_and_address() {
        let id = PeerId::from_parts(1, 2);
        let peer = Peer::new(id, "127.0.0.1:4000");
        assert_eq!(peer.id(), id);
        assert_eq!(peer.address(), "127.0.0.1:4000");
    }
}
