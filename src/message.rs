//! Message model: outbound trait, inbound type registry, origin tagging.
//!
//! Outbound messages implement [`WireMessage`]: they declare the type name
//! that goes in the frame header and produce their own JSON body. Inbound
//! frames carry only that type name, so the receiving side resolves it
//! against a [`MessageRegistry`] built by the host: an explicit map from
//! type name to decode function. Lookups fail closed: a frame with an
//! unregistered name is dropped by the messenger, never guessed at.
//!
//! The hub wraps every decoded payload in [`Inbound`] as it merges
//! per-connection streams, stamping the sender's [`PeerId`] on it. Most
//! applications define one enum covering their payload types and let
//! [`message_set!`](crate::message_set) generate the trait impls and the
//! registry.

use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::peer::PeerId;

/// An application payload that can be framed for the wire.
pub trait WireMessage {
    /// The runtime type name written into the frame header. The receiving
    /// side must have registered the same name.
    fn type_name(&self) -> &str;

    /// Serialize the payload body to JSON bytes.
    fn to_payload(&self) -> serde_json::Result<Vec<u8>>;
}

type DecodeFn<M> = Box<dyn Fn(&[u8]) -> serde_json::Result<M>>;

/// Registry of known inbound message types.
///
/// Maps each wire type name to a decode function producing the application
/// message type `M`. Supplied by the host when constructing a messenger or
/// hub; acts as the whitelist of acceptable frame types.
pub struct MessageRegistry<M> {
    decoders: HashMap<String, DecodeFn<M>>,
}

impl<M> MessageRegistry<M> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register payload type `T` under `type_name`.
    ///
    /// Registering the same name again replaces the previous entry. A type
    /// may be registered under several names (aliases decode to the same
    /// variant).
    pub fn register<T>(&mut self, type_name: impl Into<String>)
    where
        T: DeserializeOwned + 'static,
        M: From<T> + 'static,
    {
        self.decoders.insert(
            type_name.into(),
            Box::new(|payload| serde_json::from_slice::<T>(payload).map(M::from)),
        );
    }

    /// Decode a payload by its declared type name.
    ///
    /// `None` means the name is not registered (the caller drops the frame);
    /// `Some(Err(_))` means the name is known but the body failed to parse.
    pub fn decode(&self, type_name: &str, payload: &[u8]) -> Option<serde_json::Result<M>> {
        self.decoders.get(type_name).map(|decode| decode(payload))
    }

    /// Whether `type_name` is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Iterate the registered type names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Number of registered type names.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl<M> Default for MessageRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for MessageRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("MessageRegistry")
            .field("types", &names)
            .finish()
    }
}

/// A decoded inbound message tagged with the peer it arrived from.
///
/// The payload itself does not know its origin; the hub stamps it here as
/// the message crosses from a connection's stream onto the merged stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound<M> {
    /// Identifier of the peer whose connection carried the message.
    pub origin: PeerId,
    /// The decoded payload.
    pub message: M,
}
