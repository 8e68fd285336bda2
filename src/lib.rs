//! # Switchboard
//!
//! A small message-oriented networking layer: a length-framed JSON wire
//! protocol for point-to-point connections, plus a hub that accepts many
//! such connections, tracks each as an addressable peer, and merges their
//! inbound messages into one origin-tagged stream.
//!
//! The crate provides:
//! - **Wire codec**: pure, bit-exact encode/decode of the two frame kinds
//! - **Messenger**: per-connection FIFO send loop, framed receive loop, and
//!   a cooperative disconnect handshake
//! - **MessageHub**: connection registry, unicast/broadcast routing, and
//!   peer lifecycle events
//! - **Stream combinators**: dynamic fan-in ([`MergeStream`]) and
//!   subscriber fan-out ([`Fanout`])
//! - **Provider seam**: trait abstractions over network, time, tasks, and
//!   randomness with Tokio-backed production implementations
//!
//! Everything runs single-threaded async: tasks are spawned locally, so
//! hosts drive the hub inside a `tokio::task::LocalSet`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Error types for the hub surface.
pub mod error;

/// Message hub: registry and router for many connections.
pub mod hub;

mod macros;

/// Message model: outbound trait, inbound type registry, origin tagging.
pub mod message;

/// Connection messenger: the protocol state machine for one connection.
pub mod messenger;

/// Peer identity types.
pub mod peer;

/// Runtime capability seam with Tokio production implementations.
pub mod provider;

/// Channel combinators: dynamic fan-in and subscriber fan-out.
pub mod stream;

/// Wire protocol for framed message exchange.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{HubError, HubResult};
pub use hub::MessageHub;
pub use message::{Inbound, MessageRegistry, WireMessage};
pub use messenger::{Messenger, MessengerConfig, MessengerError, MessengerResult};
pub use peer::{Disconnection, Peer, PeerId};
pub use provider::{
    NetworkProvider, Providers, RandomProvider, TaskProvider, TcpListenerTrait, TimeError,
    TimeProvider, TokioNetworkProvider, TokioProviders, TokioRandomProvider, TokioTaskProvider,
    TokioTcpListener, TokioTimeProvider,
};
pub use stream::{Fanout, MergeStream};
pub use wire::{DisconnectReason, Frame, MessageHeader, WireError};
