//! Error types for the hub surface.

use std::io;
use thiserror::Error;

use crate::peer::PeerId;

/// Errors surfaced by [`MessageHub`](crate::MessageHub) operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// The addressed peer is not in the registry: it disconnected already
    /// or never existed.
    #[error("unknown peer: {peer_id}")]
    UnknownPeer {
        /// The identifier that failed to resolve.
        peer_id: PeerId,
    },

    /// The hub is already accepting connections.
    #[error("hub is already listening")]
    AlreadyListening,

    /// Binding the listen address failed.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The address that could not be bound.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;
