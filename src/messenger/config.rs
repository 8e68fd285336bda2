//! Configuration for messenger behavior.

use std::time::Duration;

use crate::wire;

/// Configuration for one connection messenger.
///
/// The hub keeps one of these and hands a copy to every messenger it
/// constructs; host code tuning a single messenger builds its own.
#[derive(Clone, Debug)]
pub struct MessengerConfig {
    /// Maximum time [`disconnect`](crate::Messenger::disconnect) waits for
    /// its frame to be flushed before giving up. The messenger is stopped
    /// either way, so the handshake can never hang.
    pub disconnect_timeout: Duration,

    /// Maximum consecutive receive failures before the connection is torn
    /// down as [`Unexpected`](crate::DisconnectReason::Unexpected). Any
    /// successfully processed frame resets the budget. Stream EOF never
    /// counts as a failure; it ends the connection directly.
    pub max_receive_restarts: u32,

    /// Maximum accepted size for an inbound frame's type-name or body
    /// field. Never larger than [`wire::MAX_PAYLOAD_SIZE`], which bounds
    /// what the codec will decode at all.
    pub max_frame_size: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            disconnect_timeout: Duration::from_secs(5),
            max_receive_restarts: 3,
            max_frame_size: wire::MAX_PAYLOAD_SIZE,
        }
    }
}

impl MessengerConfig {
    /// Set the disconnect handshake timeout.
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Set the consecutive receive-failure budget.
    pub fn with_max_receive_restarts(mut self, restarts: u32) -> Self {
        self.max_receive_restarts = restarts;
        self
    }

    /// Set the inbound frame size limit. Values above
    /// [`wire::MAX_PAYLOAD_SIZE`] are clamped to it.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.min(wire::MAX_PAYLOAD_SIZE);
        self
    }
}
