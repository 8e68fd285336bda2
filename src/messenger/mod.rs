//! Connection messenger: the protocol state machine for one connection.
//!
//! A [`Messenger`] owns one established byte stream and runs two
//! independent background loops while executing:
//!
//! - the **send loop** drains a FIFO outbound queue, writing and flushing
//!   one encoded frame at a time, so wire order always matches submission
//!   order;
//! - the **receive loop** performs exact-size frame reads, resolves payload
//!   type names against the host's [`MessageRegistry`], and publishes
//!   decoded payloads to subscribers.
//!
//! ```text
//!            send(msg)          disconnect(reason)
//!                │                      │
//!                ▼                      ▼
//!          ┌───────────────────────────────┐
//!          │        outbound queue         │  FIFO
//!          └──────────────┬────────────────┘
//!                         ▼
//!                     send loop ──▶ write + flush ──▶ transport
//!                                                        │
//!                  receive loop ◀── exact-size reads ◀───┘
//!                   │        │
//!                   ▼        ▼
//!               Messages   Disconnected(reason)
//! ```
//!
//! Ending a connection is explicit: a remote disconnect frame, a local
//! [`disconnect`](Messenger::disconnect) handshake, or synthesized as
//! [`Unexpected`](crate::DisconnectReason::Unexpected) when the stream ends
//! without one. Whatever the path, subscribers get exactly one disconnect
//! notification per executing lifetime.
//!
//! [`MessageRegistry`]: crate::MessageRegistry

mod config;
mod core;
mod error;

pub use config::MessengerConfig;
pub use core::Messenger;
pub use error::{MessengerError, MessengerResult};
