//! Message hub: registry and router for many connections.
//!
//! The [`MessageHub`] accepts transport connections, assigns each a durable
//! [`PeerId`](crate::PeerId), and wraps it in its own
//! [`Messenger`](crate::Messenger). Inbound messages from every connection
//! converge on one merged stream, tagged with their origin; outbound
//! messages fan out by unicast ([`send_to`](MessageHub::send_to)) or
//! broadcast ([`send_to_all`](MessageHub::send_to_all)).
//!
//! ```text
//!                    ┌────────────────── MessageHub ─────────────────┐
//!   accept ──▶ PeerId + Messenger ──▶ registry ◀── send_to / send_to_all
//!                    │                                               │
//!                    │  Messages ──▶ merge (tag origin) ──▶ take_messages
//!                    │  Disconnected ──▶ watcher ──▶ unregister + event
//!                    └───────────────────────────────────────────────┘
//! ```

mod core;
mod registry;

pub use core::MessageHub;
