//! Runtime capability seam.
//!
//! The messenger and hub never touch sockets, clocks, task spawning, or
//! randomness directly; they go through the provider traits in this module.
//! Production code uses the Tokio-backed implementations; tests can
//! substitute their own (for example, driving a messenger over an in-memory
//! stream needs no network provider at all).
//!
//! The whole crate is single-threaded async: provider traits carry no `Send`
//! bounds, and [`TaskProvider`] spawns onto the current thread. Callers run
//! inside a `tokio::task::LocalSet` (or an equivalent local executor).
//!
//! [`Providers`] bundles the four capabilities into one type parameter so
//! downstream types take `P: Providers` instead of four generics.

mod bundle;
mod network;
mod random;
mod task;
mod time;

pub use bundle::{Providers, TokioProviders};
pub use network::{NetworkProvider, TcpListenerTrait, TokioNetworkProvider, TokioTcpListener};
pub use random::{RandomProvider, TokioRandomProvider};
pub use task::{TaskProvider, TokioTaskProvider};
pub use time::{TimeError, TimeProvider, TokioTimeProvider};
