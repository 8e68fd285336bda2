//! Channel combinators: dynamic fan-in and subscriber fan-out.
//!
//! Two small primitives carry all multiplexing in this crate:
//!
//! - [`MergeStream`] combines a changing set of input streams into one
//!   output stream. The hub merges every connection's messages through it,
//!   tagging items with the sender as they pass.
//! - [`Fanout`] publishes clones of an item to a list of subscribers. The
//!   messenger uses it for its inbound message stream and disconnect
//!   notifications; the hub uses it for peer lifecycle events.
//!
//! ```text
//!  source A ─┐                          ┌─▶ subscriber 1
//!  source B ─┼─▶ MergeStream ─▶ output  Fanout ─▶ subscriber 2
//!  source C ─┘   (keyed, dynamic)       └─▶ subscriber 3
//! ```
//!
//! Both are built on unbounded mpsc channels; closing is expressed by
//! dropping senders, so consumers observe a normal end of stream rather
//! than an error.

mod fanout;
mod merge;

pub use fanout::Fanout;
pub use merge::MergeStream;
