//! Subscriber-list fan-out channel.

use std::cell::RefCell;
use tokio::sync::mpsc;

/// Fan-out of clonable items to a dynamic list of subscribers.
///
/// Each subscriber gets its own unbounded receiver; publishing clones the
/// item once per live subscriber and prunes subscribers whose receiver was
/// dropped. Closing drops every sender, which ends each subscriber's stream
/// without an error; a fanout stays closed, and subscriptions taken after
/// closing yield an already-ended stream.
///
/// Items published before `close` are still delivered: they sit in the
/// subscriber's channel and drain before the end-of-stream is observed.
pub struct Fanout<T> {
    inner: RefCell<FanoutInner<T>>,
}

struct FanoutInner<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    closed: bool,
}

impl<T> Fanout<T> {
    /// Create an open fanout with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(FanoutInner {
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Attach a new subscriber.
    ///
    /// On a closed fanout the returned receiver is already at end of
    /// stream.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.borrow_mut();
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        rx
    }

    /// Publish one item to every live subscriber.
    pub fn publish(&self, item: T)
    where
        T: Clone,
    {
        self.inner
            .borrow_mut()
            .subscribers
            .retain(|tx| tx.send(item.clone()).is_ok());
    }

    /// Close the fanout: every subscriber's stream ends, and future
    /// subscriptions are ended on arrival. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        inner.subscribers.clear();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Number of attached subscribers. Dead subscribers are only pruned on
    /// publish, so this may briefly overcount.
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

impl<T> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}
