//! Keyed many-to-one stream merging.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::provider::TaskProvider;

/// Merges many source channels into one output channel, keyed so sources
/// can be detached again.
///
/// Each merged source gets a forwarder task that pumps items (optionally
/// through a mapping closure) into the shared output. [`unmerge`] aborts
/// that task, which stops forwarding without disturbing the other sources.
/// A source that ends on its own leaves the output open.
///
/// The output receiver can be taken exactly once with [`take_output`]; it
/// ends when the merge is [`close`]d or dropped.
///
/// [`unmerge`]: Self::unmerge
/// [`take_output`]: Self::take_output
/// [`close`]: Self::close
pub struct MergeStream<K, T, TP> {
    out_tx: Option<mpsc::UnboundedSender<T>>,
    out_rx: Option<mpsc::UnboundedReceiver<T>>,
    sources: HashMap<K, JoinHandle<()>>,
    tasks: TP,
}

impl<K, T, TP> MergeStream<K, T, TP> {
    /// Create an empty merge with an untaken output.
    pub fn new(tasks: TP) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        Self {
            out_tx: Some(out_tx),
            out_rx: Some(out_rx),
            sources: HashMap::new(),
            tasks,
        }
    }

    /// Take the merged output receiver.
    ///
    /// Returns `None` on every call after the first.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<T>> {
        self.out_rx.take()
    }

    /// Number of merged sources, counting sources whose forwarder already
    /// finished but was never unmerged.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.out_tx.is_none()
    }

    /// Detach every source and end the merged output. Idempotent.
    pub fn close(&mut self) {
        for (_, handle) in self.sources.drain() {
            handle.abort();
        }
        self.out_tx = None;
    }
}

impl<K, T, TP> MergeStream<K, T, TP>
where
    K: Eq + Hash,
    T: 'static,
    TP: TaskProvider,
{
    /// Merge a source whose item type already matches the output.
    pub fn merge(&mut self, key: K, source: mpsc::UnboundedReceiver<T>) {
        self.merge_with(key, source, |item| item);
    }

    /// Merge a source, mapping each item into the output type.
    ///
    /// Re-merging an existing key replaces its source: the previous
    /// forwarder is aborted first. On a closed merge this is a no-op and
    /// the source is dropped.
    pub fn merge_with<S, F>(&mut self, key: K, mut source: mpsc::UnboundedReceiver<S>, mut map: F)
    where
        S: 'static,
        F: FnMut(S) -> T + 'static,
    {
        let Some(out) = self.out_tx.clone() else {
            return;
        };
        let handle = self.tasks.spawn_task("merge-forwarder", async move {
            while let Some(item) = source.recv().await {
                if out.send(map(item)).is_err() {
                    break;
                }
            }
        });
        if let Some(previous) = self.sources.insert(key, handle) {
            previous.abort();
        }
    }

    /// Detach one source by key, aborting its forwarder.
    ///
    /// Returns whether the key was merged. Items the source sends after
    /// the abort lands never reach the output.
    pub fn unmerge(&mut self, key: &K) -> bool {
        match self.sources.remove(key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl<K, T, TP> Drop for MergeStream<K, T, TP> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokioTaskProvider;
    use std::future::Future;
    use std::time::Duration;

    fn run_local<F: Future>(future: F) -> F::Output {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        tokio::task::LocalSet::new().block_on(&runtime, future)
    }

    #[test]
    fn forwards_from_multiple_sources() {
        run_local(async {
            let mut merge = MergeStream::new(TokioTaskProvider::new());
            let mut out = merge.take_output().expect("output");

            let (a_tx, a_rx) = mpsc::unbounded_channel();
            let (b_tx, b_rx) = mpsc::unbounded_channel();
            merge.merge("a", a_rx);
            merge.merge("b", b_rx);
            assert_eq!(merge.source_count(), 2);

            a_tx.send(1u32).expect("send");
            a_tx.send(2u32).expect("send");
            b_tx.send(10u32).expect("send");

            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(out.recv().await.expect("merged item"));
            }
            let first = seen.iter().position(|&n| n == 1).expect("1 forwarded");
            let second = seen.iter().position(|&n| n == 2).expect("2 forwarded");
            assert!(first < second, "per-source order must hold");
            assert!(seen.contains(&10));
        });
    }

    #[test]
    fn maps_items_into_output_type() {
        run_local(async {
            let mut merge = MergeStream::new(TokioTaskProvider::new());
            let mut out = merge.take_output().expect("output");

            let (tx, rx) = mpsc::unbounded_channel();
            merge.merge_with("nums", rx, |n: u32| format!("n={n}"));

            tx.send(7).expect("send");
            assert_eq!(out.recv().await.as_deref(), Some("n=7"));
        });
    }

    #[test]
    fn unmerge_stops_forwarding() {
        run_local(async {
            let mut merge = MergeStream::new(TokioTaskProvider::new());
            let mut out = merge.take_output().expect("output");

            let (tx, rx) = mpsc::unbounded_channel();
            merge.merge("a", rx);
            tx.send(1u32).expect("send");
            assert_eq!(out.recv().await, Some(1));

            assert!(merge.unmerge(&"a"));
            assert!(!merge.unmerge(&"a"));
            tokio::task::yield_now().await;

            let _ = tx.send(2);
            let late = tokio::time::timeout(Duration::from_millis(50), out.recv()).await;
            assert!(late.is_err(), "unmerged source must not forward");
        });
    }

    #[test]
    fn source_completion_leaves_output_open() {
        run_local(async {
            let mut merge: MergeStream<&str, u32, _> = MergeStream::new(TokioTaskProvider::new());
            let mut out = merge.take_output().expect("output");

            let (tx, rx) = mpsc::unbounded_channel();
            merge.merge("a", rx);
            drop(tx);
            tokio::task::yield_now().await;

            let idle = tokio::time::timeout(Duration::from_millis(50), out.recv()).await;
            assert!(idle.is_err(), "output must stay open after a source ends");
        });
    }

    #[test]
    fn remerging_a_key_replaces_the_source() {
        run_local(async {
            let mut merge = MergeStream::new(TokioTaskProvider::new());
            let mut out = merge.take_output().expect("output");

            let (old_tx, old_rx) = mpsc::unbounded_channel();
            let (new_tx, new_rx) = mpsc::unbounded_channel();
            merge.merge("a", old_rx);
            merge.merge("a", new_rx);
            assert_eq!(merge.source_count(), 1);
            tokio::task::yield_now().await;

            let _ = old_tx.send(1u32);
            new_tx.send(2u32).expect("send");
            assert_eq!(out.recv().await, Some(2));

            let stale = tokio::time::timeout(Duration::from_millis(50), out.recv()).await;
            assert!(stale.is_err(), "replaced source must not forward");
        });
    }

    #[test]
    fn output_can_only_be_taken_once() {
        run_local(async {
            let mut merge: MergeStream<&str, u32, _> = MergeStream::new(TokioTaskProvider::new());
            assert!(merge.take_output().is_some());
            assert!(merge.take_output().is_none());
        });
    }

    #[test]
    fn close_ends_the_output() {
        run_local(async {
            let mut merge: MergeStream<&str, u32, _> = MergeStream::new(TokioTaskProvider::new());
            let mut out = merge.take_output().expect("output");

            let (tx, rx) = mpsc::unbounded_channel();
            merge.merge("a", rx);
            merge.close();
            assert!(merge.is_closed());
            assert_eq!(merge.source_count(), 0);

            assert_eq!(out.recv().await, None);
            drop(tx);
        });
    }

    #[test]
    fn merging_after_close_is_a_noop() {
        run_local(async {
            let mut merge: MergeStream<&str, u32, _> = MergeStream::new(TokioTaskProvider::new());
            merge.close();

            let (_tx, rx) = mpsc::unbounded_channel();
            merge.merge("a", rx);
            assert_eq!(merge.source_count(), 0);
        });
    }

    #[test]
    fn dropping_the_merge_ends_the_output() {
        run_local(async {
            let mut merge: MergeStream<&str, u32, _> = MergeStream::new(TokioTaskProvider::new());
            let mut out = merge.take_output().expect("output");
            drop(merge);
            assert_eq!(out.recv().await, None);
        });
    }
}
