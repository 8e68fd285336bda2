//! Task spawning abstraction for the single-threaded runtime.

use async_trait::async_trait;
use std::future::Future;

/// Provider for spawning named local tasks.
///
/// Everything this crate spawns (connection loops, merge forwarders, the
/// hub's accept loop) goes through this trait, which keeps the futures
/// `?Send` and the execution on the current thread.
#[async_trait(?Send)]
pub trait TaskProvider: Clone {
    /// Spawn a named task on the current thread.
    ///
    /// The name only feeds tracing; it carries no identity.
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;
}

/// Production task provider over `tokio::task::spawn_local`.
///
/// Callers must be running inside a `tokio::task::LocalSet`; spawning
/// outside one panics, which is Tokio's contract for local tasks.
#[derive(Clone, Debug, Default)]
pub struct TokioTaskProvider;

impl TokioTaskProvider {
    /// Create a Tokio-backed task provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        let task_name = name.to_string();
        tokio::task::spawn_local(async move {
            tracing::trace!(task = %task_name, "task starting");
            future.await;
            tracing::trace!(task = %task_name, "task finished");
        })
    }
}
