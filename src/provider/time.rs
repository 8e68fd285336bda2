//! Time abstraction: sleep, elapsed time, timeouts.
//!
//! The messenger bounds its disconnect handshake with
//! [`TimeProvider::timeout`], and the hub pauses briefly after accept
//! failures. Keeping the clock behind a trait means none of that logic
//! depends on `tokio::time` directly.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from time operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The awaited operation did not finish within the timeout.
    #[error("operation timed out")]
    Elapsed,

    /// The time provider is shutting down and cannot serve the request.
    #[error("time provider shut down")]
    Shutdown,
}

/// Provider of sleep, elapsed-time, and timeout operations.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration) -> Result<(), TimeError>;

    /// Elapsed time since the provider was created. Monotonic; useful for
    /// relative measurements, not wall-clock timestamps.
    fn now(&self) -> Duration;

    /// Run a future with a timeout. Returns `Ok(output)` if it completes in
    /// time, `Err(TimeError::Elapsed)` otherwise.
    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, TimeError>
    where
        F: std::future::Future<Output = T>;
}

/// Production clock over `tokio::time`.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    start: std::time::Instant,
}

impl TokioTimeProvider {
    /// Create a Tokio-backed time provider anchored at the current instant.
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) -> Result<(), TimeError> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, TimeError>
    where
        F: std::future::Future<Output = T>,
    {
        match tokio::time::timeout(duration, future).await {
            Ok(output) => Ok(output),
            Err(_) => Err(TimeError::Elapsed),
        }
    }
}
