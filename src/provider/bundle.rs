//! Provider bundle: four capabilities, one type parameter.
//!
//! Without bundling, every type in the crate would carry four generics plus
//! their where clauses. With it, `Messenger<M, S, P>` and `MessageHub<M, P>`
//! take a single `P: Providers` and pull the pieces out through associated
//! types.

use super::{
    NetworkProvider, RandomProvider, TaskProvider, TimeProvider, TokioNetworkProvider,
    TokioRandomProvider, TokioTaskProvider, TokioTimeProvider,
};

/// Bundle of the four runtime capabilities.
///
/// Associated types keep everything statically dispatched; accessor methods
/// hand out borrowed provider instances.
pub trait Providers: Clone + 'static {
    /// Network provider for streams and listeners.
    type Network: NetworkProvider + Clone + 'static;

    /// Time provider for sleep and timeouts.
    type Time: TimeProvider + Clone + 'static;

    /// Task provider for spawning local tasks.
    type Task: TaskProvider + Clone + 'static;

    /// Random provider for id generation.
    type Random: RandomProvider + Clone + 'static;

    /// The network provider instance.
    fn network(&self) -> &Self::Network;

    /// The time provider instance.
    fn time(&self) -> &Self::Time;

    /// The task provider instance.
    fn task(&self) -> &Self::Task;

    /// The random provider instance.
    fn random(&self) -> &Self::Random;
}

/// Production bundle over the Tokio-backed providers.
#[derive(Clone, Debug, Default)]
pub struct TokioProviders {
    network: TokioNetworkProvider,
    time: TokioTimeProvider,
    task: TokioTaskProvider,
    random: TokioRandomProvider,
}

impl TokioProviders {
    /// Create a production provider bundle.
    pub fn new() -> Self {
        Self {
            network: TokioNetworkProvider::new(),
            time: TokioTimeProvider::new(),
            task: TokioTaskProvider::new(),
            random: TokioRandomProvider::new(),
        }
    }
}

impl Providers for TokioProviders {
    type Network = TokioNetworkProvider;
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;
    type Random = TokioRandomProvider;

    fn network(&self) -> &Self::Network {
        &self.network
    }

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}
