//! Routing and placement core of an ML-inference serving cluster.
//!
//! A fleet of stateless workers each holds a bounded number of models in
//! memory. This gateway forwards every prediction to a worker that has the
//! target model resident, triggering a load on the least-loaded worker when
//! none does, and keeps its Redis-backed placement registry consistent with
//! worker truth as the fleet churns.

pub mod config;
pub mod error;
pub mod logging;
pub mod placement;
pub mod registry;
pub mod routes;
pub mod worker;

pub use config::Config;
pub use error::GatewayError;
pub use placement::{PlacementCache, Placer, PlacerError, Reconciler};
pub use registry::{MemoryStore, RedisStore, RegistryError, RegistryStore};
pub use worker::{
    HealthMonitor, ModelKey, Worker, WorkerAddr, WorkerClient, WorkerClientError,
};

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// Shared application state: the root value owning every collaborator.
pub struct Gateway {
    pub config: Config,
    pub monitor: Arc<HealthMonitor>,
    pub placer: Arc<Placer>,
    /// Client used to proxy buffered requests through to workers.
    pub http: reqwest::Client,
    /// Cursor for the round-robin fallback route.
    pub round_robin: AtomicUsize,
}

impl Gateway {
    pub fn new(config: Config, monitor: Arc<HealthMonitor>, placer: Arc<Placer>) -> Self {
        Self {
            config,
            monitor,
            placer,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(300)) // generous bound for long predictions
                .build()
                .expect("Failed to create HTTP client"),
            round_robin: AtomicUsize::new(0),
        }
    }
}
