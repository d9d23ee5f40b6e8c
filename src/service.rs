use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{run_api, ApiState};
use crate::config::ServiceConfig;
use crate::hardware::HardwareMatcher;
use crate::queue::{ConfigQueue, ConfigStore, MemoryConfigStore, StaleReaper};
use crate::recommend::{MemoryResultStore, Recommender, ResultStore};

/// Wires the stores, the queue, the stale reaper and the HTTP API together.
pub struct CatalogService {
    config: ServiceConfig,
    queue: ConfigQueue,
    results: Arc<dyn ResultStore>,
    recommender: Arc<Recommender>,
}

impl CatalogService {
    /// Service backed by in-memory stores.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MemoryResultStore::new()),
        )
    }

    pub fn with_stores(
        config: ServiceConfig,
        configs: Arc<dyn ConfigStore>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        let queue = ConfigQueue::new(configs).with_max_retries(config.queue.max_retries);
        let recommender = Arc::new(Recommender::new(
            results.clone(),
            HardwareMatcher::new(config.catalog.clone()),
            config.recommend.clone(),
        ));

        Self {
            config,
            queue,
            results,
            recommender,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn queue(&self) -> &ConfigQueue {
        &self.queue
    }

    pub fn api_state(&self) -> ApiState {
        ApiState::new(
            self.queue.clone(),
            self.results.clone(),
            self.recommender.clone(),
            self.config.queue.clone(),
        )
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// The reaper runs as a spawned task; the API server runs on the current
    /// task. Both stop on the same token.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let reaper = StaleReaper::new(
            self.queue.clone(),
            self.config.queue.reaper_interval(),
            self.config.queue.stale_timeout(),
        );
        let reaper_token = shutdown.clone();
        let reaper_handle = tokio::spawn(async move { reaper.run(reaper_token).await });

        tracing::info!(
            listen_addr = %self.config.listen_addr,
            stale_timeout_minutes = self.config.queue.stale_timeout_minutes,
            max_retries = ?self.config.queue.max_retries,
            gpu_types = self.config.catalog.gpus.len(),
            "Starting catalog service"
        );

        let result = run_api(self.config.listen_addr, self.api_state(), shutdown.clone()).await;

        // Make sure the reaper stops even when the server exited on its own.
        shutdown.cancel();
        if let Err(e) = reaper_handle.await {
            tracing::warn!(error = %e, "Stale reaper task ended abnormally");
        }
        result
    }
}
