//! Gateway core
//!
//! Wires the authorization, ingestion and republish components together and
//! exposes the per-connection event interface the transport collaborator
//! drives. One `ClientConnection` exists per socket; the `Gateway` holds
//! everything shared between them.

mod connection;
mod pipeline;
mod router;

pub use connection::ClientConnection;
pub use pipeline::{PipelineError, PublishOutcome};
pub use router::RepublishRouter;

use std::sync::Arc;

use tracing::info;

use crate::auth::CredentialAuthorizer;
use crate::channel::ChannelResolver;
use crate::extract::{PayloadExtractor, DEFAULT_PATTERN};
use crate::metrics::Metrics;
use crate::registry::ConnectionRegistry;
use crate::store::{ChannelId, OrganizationId, TelemetryStore};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Organization every accepted connection publishes under
    pub organization_id: OrganizationId,
    /// Publishes with larger payloads are dropped before the pipeline
    pub max_payload_bytes: usize,
    /// Extraction pattern for channels with none configured
    pub default_pattern: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            organization_id: 0,
            max_payload_bytes: 256 * 1024,
            default_pattern: DEFAULT_PATTERN.to_string(),
        }
    }
}

/// Shared state behind every client connection
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ConnectionRegistry>,
    authorizer: CredentialAuthorizer,
    resolver: ChannelResolver,
    extractor: PayloadExtractor,
    store: Arc<dyn TelemetryStore>,
    router: RepublishRouter,
    metrics: Arc<Metrics>,
}

impl Gateway {
    /// Create a gateway with its own metrics registry
    pub fn new(config: GatewayConfig, store: Arc<dyn TelemetryStore>) -> Self {
        Self::with_metrics(config, store, Arc::new(Metrics::new()))
    }

    /// Create a gateway recording into shared metrics
    pub fn with_metrics(
        config: GatewayConfig,
        store: Arc<dyn TelemetryStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            authorizer: CredentialAuthorizer::new(store.clone(), metrics.clone()),
            resolver: ChannelResolver::new(store.clone()),
            extractor: PayloadExtractor::with_default_pattern(&config.default_pattern),
            router: RepublishRouter::new(registry.clone(), metrics.clone()),
            config,
            registry,
            store,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Currently registered sessions
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Drop the cached extraction pattern for a channel (administrative
    /// invalidation hook)
    pub fn invalidate_pattern(&self, channel_id: ChannelId) {
        self.extractor.invalidate(channel_id);
    }

    /// Tear down every registered session.
    ///
    /// Dropping the sessions closes their action channels; transports
    /// observe the closed channel and end their streams.
    pub fn shutdown(&self) {
        let sessions = self.registry.drain();
        self.metrics.connections_current.set(0);
        info!(sessions = sessions.len(), "gateway shut down");
    }
}
