//! Publish pipeline
//!
//! Orchestrates resolve → extract → persist → republish for one inbound
//! publish. States advance `Built → ChannelResolved → PayloadExtracted →
//! Stored → Republished`; any stage can abort the pipeline, after which no
//! further side effects happen. Stages never retry. Each pipeline instance
//! owns its working state; only the registry is shared, and only the router
//! reads it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use super::Gateway;
use crate::channel::ResolveError;
use crate::extract::ExtractionError;
use crate::registry::ClientSession;
use crate::store::{NewReading, ReadingId, StoreError};

/// Pipeline stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Built,
    ChannelResolved,
    PayloadExtracted,
    Stored,
    Republished,
}

/// A pipeline abort, tagged with the failing stage
#[derive(Debug)]
pub enum PipelineError {
    /// No unambiguous channel binding authorizes this publish
    NotAuthorized { topic: String },
    /// Several channel bindings matched; binding must be unambiguous
    Ambiguous { topic: String, matches: usize },
    /// The payload did not yield a (timestamp, value) pair
    Extraction(ExtractionError),
    /// Persisting the reading failed
    Store(StoreError),
}

impl PipelineError {
    /// Metrics label of the failing stage
    pub fn stage_label(&self) -> &'static str {
        match self {
            Self::NotAuthorized { .. } | Self::Ambiguous { .. } => "resolve",
            Self::Extraction(_) => "extract",
            Self::Store(_) => "store",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthorized { topic } => {
                write!(f, "not authorized for channel {}", topic)
            }
            Self::Ambiguous { topic, matches } => {
                write!(f, "channel {} resolves to {} bindings", topic, matches)
            }
            Self::Extraction(e) => write!(f, "extraction failed: {}", e),
            Self::Store(e) => write!(f, "store failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Extraction(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ResolveError> for PipelineError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotAuthorized { topic } => Self::NotAuthorized { topic },
            ResolveError::Ambiguous { topic, matches } => Self::Ambiguous { topic, matches },
            ResolveError::Store(e) => Self::Store(e),
        }
    }
}

/// What a completed pipeline produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Generated reading id, None when persistence is disabled
    pub reading_id: Option<ReadingId>,
    /// Sessions the payload was republished to
    pub delivered: usize,
}

/// One in-flight publish
pub(crate) struct PublishPipeline<'g> {
    gateway: &'g Gateway,
    session: Arc<ClientSession>,
    stage: Stage,
}

impl<'g> PublishPipeline<'g> {
    pub(crate) fn new(gateway: &'g Gateway, session: Arc<ClientSession>) -> Self {
        Self {
            gateway,
            session,
            stage: Stage::Built,
        }
    }

    /// Run the pipeline to a terminal state.
    pub(crate) async fn run(
        mut self,
        topic: &str,
        payload: Bytes,
    ) -> Result<PublishOutcome, PipelineError> {
        let client_id = self.session.client_id().clone();
        let organization_id = self.session.organization_id();

        let binding = self
            .gateway
            .resolver
            .resolve(&client_id, organization_id, topic)
            .await?;
        self.advance(Stage::ChannelResolved);

        let extracted = self
            .gateway
            .extractor
            .extract(binding.channel_id, binding.payload_pattern.as_deref(), &payload)
            .map_err(|e| {
                // Keep the raw payload in the log for diagnosis; the message
                // itself is dropped
                warn!(
                    client_id = %client_id,
                    topic,
                    variable = %binding.variable_name,
                    payload = %String::from_utf8_lossy(&payload),
                    "payload did not match extraction pattern"
                );
                PipelineError::Extraction(e)
            })?;
        self.advance(Stage::PayloadExtracted);

        let reading_id = if binding.store_readings {
            let reading = NewReading {
                organization_id,
                measured_at: extracted.timestamp,
                variable_id: binding.variable_id,
                channel_id: binding.channel_id,
                value: extracted.value,
            };
            let id = self
                .gateway
                .store
                .insert_reading(&reading)
                .await
                .map_err(PipelineError::Store)?;
            self.gateway.metrics.readings_stored.inc();
            self.advance(Stage::Stored);
            debug!(
                client_id = %client_id,
                variable = %binding.variable_name,
                reading_id = id,
                timestamp = extracted.timestamp,
                value = extracted.value,
                "reading stored"
            );
            Some(id)
        } else {
            debug!(
                client_id = %client_id,
                variable = %binding.variable_name,
                "persistence disabled for variable, skipping store"
            );
            None
        };

        // Republish the original payload, not the extracted pair
        let delivered = match binding.republish_topic.as_deref().filter(|t| !t.is_empty()) {
            Some(republish_topic) => {
                self.gateway.router.route(republish_topic, &payload)
            }
            None => {
                info!(
                    client_id = %client_id,
                    variable = %binding.variable_name,
                    "no republish topic set"
                );
                self.gateway.metrics.republish_skipped.inc();
                0
            }
        };
        self.advance(Stage::Republished);

        Ok(PublishOutcome {
            reading_id,
            delivered,
        })
    }

    fn advance(&mut self, stage: Stage) {
        trace!(from = ?self.stage, to = ?stage, "pipeline stage");
        self.stage = stage;
    }
}
