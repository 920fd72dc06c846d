//! Channel and variable resolution
//!
//! Maps an authorized client's published topic onto the unique channel and
//! the variable currently bound to it. Resolution runs against the store on
//! every publish; bindings are administrative data and may change between
//! messages.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::{ChannelBinding, OrganizationId, StoreError, TelemetryStore};


/// Errors aborting channel resolution
#[derive(Debug)]
pub enum ResolveError {
    /// No channel/variable row authorizes this client for the topic
    NotAuthorized { topic: String },
    /// The join produced several rows; channel binding must be unambiguous
    Ambiguous { topic: String, matches: usize },
    /// The directory read failed
    Store(StoreError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthorized { topic } => {
                write!(f, "client not authorized for channel {}", topic)
            }
            Self::Ambiguous { topic, matches } => {
                write!(f, "channel {} resolves to {} bindings", topic, matches)
            }
            Self::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Resolves published topics to channel/variable bindings
pub struct ChannelResolver {
    store: Arc<dyn TelemetryStore>,
}

impl ChannelResolver {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Resolve the unique (channel, variable) pair for a published topic.
    ///
    /// Exactly one joined row succeeds. Zero rows is an authorization
    /// failure; several rows is a hard ambiguity. Unlike device
    /// authorization, shared bindings are not tolerated here.
    pub async fn resolve(
        &self,
        client_id: &str,
        organization_id: OrganizationId,
        topic: &str,
    ) -> Result<ChannelBinding, ResolveError> {
        let mut rows = self
            .store
            .channel_bindings(client_id, organization_id, topic)
            .await?;

        match rows.len() {
            0 => {
                debug!(client_id, topic, "no channel binding matched");
                Err(ResolveError::NotAuthorized {
                    topic: topic.to_string(),
                })
            }
            1 => Ok(rows.remove(0)),
            matches => {
                warn!(client_id, topic, matches, "ambiguous channel binding");
                Err(ResolveError::Ambiguous {
                    topic: topic.to_string(),
                    matches,
                })
            }
        }
    }
}
