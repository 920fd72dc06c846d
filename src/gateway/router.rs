//! Republish fan-out
//!
//! Scans a registry snapshot and delivers the payload to every session with
//! at least one predicate matching the republish topic. At most one
//! delivery per session, however many of its predicates match. Deliveries
//! to sessions concurrently disconnecting are silently lost; that is the
//! accepted best-effort semantic, not an error.

use std::sync::Arc;

use bytes::Bytes;
use smallvec::SmallVec;
use tracing::debug;

use crate::metrics::Metrics;
use crate::protocol::Action;
use crate::registry::{ClientSession, ConnectionRegistry};

/// Fans republished payloads out to matching sessions
pub struct RepublishRouter {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
}

impl RepublishRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    /// Deliver `payload` under `topic` to every matching session.
    ///
    /// Returns the number of sessions that accepted the delivery.
    pub fn route(&self, topic: &str, payload: &Bytes) -> usize {
        // Most republish topics have few subscribers
        let mut matched: SmallVec<[Arc<ClientSession>; 16]> = SmallVec::new();
        for session in self.registry.snapshot() {
            if session.matches_subscription(topic) {
                matched.push(session);
            }
        }

        let mut delivered = 0;
        for session in matched {
            let accepted = session.deliver(Action::Publish {
                topic: topic.to_string(),
                payload: payload.clone(),
            });
            if accepted {
                self.metrics.republish_deliveries.inc();
                delivered += 1;
            }
        }

        debug!(topic, delivered, "republish fan-out");
        delivered
    }
}
