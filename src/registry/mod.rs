//! Connection registry
//!
//! The one piece of state shared across all in-flight pipelines: the table
//! of currently-connected, authorized clients and their compiled
//! subscription predicates. Mutated by connect/disconnect, scanned by the
//! republish router. Sessions enter only after authorization succeeds.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::Action;
use crate::store::{DeviceId, OrganizationId};
use crate::topic::TopicFilter;

/// An authorized, currently-connected client
pub struct ClientSession {
    client_id: Arc<str>,
    username: String,
    device_ids: Vec<DeviceId>,
    organization_id: OrganizationId,
    /// Compiled predicates, in subscription order
    subscriptions: RwLock<Vec<TopicFilter>>,
    /// Handle onto the owning transport connection
    outbound: mpsc::UnboundedSender<Action>,
}

impl ClientSession {
    pub fn new(
        client_id: Arc<str>,
        username: String,
        device_ids: Vec<DeviceId>,
        organization_id: OrganizationId,
        outbound: mpsc::UnboundedSender<Action>,
    ) -> Self {
        Self {
            client_id,
            username,
            device_ids,
            organization_id,
            subscriptions: RwLock::new(Vec::new()),
            outbound,
        }
    }

    pub fn client_id(&self) -> &Arc<str> {
        &self.client_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn device_ids(&self) -> &[DeviceId] {
        &self.device_ids
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    /// Append a compiled predicate
    pub fn subscribe(&self, filter: TopicFilter) {
        self.subscriptions.write().push(filter);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Whether any of the session's predicates matches the topic
    pub fn matches_subscription(&self, topic: &str) -> bool {
        self.subscriptions.read().iter().any(|f| f.matches(topic))
    }

    /// Push an action to the owning connection.
    ///
    /// Best effort: returns false when the transport side is already gone
    /// (session concurrently disconnecting) and the action is lost.
    pub fn deliver(&self, action: Action) -> bool {
        match self.outbound.send(action) {
            Ok(()) => true,
            Err(_) => {
                trace!(client_id = %self.client_id, "delivery to closed connection dropped");
                false
            }
        }
    }
}

/// Shared table of connected sessions, keyed by client identifier
pub struct ConnectionRegistry {
    sessions: DashMap<Arc<str>, Arc<ClientSession>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a session, returning any displaced session with the same
    /// client identifier.
    pub fn insert(&self, session: Arc<ClientSession>) -> Option<Arc<ClientSession>> {
        self.sessions
            .insert(session.client_id().clone(), session)
    }

    /// Remove a session by client identifier. Idempotent.
    pub fn remove(&self, client_id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.remove(client_id).map(|(_, s)| s)
    }

    /// Remove the given session only if it still owns its slot.
    ///
    /// A session displaced by a newer connection with the same identifier
    /// must not tear down its replacement when its transport finally closes.
    pub fn remove_session(&self, session: &Arc<ClientSession>) -> bool {
        self.sessions
            .remove_if(session.client_id(), |_, current| {
                Arc::ptr_eq(current, session)
            })
            .is_some()
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.get(client_id).map(|r| r.clone())
    }

    /// Snapshot of all sessions for fan-out iteration.
    ///
    /// Decouples the scan from concurrent connect/disconnect; a session
    /// removed after the snapshot may still see a best-effort delivery.
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove every session, returning them (shutdown path).
    pub fn drain(&self) -> Vec<Arc<ClientSession>> {
        let snapshot = self.snapshot();
        self.sessions.clear();
        snapshot
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
