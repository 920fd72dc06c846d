//! Device credential authorization
//!
//! Validates a connecting client's identity against the `device_auth`
//! directory. The authorizer only decides; registering the session is the
//! connect handler's job.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::metrics::Metrics;
use crate::store::{DeviceId, StoreError, TelemetryStore};


/// Outcome of a credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Whether the connection is accepted
    pub granted: bool,
    /// Devices the credential triple resolved to
    pub device_ids: Vec<DeviceId>,
}

/// Checks credential triples against enabled `device_auth` rows
pub struct CredentialAuthorizer {
    store: Arc<dyn TelemetryStore>,
    metrics: Arc<Metrics>,
}

impl CredentialAuthorizer {
    pub fn new(store: Arc<dyn TelemetryStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Validate a credential triple.
    ///
    /// Zero matching rows denies. One row grants. Several rows still grant:
    /// devices sharing one credential triple are tolerated, but logged and
    /// counted as an anomaly.
    pub async fn authorize(
        &self,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome, StoreError> {
        let device_ids = self
            .store
            .device_credentials(client_id, username, password)
            .await?;

        if device_ids.is_empty() {
            debug!(client_id, username, "no enabled credential row matched");
            return Ok(AuthOutcome {
                granted: false,
                device_ids,
            });
        }

        if device_ids.len() > 1 {
            warn!(
                client_id,
                devices = ?device_ids,
                "credential triple matches multiple devices"
            );
            self.metrics.auth_multi_device.inc();
        }

        Ok(AuthOutcome {
            granted: true,
            device_ids,
        })
    }
}
