//! CONNECT handling

use std::sync::Arc;

use tracing::{error, info, warn};

use super::{ClientConnection, ConnState};
use crate::protocol::{Action, ConnectEvent, CONNECT_ACCEPTED, CONNECT_BAD_CREDENTIALS};
use crate::registry::ClientSession;

impl ClientConnection {
    pub(crate) async fn handle_connect(&mut self, connect: ConnectEvent) {
        // A CONNECT missing any identity field is denied without touching
        // the store
        let (Some(client_id), Some(username), Some(password)) = (
            connect.client_id.filter(|s| !s.is_empty()),
            connect.username.filter(|s| !s.is_empty()),
            connect.password.filter(|s| !s.is_empty()),
        ) else {
            warn!("CONNECT missing client id, username or password");
            self.gateway.metrics.connections_denied.inc();
            self.send(Action::ConnAck {
                return_code: CONNECT_BAD_CREDENTIALS,
            });
            return;
        };

        let outcome = match self
            .gateway
            .authorizer
            .authorize(&client_id, &username, &password)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(client_id, error = %e, "authorization check failed");
                self.gateway.metrics.connections_denied.inc();
                self.send(Action::ConnAck {
                    return_code: CONNECT_BAD_CREDENTIALS,
                });
                return;
            }
        };

        if !outcome.granted {
            warn!(client_id, username, "connect with bad credentials");
            self.gateway.metrics.connections_denied.inc();
            self.send(Action::ConnAck {
                return_code: CONNECT_BAD_CREDENTIALS,
            });
            return;
        }

        let session = Arc::new(ClientSession::new(
            client_id.as_str().into(),
            username,
            outcome.device_ids,
            self.gateway.config.organization_id,
            self.outbound.clone(),
        ));

        if let Some(displaced) = self.gateway.registry.insert(session.clone()) {
            // The older connection keeps its socket until the transport
            // notices; it no longer owns the registry slot
            warn!(
                client_id,
                devices = ?displaced.device_ids(),
                "session takeover, replacing existing registration"
            );
        } else {
            self.gateway.metrics.connections_current.inc();
        }

        self.state = ConnState::Authorized(session);
        self.gateway.metrics.connections_accepted.inc();
        self.send(Action::ConnAck {
            return_code: CONNECT_ACCEPTED,
        });
        info!(client_id, "connect authorized");
    }
}
