//! Per-connection event handling
//!
//! One `ClientConnection` per transport connection. The transport
//! collaborator decodes packets into `SessionEvent`s, calls `handle_event`,
//! and writes out whatever arrives on the action channel. All failures are
//! resolved locally into protocol actions or logged drops; nothing here
//! takes the process down.

mod connect;
mod publish;
mod subscribe;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Gateway;
use crate::protocol::{Action, SessionEvent};
use crate::registry::ClientSession;

/// Authorization state of a connection
enum ConnState {
    /// CONNECT not yet accepted; data events are dropped
    Unauthorized,
    /// Session registered and publishing
    Authorized(Arc<ClientSession>),
}

/// The gateway's side of one transport connection
pub struct ClientConnection {
    gateway: Arc<Gateway>,
    outbound: mpsc::UnboundedSender<Action>,
    state: ConnState,
}

impl ClientConnection {
    /// `outbound` is the action channel the transport drains to the socket.
    pub fn new(gateway: Arc<Gateway>, outbound: mpsc::UnboundedSender<Action>) -> Self {
        Self {
            gateway,
            outbound,
            state: ConnState::Unauthorized,
        }
    }

    /// Dispatch one event from the transport.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connect(connect) => self.handle_connect(connect).await,
            SessionEvent::Subscribe(subscribe) => self.handle_subscribe(subscribe),
            SessionEvent::Publish(publish) => self.handle_publish(publish).await,
            SessionEvent::PingReq => self.handle_pingreq(),
            SessionEvent::Disconnect => self.handle_disconnect(),
            SessionEvent::Close => self.handle_close(),
            SessionEvent::Error { message } => self.handle_error(&message),
        }
    }

    /// The registered session, if this connection is authorized
    pub fn session(&self) -> Option<&Arc<ClientSession>> {
        match &self.state {
            ConnState::Authorized(session) => Some(session),
            ConnState::Unauthorized => None,
        }
    }

    fn handle_pingreq(&self) {
        self.send(Action::PingResp);
    }

    fn handle_disconnect(&self) {
        // The transport ends the stream; registry cleanup happens on Close
        if let ConnState::Authorized(session) = &self.state {
            debug!(client_id = %session.client_id(), "client disconnected");
        }
    }

    fn handle_close(&mut self) {
        if let ConnState::Authorized(session) =
            std::mem::replace(&mut self.state, ConnState::Unauthorized)
        {
            if self.gateway.registry.remove_session(&session) {
                self.gateway.metrics.connections_current.dec();
                info!(client_id = %session.client_id(), "session closed");
            }
        }
    }

    fn handle_error(&mut self, message: &str) {
        warn!(error = message, "transport error, closing session");
        self.handle_close();
    }

    /// Best-effort write to the owning transport
    fn send(&self, action: Action) {
        let _ = self.outbound.send(action);
    }
}
