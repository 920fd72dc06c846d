//! SUBSCRIBE handling

use tracing::{debug, warn};

use super::{ClientConnection, ConnState};
use crate::protocol::{Action, SubscribeEvent, SUBACK_FAILURE};
use crate::topic::TopicFilter;

impl ClientConnection {
    pub(crate) fn handle_subscribe(&mut self, subscribe: SubscribeEvent) {
        let ConnState::Authorized(session) = &self.state else {
            // MQTT 3.1 defines no way to say a subscribe was denied
            debug!("subscribe before authorization ignored");
            return;
        };

        let mut granted = Vec::with_capacity(subscribe.subscriptions.len());
        for request in &subscribe.subscriptions {
            match TopicFilter::compile(&request.topic) {
                Ok(filter) => {
                    session.subscribe(filter);
                    granted.push(request.qos);
                    debug!(
                        client_id = %session.client_id(),
                        topic = %request.topic,
                        "subscription added"
                    );
                }
                Err(e) => {
                    warn!(
                        client_id = %session.client_id(),
                        topic = %request.topic,
                        error = %e,
                        "rejecting malformed subscription filter"
                    );
                    granted.push(SUBACK_FAILURE);
                }
            }
        }

        self.send(Action::SubAck {
            message_id: subscribe.message_id,
            granted,
        });
    }
}
