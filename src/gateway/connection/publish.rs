//! PUBLISH handling

use tracing::{debug, warn};

use super::super::pipeline::PublishPipeline;
use super::{ClientConnection, ConnState};
use crate::protocol::PublishEvent;

impl ClientConnection {
    pub(crate) async fn handle_publish(&mut self, publish: PublishEvent) {
        let ConnState::Authorized(session) = &self.state else {
            // No such thing as a negative PUBACK
            warn!(topic = %publish.topic, "unauthorized publish dropped");
            return;
        };

        if publish.payload.len() > self.gateway.config.max_payload_bytes {
            warn!(
                client_id = %session.client_id(),
                topic = %publish.topic,
                bytes = publish.payload.len(),
                "oversized payload dropped"
            );
            return;
        }

        self.gateway.metrics.publishes_received.inc();
        debug!(
            client_id = %session.client_id(),
            topic = %publish.topic,
            bytes = publish.payload.len(),
            "publish received"
        );

        let pipeline = PublishPipeline::new(&self.gateway, session.clone());
        match pipeline.run(&publish.topic, publish.payload).await {
            Ok(outcome) => {
                debug!(
                    client_id = %session.client_id(),
                    topic = %publish.topic,
                    reading_id = ?outcome.reading_id,
                    delivered = outcome.delivered,
                    "publish processed"
                );
            }
            Err(abort) => {
                self.gateway
                    .metrics
                    .pipeline_aborts
                    .with_label_values(&[abort.stage_label()])
                    .inc();
                warn!(
                    client_id = %session.client_id(),
                    topic = %publish.topic,
                    error = %abort,
                    "publish pipeline aborted"
                );
            }
        }
    }
}
