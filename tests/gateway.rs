//! Integration tests for the gateway core
//!
//! Drives the per-connection event interface the way a transport
//! collaborator would and asserts on the produced actions and on what the
//! store received.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use telegate::gateway::{ClientConnection, Gateway, GatewayConfig};
use telegate::protocol::{
    Action, ConnectEvent, PublishEvent, SessionEvent, SubscribeEvent, SubscriptionRequest,
    CONNECT_ACCEPTED, CONNECT_BAD_CREDENTIALS, SUBACK_FAILURE,
};
use telegate::store::{
    ChannelBinding, ChannelRecord, DeviceCredential, DeviceId, DeviceRecord, MemoryStore,
    NewReading, OrganizationId, ReadingId, StoreError, TelemetryStore, VariableRecord,
};

/// A transport-side test client: one connection plus its action channel
struct TestClient {
    conn: ClientConnection,
    actions: mpsc::UnboundedReceiver<Action>,
}

impl TestClient {
    fn new(gateway: &Arc<Gateway>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            conn: ClientConnection::new(gateway.clone(), tx),
            actions: rx,
        }
    }

    async fn connect(&mut self, client_id: &str, username: &str, password: &str) -> u8 {
        self.conn
            .handle_event(SessionEvent::Connect(ConnectEvent {
                client_id: Some(client_id.to_string()),
                username: Some(username.to_string()),
                password: Some(password.to_string()),
            }))
            .await;
        match self.next_action() {
            Action::ConnAck { return_code } => return_code,
            other => panic!("expected CONNACK, got {:?}", other),
        }
    }

    async fn subscribe(&mut self, topics: &[&str]) -> Vec<u8> {
        self.conn
            .handle_event(SessionEvent::Subscribe(SubscribeEvent {
                message_id: 1,
                subscriptions: topics
                    .iter()
                    .map(|t| SubscriptionRequest {
                        topic: t.to_string(),
                        qos: 0,
                    })
                    .collect(),
            }))
            .await;
        match self.next_action() {
            Action::SubAck { granted, .. } => granted,
            other => panic!("expected SUBACK, got {:?}", other),
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) {
        self.conn
            .handle_event(SessionEvent::Publish(PublishEvent {
                topic: topic.to_string(),
                payload: Bytes::copy_from_slice(payload),
            }))
            .await;
    }

    async fn close(&mut self) {
        self.conn.handle_event(SessionEvent::Close).await;
    }

    fn next_action(&mut self) -> Action {
        self.actions.try_recv().expect("expected a pending action")
    }

    fn received_publishes(&mut self) -> Vec<(String, Bytes)> {
        let mut publishes = Vec::new();
        while let Ok(action) = self.actions.try_recv() {
            if let Action::Publish { topic, payload } = action {
                publishes.push((topic, payload));
            }
        }
        publishes
    }

    /// Pops one pending action if any; used for "nothing was sent" checks
    fn has_pending_actions(&mut self) -> bool {
        self.actions.try_recv().is_ok()
    }

    /// Subscribe without expecting a SUBACK (unauthorized path)
    async fn subscribe_silently(&mut self, topics: &[&str]) {
        self.conn
            .handle_event(SessionEvent::Subscribe(SubscribeEvent {
                message_id: 1,
                subscriptions: topics
                    .iter()
                    .map(|t| SubscriptionRequest {
                        topic: t.to_string(),
                        qos: 0,
                    })
                    .collect(),
            }))
            .await;
    }
}

fn add_subscriber_credential(store: &MemoryStore, client_id: &str, device_id: DeviceId) {
    store.add_credential(DeviceCredential {
        client_id: client_id.to_string(),
        username: "listener".to_string(),
        password: "listen".to_string(),
        enabled: true,
        device_id,
        organization_id: 0,
    });
}

/// dev1 owns channel `/sensor/temp` republished to `/out/temp`, persisted
fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_credential(DeviceCredential {
        client_id: "dev1".to_string(),
        username: "alice".to_string(),
        password: "secret".to_string(),
        enabled: true,
        device_id: 10,
        organization_id: 0,
    });
    store.add_device(DeviceRecord {
        device_id: 10,
        organization_id: 0,
        serial: Some("SN-0001".to_string()),
    });
    store.add_channel(ChannelRecord {
        channel_id: 100,
        organization_id: 0,
        device_id: 10,
        user_given_id: "/sensor/temp".to_string(),
        payload_pattern: None,
    });
    store.add_variable(VariableRecord {
        variable_id: 1000,
        organization_id: 0,
        current_channel_id: Some(100),
        republish_topic: Some("/out/temp".to_string()),
        store_readings: true,
        name: "temperature".to_string(),
    });
    store
}

fn make_gateway(store: Arc<dyn TelemetryStore>) -> Arc<Gateway> {
    Arc::new(Gateway::new(GatewayConfig::default(), store))
}

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn scenario_a_connect_valid_then_invalid_credentials() {
    let gateway = make_gateway(Arc::new(seeded_store()));

    let mut client = TestClient::new(&gateway);
    assert_eq!(client.connect("dev1", "alice", "secret").await, CONNECT_ACCEPTED);
    assert_eq!(gateway.connection_count(), 1);

    let mut intruder = TestClient::new(&gateway);
    assert_eq!(
        intruder.connect("dev1", "alice", "wrong").await,
        CONNECT_BAD_CREDENTIALS
    );
    // The denied connection must not displace the authorized one
    assert_eq!(gateway.connection_count(), 1);
}

/// Store wrapper counting credential lookups
struct CountingStore {
    inner: MemoryStore,
    credential_lookups: AtomicUsize,
}

#[async_trait]
impl TelemetryStore for CountingStore {
    async fn device_credentials(
        &self,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<DeviceId>, StoreError> {
        self.credential_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner
            .device_credentials(client_id, username, password)
            .await
    }

    async fn channel_bindings(
        &self,
        client_id: &str,
        organization_id: OrganizationId,
        topic: &str,
    ) -> Result<Vec<ChannelBinding>, StoreError> {
        self.inner
            .channel_bindings(client_id, organization_id, topic)
            .await
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<ReadingId, StoreError> {
        self.inner.insert_reading(reading).await
    }
}

#[tokio::test]
async fn connect_missing_fields_denied_without_store_lookup() {
    let store = Arc::new(CountingStore {
        inner: seeded_store(),
        credential_lookups: AtomicUsize::new(0),
    });
    let gateway = make_gateway(store.clone());

    for connect in [
        ConnectEvent {
            client_id: Some("dev1".to_string()),
            username: None,
            password: Some("secret".to_string()),
        },
        ConnectEvent {
            client_id: Some("dev1".to_string()),
            username: Some("alice".to_string()),
            password: None,
        },
        ConnectEvent {
            client_id: None,
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
        },
        ConnectEvent {
            client_id: Some(String::new()),
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
        },
    ] {
        let mut client = TestClient::new(&gateway);
        client
            .conn
            .handle_event(SessionEvent::Connect(connect))
            .await;
        assert_eq!(
            client.next_action(),
            Action::ConnAck {
                return_code: CONNECT_BAD_CREDENTIALS
            }
        );
    }

    assert_eq!(store.credential_lookups.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.connection_count(), 0);
}

#[tokio::test]
async fn reconnect_replaces_prior_session() {
    let gateway = make_gateway(Arc::new(seeded_store()));

    let mut first = TestClient::new(&gateway);
    assert_eq!(first.connect("dev1", "alice", "secret").await, CONNECT_ACCEPTED);
    let mut second = TestClient::new(&gateway);
    assert_eq!(second.connect("dev1", "alice", "secret").await, CONNECT_ACCEPTED);
    assert_eq!(gateway.connection_count(), 1);

    // The displaced connection's eventual close must not tear down the
    // replacement
    first.close().await;
    assert_eq!(gateway.connection_count(), 1);
}

// ============================================================================
// Subscribe
// ============================================================================

#[tokio::test]
async fn subscribe_before_connect_is_ignored() {
    let gateway = make_gateway(Arc::new(seeded_store()));
    let mut client = TestClient::new(&gateway);

    client.subscribe_silently(&["/a/b"]).await;
    assert!(!client.has_pending_actions(), "no SUBACK before authorization");
}

#[tokio::test]
async fn malformed_filter_gets_failure_code() {
    let store = seeded_store();
    add_subscriber_credential(&store, "sub1", 20);
    let gateway = make_gateway(Arc::new(store));

    let mut client = TestClient::new(&gateway);
    client.connect("sub1", "listener", "listen").await;
    let granted = client.subscribe(&["/ok/+", "/bad/#/tail"]).await;
    assert_eq!(granted, vec![0, SUBACK_FAILURE]);
}

// ============================================================================
// Publish pipeline
// ============================================================================

#[tokio::test]
async fn round_trip_persists_and_republishes() {
    let store = Arc::new(seeded_store());
    add_subscriber_credential(&store, "sub1", 20);
    let gateway = make_gateway(store.clone());

    let mut subscriber = TestClient::new(&gateway);
    subscriber.connect("sub1", "listener", "listen").await;
    subscriber.subscribe(&["/out/#"]).await;

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/temp", b"[1630000000,21.5,\"C\"]").await;

    // Scenario C: default pattern extracts (1630000000, 21.5)
    let readings = store.readings();
    let values = store.values();
    assert_eq!(readings.len(), 1);
    assert_eq!(values.len(), 1);
    assert_eq!(readings[0].measured_at, 1_630_000_000);
    assert_eq!(values[0].value, 21.5);
    assert_eq!(values[0].reading_id, readings[0].reading_id);
    assert_eq!(values[0].variable_id, 1000);
    assert_eq!(values[0].channel_id, 100);

    // Original payload republished verbatim under the configured topic
    let publishes = subscriber.received_publishes();
    assert_eq!(publishes.len(), 1);
    assert_eq!(publishes[0].0, "/out/temp");
    assert_eq!(&publishes[0].1[..], b"[1630000000,21.5,\"C\"]");
}

#[tokio::test]
async fn scenario_b_wildcard_matching_on_republish() {
    let store = Arc::new(seeded_store());
    add_subscriber_credential(&store, "sub1", 20);
    // A second channel republished one level deeper
    store.add_channel(ChannelRecord {
        channel_id: 101,
        organization_id: 0,
        device_id: 10,
        user_given_id: "/sensor/deep".to_string(),
        payload_pattern: None,
    });
    store.add_variable(VariableRecord {
        variable_id: 1001,
        organization_id: 0,
        current_channel_id: Some(101),
        republish_topic: Some("/sensor/42/43/gauge".to_string()),
        store_readings: false,
        name: "deep".to_string(),
    });
    store.add_channel(ChannelRecord {
        channel_id: 102,
        organization_id: 0,
        device_id: 10,
        user_given_id: "/sensor/flat".to_string(),
        payload_pattern: None,
    });
    store.add_variable(VariableRecord {
        variable_id: 1002,
        organization_id: 0,
        current_channel_id: Some(102),
        republish_topic: Some("/sensor/42/gauge".to_string()),
        store_readings: false,
        name: "flat".to_string(),
    });
    let gateway = make_gateway(store);

    let mut subscriber = TestClient::new(&gateway);
    subscriber.connect("sub1", "listener", "listen").await;
    subscriber.subscribe(&["/sensor/+/gauge"]).await;

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/flat", b"[1,2,u]").await;
    publisher.publish("/sensor/deep", b"[3,4,u]").await;

    let publishes = subscriber.received_publishes();
    assert_eq!(publishes.len(), 1, "+ matches exactly one level");
    assert_eq!(publishes[0].0, "/sensor/42/gauge");
}

#[tokio::test]
async fn scenario_d_unknown_channel_writes_nothing() {
    let store = Arc::new(seeded_store());
    add_subscriber_credential(&store, "sub1", 20);
    let gateway = make_gateway(store.clone());

    let mut subscriber = TestClient::new(&gateway);
    subscriber.connect("sub1", "listener", "listen").await;
    subscriber.subscribe(&["#"]).await;

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/unknown", b"[1,2,u]").await;

    assert!(store.readings().is_empty());
    assert!(store.values().is_empty());
    assert!(subscriber.received_publishes().is_empty());
}

#[tokio::test]
async fn scenario_e_overlapping_subscribers_get_one_delivery_each() {
    let store = Arc::new(seeded_store());
    add_subscriber_credential(&store, "sub1", 20);
    add_subscriber_credential(&store, "sub2", 21);
    add_subscriber_credential(&store, "sub3", 22);
    let gateway = make_gateway(store);

    let mut sub1 = TestClient::new(&gateway);
    sub1.connect("sub1", "listener", "listen").await;
    // Two overlapping predicates on one session: still one delivery
    sub1.subscribe(&["/out/#", "/out/+"]).await;

    let mut sub2 = TestClient::new(&gateway);
    sub2.connect("sub2", "listener", "listen").await;
    sub2.subscribe(&["/out/temp"]).await;

    let mut sub3 = TestClient::new(&gateway);
    sub3.connect("sub3", "listener", "listen").await;
    sub3.subscribe(&["/elsewhere/#"]).await;

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/temp", b"[1630000000,21.5,u]").await;

    assert_eq!(sub1.received_publishes().len(), 1);
    assert_eq!(sub2.received_publishes().len(), 1);
    assert!(sub3.received_publishes().is_empty());
}

#[tokio::test]
async fn unauthorized_publish_is_dropped_silently() {
    let store = Arc::new(seeded_store());
    let gateway = make_gateway(store.clone());

    let mut client = TestClient::new(&gateway);
    client.publish("/sensor/temp", b"[1,2,u]").await;

    assert!(store.readings().is_empty());
    assert!(!client.has_pending_actions(), "no negative acknowledgment exists");
}

#[tokio::test]
async fn extraction_failure_drops_message_before_store() {
    let store = Arc::new(seeded_store());
    let gateway = make_gateway(store.clone());

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/temp", b"no brackets here").await;

    assert!(store.readings().is_empty());
    assert!(store.values().is_empty());
}

#[tokio::test]
async fn persistence_disabled_still_republishes() {
    let store = Arc::new(seeded_store());
    add_subscriber_credential(&store, "sub1", 20);
    store.add_channel(ChannelRecord {
        channel_id: 200,
        organization_id: 0,
        device_id: 10,
        user_given_id: "/sensor/volatile".to_string(),
        payload_pattern: None,
    });
    store.add_variable(VariableRecord {
        variable_id: 2000,
        organization_id: 0,
        current_channel_id: Some(200),
        republish_topic: Some("/out/volatile".to_string()),
        store_readings: false,
        name: "volatile".to_string(),
    });
    let gateway = make_gateway(store.clone());

    let mut subscriber = TestClient::new(&gateway);
    subscriber.connect("sub1", "listener", "listen").await;
    subscriber.subscribe(&["/out/volatile"]).await;

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/volatile", b"[5,6.5,u]").await;

    assert!(store.readings().is_empty(), "persistence disabled");
    assert_eq!(subscriber.received_publishes().len(), 1);
}

#[tokio::test]
async fn pattern_edit_applies_to_next_publish() {
    let store = Arc::new(seeded_store());
    let gateway = make_gateway(store.clone());

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;

    // Default pattern first, then an administrative edit
    publisher.publish("/sensor/temp", b"[1630000000,1.0,u]").await;
    store.set_channel_pattern(100, Some("/t=([0-9]+) v=([0-9.]+)/".to_string()));
    publisher.publish("/sensor/temp", b"t=1630000001 v=2.5").await;

    let readings = store.readings();
    let values = store.values();
    assert_eq!(values.len(), 2, "edited pattern applies on the next publish");
    assert_eq!(values[1].value, 2.5);
    assert_eq!(readings[1].measured_at, 1_630_000_001);
}

#[tokio::test]
async fn ambiguous_binding_aborts_before_any_write() {
    let store = Arc::new(seeded_store());
    store.add_variable(VariableRecord {
        variable_id: 1001,
        organization_id: 0,
        current_channel_id: Some(100),
        republish_topic: Some("/out/other".to_string()),
        store_readings: true,
        name: "duplicate".to_string(),
    });
    let gateway = make_gateway(store.clone());

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/temp", b"[1,2,u]").await;

    assert!(store.readings().is_empty());
    assert!(store.values().is_empty());
}

// ============================================================================
// Store failure
// ============================================================================

/// Store wrapper that can be told to fail reading inserts
struct FlakyStore {
    inner: MemoryStore,
    fail_inserts: AtomicBool,
}

#[async_trait]
impl TelemetryStore for FlakyStore {
    async fn device_credentials(
        &self,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<DeviceId>, StoreError> {
        self.inner
            .device_credentials(client_id, username, password)
            .await
    }

    async fn channel_bindings(
        &self,
        client_id: &str,
        organization_id: OrganizationId,
        topic: &str,
    ) -> Result<Vec<ChannelBinding>, StoreError> {
        self.inner
            .channel_bindings(client_id, organization_id, topic)
            .await
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<ReadingId, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection lost".to_string()));
        }
        self.inner.insert_reading(reading).await
    }
}

#[tokio::test]
async fn store_outage_drops_message_but_keeps_sessions() {
    let store = Arc::new(FlakyStore {
        inner: seeded_store(),
        fail_inserts: AtomicBool::new(true),
    });
    add_subscriber_credential(&store.inner, "sub1", 20);
    let gateway = make_gateway(store.clone());

    let mut subscriber = TestClient::new(&gateway);
    subscriber.connect("sub1", "listener", "listen").await;
    subscriber.subscribe(&["/out/#"]).await;

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/temp", b"[1630000000,21.5,u]").await;

    // Aborted at the store stage: nothing persisted, nothing republished
    assert!(store.inner.readings().is_empty());
    assert!(subscriber.received_publishes().is_empty());
    assert_eq!(gateway.connection_count(), 2, "registry survives the outage");

    // Store recovers; the next publish flows end to end
    store.fail_inserts.store(false, Ordering::SeqCst);
    publisher.publish("/sensor/temp", b"[1630000001,22.0,u]").await;
    assert_eq!(store.inner.readings().len(), 1);
    assert_eq!(subscriber.received_publishes().len(), 1);
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn pingreq_gets_pingresp() {
    let gateway = make_gateway(Arc::new(seeded_store()));
    let mut client = TestClient::new(&gateway);
    client.connect("dev1", "alice", "secret").await;

    client.conn.handle_event(SessionEvent::PingReq).await;
    assert_eq!(client.next_action(), Action::PingResp);
}

#[tokio::test]
async fn closed_subscriber_no_longer_receives() {
    let store = Arc::new(seeded_store());
    add_subscriber_credential(&store, "sub1", 20);
    let gateway = make_gateway(store);

    let mut subscriber = TestClient::new(&gateway);
    subscriber.connect("sub1", "listener", "listen").await;
    subscriber.subscribe(&["/out/#"]).await;
    subscriber.close().await;
    assert_eq!(gateway.connection_count(), 0);

    let mut publisher = TestClient::new(&gateway);
    publisher.connect("dev1", "alice", "secret").await;
    publisher.publish("/sensor/temp", b"[1,2,u]").await;

    assert!(subscriber.received_publishes().is_empty());
}

#[tokio::test]
async fn transport_error_tears_down_session() {
    let gateway = make_gateway(Arc::new(seeded_store()));
    let mut client = TestClient::new(&gateway);
    client.connect("dev1", "alice", "secret").await;
    assert_eq!(gateway.connection_count(), 1);

    client
        .conn
        .handle_event(SessionEvent::Error {
            message: "connection reset".to_string(),
        })
        .await;
    assert_eq!(gateway.connection_count(), 0);
}

#[tokio::test]
async fn shutdown_drains_every_session() {
    let store = Arc::new(seeded_store());
    add_subscriber_credential(&store, "sub1", 20);
    let gateway = make_gateway(store);

    let mut a = TestClient::new(&gateway);
    a.connect("dev1", "alice", "secret").await;
    let mut b = TestClient::new(&gateway);
    b.connect("sub1", "listener", "listen").await;
    assert_eq!(gateway.connection_count(), 2);

    gateway.shutdown();
    assert_eq!(gateway.connection_count(), 0);
}
