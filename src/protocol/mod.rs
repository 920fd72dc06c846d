//! Transport interface
//!
//! The wire-level protocol engine (packet framing, socket management) is an
//! external collaborator. It feeds the gateway `SessionEvent`s and consumes
//! `Action`s; nothing here touches bytes on the wire.

use bytes::Bytes;

/// CONNACK return code: connection accepted
pub const CONNECT_ACCEPTED: u8 = 0;
/// CONNACK return code: bad username or password
pub const CONNECT_BAD_CREDENTIALS: u8 = 4;
/// SUBACK granted-QoS entry marking a failed subscription
pub const SUBACK_FAILURE: u8 = 0x80;

/// Credentials and identity from a CONNECT packet
#[derive(Debug, Clone, Default)]
pub struct ConnectEvent {
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One requested subscription
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub topic: String,
    pub qos: u8,
}

/// A SUBSCRIBE packet's content
#[derive(Debug, Clone)]
pub struct SubscribeEvent {
    pub message_id: u16,
    pub subscriptions: Vec<SubscriptionRequest>,
}

/// A PUBLISH packet's content
#[derive(Debug, Clone)]
pub struct PublishEvent {
    pub topic: String,
    pub payload: Bytes,
}

/// Events consumed from the transport collaborator
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connect(ConnectEvent),
    Subscribe(SubscribeEvent),
    Publish(PublishEvent),
    PingReq,
    /// Client sent DISCONNECT; the transport closes the stream
    Disconnect,
    /// The underlying connection is gone
    Close,
    /// Transport-level failure
    Error { message: String },
}

/// Actions produced for the transport collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ConnAck { return_code: u8 },
    SubAck { message_id: u16, granted: Vec<u8> },
    PingResp,
    Publish { topic: String, payload: Bytes },
}
