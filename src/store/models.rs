//! Row models exchanged with the storage collaborator.
//!
//! Field names follow the persisted schema: `device_auth`, `channels`,
//! `variable`, `readings`, `value`. All rows except readings and values are
//! read-only from the gateway's perspective.

/// Device identifier assigned by the store
pub type DeviceId = i64;
/// Channel identifier assigned by the store
pub type ChannelId = i64;
/// Variable identifier assigned by the store
pub type VariableId = i64;
/// Reading identifier generated on insert
pub type ReadingId = i64;
/// Organization identifier
pub type OrganizationId = i64;

/// One `device_auth` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCredential {
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Only enabled rows participate in authorization
    pub enabled: bool,
    pub device_id: DeviceId,
    pub organization_id: OrganizationId,
}

/// One `devices` row (the fields the gateway reads)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub organization_id: OrganizationId,
    /// Manufacturer identification, carried into log context
    pub serial: Option<String>,
}

/// One `channels` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub channel_id: ChannelId,
    pub organization_id: OrganizationId,
    pub device_id: DeviceId,
    /// Externally-visible identifier, equal to the published topic
    pub user_given_id: String,
    /// Delimited extraction pattern, e.g. `/\[(\d*),(.*)\]/m`
    pub payload_pattern: Option<String>,
}

/// One `variable` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRecord {
    pub variable_id: VariableId,
    pub organization_id: OrganizationId,
    /// The channel this variable is currently bound to
    pub current_channel_id: Option<ChannelId>,
    pub republish_topic: Option<String>,
    /// Whether extracted readings are persisted
    pub store_readings: bool,
    pub name: String,
}

/// The joined channel+variable row the resolver consumes
///
/// Must be re-resolved on every publish; administrative changes between
/// publishes are expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub channel_id: ChannelId,
    pub payload_pattern: Option<String>,
    pub variable_id: VariableId,
    pub variable_name: String,
    pub republish_topic: Option<String>,
    pub store_readings: bool,
    pub device_serial: Option<String>,
}

/// A reading and its value, written together in one atomic insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub organization_id: OrganizationId,
    /// Extracted measurement timestamp (unix seconds)
    pub measured_at: i64,
    pub variable_id: VariableId,
    pub channel_id: ChannelId,
    pub value: f64,
}
