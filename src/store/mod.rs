//! Relational storage interface
//!
//! The gateway reads the device/channel directory and writes readings
//! through the `TelemetryStore` trait, keeping the storage engine itself
//! (schema, transactions, indexing) behind the seam. `MemoryStore` is the
//! in-process implementation used by tests and embedders; production
//! backends live with the embedding process.

mod error;
mod memory;
mod models;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, ReadingRow, ValueRow};
pub use models::{
    ChannelBinding, ChannelId, ChannelRecord, DeviceCredential, DeviceId, DeviceRecord,
    NewReading, OrganizationId, ReadingId, VariableId, VariableRecord,
};

use async_trait::async_trait;

/// Storage collaborator consumed by the gateway
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Device ids of enabled `device_auth` rows matching all three fields.
    ///
    /// The authorizer applies the zero/one/many policy on top of the raw
    /// row set; the store only filters.
    async fn device_credentials(
        &self,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<DeviceId>>;

    /// Channel+variable rows whose channel user-given identifier equals
    /// `topic`, scoped to `organization_id` and to a device authorized for
    /// `client_id`, with the variable currently bound to that channel.
    ///
    /// The resolver treats anything other than exactly one row as an
    /// authorization failure.
    async fn channel_bindings(
        &self,
        client_id: &str,
        organization_id: OrganizationId,
        topic: &str,
    ) -> Result<Vec<ChannelBinding>>;

    /// Insert one reading row and its value row, returning the generated
    /// reading identifier.
    ///
    /// Atomic: a failure must leave neither row behind.
    async fn insert_reading(&self, reading: &NewReading) -> Result<ReadingId>;
}
