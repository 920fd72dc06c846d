//! In-memory storage backend.
//!
//! Holds the directory tables as plain vectors behind one mutex and
//! evaluates the channel/variable join in process. The single lock makes
//! `insert_reading` atomic: both rows land or neither does.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::Result;
use super::models::{
    ChannelBinding, ChannelId, ChannelRecord, DeviceCredential, DeviceId, DeviceRecord,
    NewReading, OrganizationId, ReadingId, VariableId, VariableRecord,
};
use super::TelemetryStore;

/// One persisted `readings` row
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub reading_id: ReadingId,
    pub organization_id: OrganizationId,
    pub measured_at: i64,
}

/// One persisted `value` row
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRow {
    pub organization_id: OrganizationId,
    pub reading_id: ReadingId,
    pub variable_id: VariableId,
    pub channel_id: ChannelId,
    pub value: f64,
}

#[derive(Default)]
struct Tables {
    credentials: Vec<DeviceCredential>,
    devices: Vec<DeviceRecord>,
    channels: Vec<ChannelRecord>,
    variables: Vec<VariableRecord>,
    readings: Vec<ReadingRow>,
    values: Vec<ValueRow>,
    next_reading_id: ReadingId,
}

/// In-process `TelemetryStore` implementation
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_reading_id: 1,
                ..Tables::default()
            }),
        }
    }

    pub fn add_credential(&self, credential: DeviceCredential) {
        self.tables.lock().credentials.push(credential);
    }

    pub fn add_device(&self, device: DeviceRecord) {
        self.tables.lock().devices.push(device);
    }

    pub fn add_channel(&self, channel: ChannelRecord) {
        self.tables.lock().channels.push(channel);
    }

    pub fn add_variable(&self, variable: VariableRecord) {
        self.tables.lock().variables.push(variable);
    }

    /// Replace a channel's extraction pattern (administrative edit)
    pub fn set_channel_pattern(&self, channel_id: ChannelId, pattern: Option<String>) {
        let mut tables = self.tables.lock();
        for channel in &mut tables.channels {
            if channel.channel_id == channel_id {
                channel.payload_pattern = pattern.clone();
            }
        }
    }

    /// Snapshot of the persisted reading rows
    pub fn readings(&self) -> Vec<ReadingRow> {
        self.tables.lock().readings.clone()
    }

    /// Snapshot of the persisted value rows
    pub fn values(&self) -> Vec<ValueRow> {
        self.tables.lock().values.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn device_credentials(
        &self,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<DeviceId>> {
        let tables = self.tables.lock();
        Ok(tables
            .credentials
            .iter()
            .filter(|row| {
                row.enabled
                    && row.client_id == client_id
                    && row.username == username
                    && row.password == password
            })
            .map(|row| row.device_id)
            .collect())
    }

    async fn channel_bindings(
        &self,
        client_id: &str,
        organization_id: OrganizationId,
        topic: &str,
    ) -> Result<Vec<ChannelBinding>> {
        let tables = self.tables.lock();
        let mut rows = Vec::new();

        for channel in &tables.channels {
            if channel.user_given_id != topic || channel.organization_id != organization_id {
                continue;
            }
            let device = tables.devices.iter().find(|d| {
                d.device_id == channel.device_id && d.organization_id == channel.organization_id
            });
            let Some(device) = device else { continue };

            let authorized = tables.credentials.iter().any(|a| {
                a.device_id == device.device_id
                    && a.organization_id == device.organization_id
                    && a.client_id == client_id
            });
            if !authorized {
                continue;
            }

            for variable in &tables.variables {
                if variable.organization_id == organization_id
                    && variable.current_channel_id == Some(channel.channel_id)
                {
                    rows.push(ChannelBinding {
                        channel_id: channel.channel_id,
                        payload_pattern: channel.payload_pattern.clone(),
                        variable_id: variable.variable_id,
                        variable_name: variable.name.clone(),
                        republish_topic: variable.republish_topic.clone(),
                        store_readings: variable.store_readings,
                        device_serial: device.serial.clone(),
                    });
                }
            }
        }

        Ok(rows)
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<ReadingId> {
        let mut tables = self.tables.lock();
        let reading_id = tables.next_reading_id;
        tables.next_reading_id += 1;

        tables.readings.push(ReadingRow {
            reading_id,
            organization_id: reading.organization_id,
            measured_at: reading.measured_at,
        });
        tables.values.push(ValueRow {
            organization_id: reading.organization_id,
            reading_id,
            variable_id: reading.variable_id,
            channel_id: reading.channel_id,
            value: reading.value,
        });

        Ok(reading_id)
    }
}
