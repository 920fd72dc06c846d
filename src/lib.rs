//! Telegate - telemetry ingestion and republish gateway core
//!
//! Sits behind an MQTT-style broker and turns raw publish events from
//! telemetry devices into authorized, persisted and selectively
//! re-broadcast data points. Wire framing and the relational engine stay
//! with the embedding process; this crate is the pipeline between them.

pub mod auth;
pub mod channel;
pub mod config;
pub mod extract;
pub mod gateway;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod topic;

pub use auth::{AuthOutcome, CredentialAuthorizer};
pub use channel::{ChannelResolver, ResolveError};
pub use config::Config;
pub use extract::{Extracted, ExtractionError, PayloadExtractor};
pub use gateway::{ClientConnection, Gateway, GatewayConfig, PipelineError, PublishOutcome};
pub use metrics::Metrics;
pub use protocol::{Action, SessionEvent};
pub use registry::{ClientSession, ConnectionRegistry};
pub use store::{MemoryStore, StoreError, TelemetryStore};
pub use topic::{FilterError, TopicFilter};
