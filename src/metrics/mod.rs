//! Prometheus metrics for the gateway
//!
//! Counters for the authorization, ingestion and republish pipeline. The
//! embedding process decides how the registry is exposed; the gateway only
//! records.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// All gateway metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Connection metrics
    pub connections_accepted: IntCounter,
    pub connections_denied: IntCounter,
    pub connections_current: IntGauge,
    pub auth_multi_device: IntCounter,

    // Publish pipeline metrics
    pub publishes_received: IntCounter,
    pub pipeline_aborts: IntCounterVec,
    pub readings_stored: IntCounter,

    // Republish metrics
    pub republish_deliveries: IntCounter,
    pub republish_skipped: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_accepted = IntCounter::with_opts(Opts::new(
            "telegate_connections_accepted_total",
            "Connections authorized and registered since startup",
        ))
        .unwrap();

        let connections_denied = IntCounter::with_opts(Opts::new(
            "telegate_connections_denied_total",
            "Connections denied for bad or missing credentials",
        ))
        .unwrap();

        let connections_current = IntGauge::with_opts(Opts::new(
            "telegate_connections_current",
            "Currently registered client sessions",
        ))
        .unwrap();

        let auth_multi_device = IntCounter::with_opts(Opts::new(
            "telegate_auth_multi_device_total",
            "Credential triples that matched more than one device",
        ))
        .unwrap();

        let publishes_received = IntCounter::with_opts(Opts::new(
            "telegate_publishes_received_total",
            "PUBLISH events accepted into the pipeline",
        ))
        .unwrap();

        let pipeline_aborts = IntCounterVec::new(
            Opts::new(
                "telegate_pipeline_aborts_total",
                "Publish pipelines aborted, by failing stage",
            ),
            &["stage"],
        )
        .unwrap();

        let readings_stored = IntCounter::with_opts(Opts::new(
            "telegate_readings_stored_total",
            "Reading/value row pairs persisted",
        ))
        .unwrap();

        let republish_deliveries = IntCounter::with_opts(Opts::new(
            "telegate_republish_deliveries_total",
            "Payloads delivered to subscribed sessions",
        ))
        .unwrap();

        let republish_skipped = IntCounter::with_opts(Opts::new(
            "telegate_republish_skipped_total",
            "Publishes with no republish topic configured",
        ))
        .unwrap();

        registry
            .register(Box::new(connections_accepted.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_denied.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_current.clone()))
            .unwrap();
        registry
            .register(Box::new(auth_multi_device.clone()))
            .unwrap();
        registry
            .register(Box::new(publishes_received.clone()))
            .unwrap();
        registry.register(Box::new(pipeline_aborts.clone())).unwrap();
        registry.register(Box::new(readings_stored.clone())).unwrap();
        registry
            .register(Box::new(republish_deliveries.clone()))
            .unwrap();
        registry
            .register(Box::new(republish_skipped.clone()))
            .unwrap();

        Self {
            registry,
            connections_accepted,
            connections_denied,
            connections_current,
            auth_multi_device,
            publishes_received,
            pipeline_aborts,
            readings_stored,
            republish_deliveries,
            republish_skipped,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
