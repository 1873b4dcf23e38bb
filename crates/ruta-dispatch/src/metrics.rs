//! Prometheus metrics for dispatch

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use ruta_common::Result;

/// Counters for the dispatch core, registered on their own registry
pub struct DispatchMetrics {
    registry: Registry,
    pub trips_created: IntCounterVec,
    pub accept_attempts: IntCounterVec,
    pub cancellations: IntCounterVec,
    pub negotiations: IntCounterVec,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let trips_created = IntCounterVec::new(
            Opts::new("ruta_trips_created_total", "Trip requests created"),
            &["kind"],
        )?;
        let accept_attempts = IntCounterVec::new(
            Opts::new("ruta_accept_attempts_total", "Accept attempts by outcome"),
            &["outcome"],
        )?;
        let cancellations = IntCounterVec::new(
            Opts::new("ruta_cancellations_total", "Cancelled trips"),
            &["penalized"],
        )?;
        let negotiations = IntCounterVec::new(
            Opts::new("ruta_negotiations_total", "Negotiation actions"),
            &["action"],
        )?;

        registry.register(Box::new(trips_created.clone()))?;
        registry.register(Box::new(accept_attempts.clone()))?;
        registry.register(Box::new(cancellations.clone()))?;
        registry.register(Box::new(negotiations.clone()))?;

        Ok(Self {
            registry,
            trips_created,
            accept_attempts,
            cancellations,
            negotiations,
        })
    }

    /// Text exposition format, as served on `/metrics`
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ruta_common::RutaError::Serialization(e.to_string()))
    }
}
