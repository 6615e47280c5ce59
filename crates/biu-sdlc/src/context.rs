//! Collaborators shared by the service and executor

use std::sync::Arc;

use crate::audit::{AuditSink, TracingAudit};
use crate::metrics::{Metrics, MetricsSink};

/// Metrics and audit sinks handed to every component
#[derive(Clone)]
pub struct SdlcContext {
    /// Counter sink
    pub metrics: Arc<dyn MetricsSink>,
    /// Link traffic sink
    pub audit: Arc<dyn AuditSink>,
}

impl SdlcContext {
    /// Context over explicit sinks
    pub fn new(metrics: Arc<dyn MetricsSink>, audit: Arc<dyn AuditSink>) -> Self {
        Self { metrics, audit }
    }
}

impl Default for SdlcContext {
    /// In-memory metrics, audit to `tracing`
    fn default() -> Self {
        Self {
            metrics: Arc::new(Metrics::new()),
            audit: Arc::new(TracingAudit),
        }
    }
}
