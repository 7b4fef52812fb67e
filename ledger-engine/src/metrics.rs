//! Metrics collection for observability
//!
//! Prometheus collectors live on a per-engine [`Registry`] so several
//! engines can run in one process.
//!
//! # Metrics
//!
//! - `ledger_blocks_total` - Blocks appended (the activity counter)
//! - `ledger_live_blocks` - Blocks currently held live
//! - `ledger_archived_blocks_total` - Blocks moved to archive units
//! - `ledger_migrations_total` - Migration passes that stored blocks
//! - `ledger_migration_failures_total` - Migration passes that made no progress
//! - `ledger_listener_panics_total` - Listener invocations that panicked

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Blocks appended
    pub blocks_total: IntCounter,

    /// Live blocks
    pub live_blocks: IntGauge,

    /// Blocks archived
    pub archived_blocks_total: IntCounter,

    /// Successful migration passes
    pub migrations_total: IntCounter,

    /// Migration passes without progress
    pub migration_failures_total: IntCounter,

    /// Listener panics
    pub listener_panics_total: IntCounter,

    /// Prometheus registry
    registry: Arc<Registry>,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let live_blocks = IntGauge::new("ledger_live_blocks", "Blocks currently held live")?;
        registry.register(Box::new(live_blocks.clone()))?;

        Ok(Self {
            blocks_total: counter(&registry, "ledger_blocks_total", "Blocks appended")?,
            live_blocks,
            archived_blocks_total: counter(
                &registry,
                "ledger_archived_blocks_total",
                "Blocks moved to archive units",
            )?,
            migrations_total: counter(
                &registry,
                "ledger_migrations_total",
                "Migration passes that stored blocks",
            )?,
            migration_failures_total: counter(
                &registry,
                "ledger_migration_failures_total",
                "Migration passes that made no progress",
            )?,
            listener_panics_total: counter(
                &registry,
                "ledger_listener_panics_total",
                "Listener invocations that panicked",
            )?,
            registry,
        })
    }

    /// Record block append
    pub fn record_append(&self, live: u64) {
        self.blocks_total.inc();
        self.live_blocks.set(live as i64);
    }

    /// Record a pass that stored `archived` blocks
    pub fn record_migration(&self, archived: u64, live: u64) {
        self.migrations_total.inc();
        self.archived_blocks_total.inc_by(archived);
        self.live_blocks.set(live as i64);
    }

    /// Record a pass that made no progress
    pub fn record_migration_failure(&self) {
        self.migration_failures_total.inc();
    }

    /// Record panicking listeners
    pub fn record_listener_panics(&self, count: u64) {
        self.listener_panics_total.inc_by(count);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.blocks_total.get(), 0);
        assert_eq!(metrics.live_blocks.get(), 0);
    }

    #[test]
    fn test_engines_do_not_share_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_append(1);

        assert_eq!(a.blocks_total.get(), 1);
        assert_eq!(b.blocks_total.get(), 0);
    }

    #[test]
    fn test_record_migration() {
        let metrics = Metrics::new().unwrap();
        metrics.record_append(5);
        metrics.record_migration(3, 2);
        metrics.record_migration_failure();

        assert_eq!(metrics.archived_blocks_total.get(), 3);
        assert_eq!(metrics.migrations_total.get(), 1);
        assert_eq!(metrics.migration_failures_total.get(), 1);
        assert_eq!(metrics.live_blocks.get(), 2);
    }

    #[test]
    fn test_render_text() {
        let metrics = Metrics::new().unwrap();
        metrics.record_listener_panics(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("ledger_listener_panics_total 2"));
    }
}
