//! Metrics collection for observability
//!
//! Prometheus metrics for the block lifecycle.
//!
//! # Metrics
//!
//! - `thorchain_blocks_committed_total` - Total number of committed blocks
//! - `thorchain_txs_delivered_total` - Transactions that executed successfully
//! - `thorchain_txs_failed_total` - Transactions rejected by ante or a handler
//! - `thorchain_commit_duration_seconds` - Histogram of commit latencies
//! - `thorchain_block_height` - Last committed height

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each instance owns its registry, so several apps can live in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Committed blocks
    pub blocks_committed: IntCounter,

    /// Successful transactions
    pub txs_delivered: IntCounter,

    /// Failed transactions
    pub txs_failed: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Last committed height
    pub block_height: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("blocks_committed", &self.blocks_committed.get())
            .field("txs_delivered", &self.txs_delivered.get())
            .field("txs_failed", &self.txs_failed.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let blocks_committed = IntCounter::new(
            "thorchain_blocks_committed_total",
            "Total number of committed blocks",
        )?;
        registry.register(Box::new(blocks_committed.clone()))?;

        let txs_delivered = IntCounter::new(
            "thorchain_txs_delivered_total",
            "Transactions that executed successfully",
        )?;
        registry.register(Box::new(txs_delivered.clone()))?;

        let txs_failed = IntCounter::new(
            "thorchain_txs_failed_total",
            "Transactions rejected by ante or a handler",
        )?;
        registry.register(Box::new(txs_failed.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "thorchain_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let block_height = IntGauge::new("thorchain_block_height", "Last committed height")?;
        registry.register(Box::new(block_height.clone()))?;

        Ok(Self {
            blocks_committed,
            txs_delivered,
            txs_failed,
            commit_duration,
            block_height,
            registry,
        })
    }

    /// Record a transaction outcome
    pub fn record_tx(&self, ok: bool) {
        if ok {
            self.txs_delivered.inc();
        } else {
            self.txs_failed.inc();
        }
    }

    /// Record a commit
    pub fn record_commit(&self, height: u64, duration_seconds: f64) {
        self.blocks_committed.inc();
        self.block_height.set(height as i64);
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
