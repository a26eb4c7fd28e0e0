//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the staking
//! ledger.
//!
//! # Metrics
//!
//! - `staking_stakes_created_total` - Stakes created
//! - `staking_stakes_released_total` - Stakes released
//! - `staking_derivative_mints_total` - Derivative mint calls issued
//! - `staking_derivative_burns_total` - Derivative burn calls issued
//! - `staking_op_duration_seconds` - Histogram of operation latencies
//! - `staking_tiers_registered` - Live length of the tier registry

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each collector owns its own registry, so independent ledgers (and test
/// cases) do not collide on metric names.
#[derive(Clone)]
pub struct Metrics {
    /// Stakes created
    pub stakes_created: IntCounter,

    /// Stakes released
    pub stakes_released: IntCounter,

    /// Derivative mint calls issued
    pub derivative_mints: IntCounter,

    /// Derivative burn calls issued
    pub derivative_burns: IntCounter,

    /// Operation latency histogram
    pub op_duration: Histogram,

    /// Live length of the tier registry
    pub tiers_registered: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let stakes_created =
            IntCounter::new("staking_stakes_created_total", "Stakes created")?;
        registry.register(Box::new(stakes_created.clone()))?;

        let stakes_released =
            IntCounter::new("staking_stakes_released_total", "Stakes released")?;
        registry.register(Box::new(stakes_released.clone()))?;

        let derivative_mints = IntCounter::new(
            "staking_derivative_mints_total",
            "Derivative mint calls issued",
        )?;
        registry.register(Box::new(derivative_mints.clone()))?;

        let derivative_burns = IntCounter::new(
            "staking_derivative_burns_total",
            "Derivative burn calls issued",
        )?;
        registry.register(Box::new(derivative_burns.clone()))?;

        let op_duration = Histogram::with_opts(
            HistogramOpts::new(
                "staking_op_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(op_duration.clone()))?;

        let tiers_registered =
            IntGauge::new("staking_tiers_registered", "Live length of the tier registry")?;
        registry.register(Box::new(tiers_registered.clone()))?;

        Ok(Self {
            stakes_created,
            stakes_released,
            derivative_mints,
            derivative_burns,
            op_duration,
            tiers_registered,
            registry,
        })
    }

    /// Record a stake creation with its enrolled-issuer mint count
    pub fn record_stake_created(&self, mints: usize) {
        self.stakes_created.inc();
        self.derivative_mints.inc_by(mints as u64);
    }

    /// Record a stake release with its burn count
    pub fn record_stake_released(&self, burns: usize) {
        self.stakes_released.inc();
        self.derivative_burns.inc_by(burns as u64);
    }

    /// Record operation duration
    pub fn record_op_duration(&self, duration_seconds: f64) {
        self.op_duration.observe(duration_seconds);
    }

    /// Update the tier registry gauge
    pub fn set_tiers_registered(&self, count: u32) {
        self.tiers_registered.set(count as i64);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn export(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.stakes_created.get(), 0);
        assert_eq!(metrics.stakes_released.get(), 0);
    }

    #[test]
    fn test_record_stake_created() {
        let metrics = Metrics::new().unwrap();
        metrics.record_stake_created(2);
        assert_eq!(metrics.stakes_created.get(), 1);
        assert_eq!(metrics.derivative_mints.get(), 2);
    }

    #[test]
    fn test_record_stake_released() {
        let metrics = Metrics::new().unwrap();
        metrics.record_stake_released(3);
        assert_eq!(metrics.stakes_released.get(), 1);
        assert_eq!(metrics.derivative_burns.get(), 3);
    }

    #[test]
    fn test_tier_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_tiers_registered(4);
        assert_eq!(metrics.tiers_registered.get(), 4);
    }

    #[test]
    fn test_export_contains_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.record_stake_created(1);

        let exported = metrics.export();
        assert!(exported.contains("staking_stakes_created_total"));
    }
}
