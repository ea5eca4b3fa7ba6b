//! Request telemetry.
//!
//! Every attempt against either endpoint is recorded into two Prometheus
//! collectors:
//!
//! - [`REQUESTS_TOTAL`]: counter of attempts
//! - [`LATENCY_MILLISECONDS`]: histogram of attempt latency, bucketed by
//!   [`LATENCY_BUCKETS`]
//!
//! # Labels
//!
//! Constant, fixed at construction:
//! - `app`: application name passed to the client
//! - `chain`: chain name passed to the client
//!
//! Per observation:
//! - `method`: logical operation (e.g. "BalanceAt", "SendTransaction")
//! - `client`: configured name of the endpoint that served the attempt
//! - `success`: "true" | "false"

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use prometheus::core::Collector;
use prometheus::proto::{Metric, MetricFamily};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::Result;

/// Total RPC attempts.
///
/// Labels: `app`, `chain` (const); `method`, `client`, `success`.
pub const REQUESTS_TOTAL: &str = "rpc_request_total";

/// RPC attempt latency in milliseconds.
///
/// Labels: `app`, `chain` (const); `method`, `client`, `success`.
pub const LATENCY_MILLISECONDS: &str = "rpc_latency_milliseconds";

/// Histogram bucket upper bounds, in milliseconds.
pub const LATENCY_BUCKETS: [f64; 11] = [
    2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0,
];

pub const LABEL_APP: &str = "app";
pub const LABEL_CHAIN: &str = "chain";
pub const LABEL_METHOD: &str = "method";
pub const LABEL_CLIENT: &str = "client";
pub const LABEL_SUCCESS: &str = "success";

const VARIABLE_LABELS: [&str; 3] = [LABEL_METHOD, LABEL_CLIENT, LABEL_SUCCESS];

/// Request counter and latency histogram for one `{app, chain}` pair.
///
/// Collectors are thread-safe; `observe` takes `&self` and may be called
/// from any number of in-flight operations.
pub struct RpcMetrics {
    requests: IntCounterVec,
    latency: HistogramVec,
    registered_in: Mutex<Option<Registry>>,
}

impl RpcMetrics {
    /// Build the collectors. Nothing is registered yet.
    pub fn new(app: &str, chain: &str) -> Result<Self> {
        let const_labels = HashMap::from([
            (LABEL_APP.to_string(), app.to_string()),
            (LABEL_CHAIN.to_string(), chain.to_string()),
        ]);

        let requests = IntCounterVec::new(
            Opts::new(REQUESTS_TOTAL, "RPC requests counts").const_labels(const_labels.clone()),
            &VARIABLE_LABELS,
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(LATENCY_MILLISECONDS, "RPC request latency in milliseconds")
                .const_labels(const_labels)
                .buckets(LATENCY_BUCKETS.to_vec()),
            &VARIABLE_LABELS,
        )?;

        Ok(Self {
            requests,
            latency,
            registered_in: Mutex::new(None),
        })
    }

    /// Register both collectors with `registry`.
    ///
    /// Fails if this `{app, chain}` pair is already registered there. Calling
    /// it again on an already-registered instance is a no-op.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        let mut registered_in = self
            .registered_in
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if registered_in.is_some() {
            return Ok(());
        }

        registry.register(Box::new(self.requests.clone()))?;
        if let Err(e) = registry.register(Box::new(self.latency.clone())) {
            let _ = registry.unregister(Box::new(self.requests.clone()));
            return Err(e.into());
        }
        *registered_in = Some(registry.clone());
        Ok(())
    }

    /// Detach both collectors from the registry they were registered with.
    ///
    /// Returns `false` if they were not registered.
    pub fn unregister(&self) -> bool {
        let registry = self
            .registered_in
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match registry {
            Some(registry) => {
                let _ = registry.unregister(Box::new(self.requests.clone()));
                let _ = registry.unregister(Box::new(self.latency.clone()));
                true
            }
            None => false,
        }
    }

    /// Whether the collectors are currently registered.
    pub fn is_registered(&self) -> bool {
        self.registered_in
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Record one attempt: bump the counter and observe the elapsed time
    /// since `started` in whole milliseconds.
    pub fn observe(&self, method: &str, started: Instant, client: &str, success: bool) {
        let labels = [method, client, success_label(success)];
        self.requests.with_label_values(&labels).inc();
        self.latency
            .with_label_values(&labels)
            .observe(started.elapsed().as_millis() as f64);
    }

    /// Current count of attempts for a label tuple.
    ///
    /// Read-only: a tuple never observed reads as zero and is not created.
    pub fn request_count(&self, method: &str, client: &str, success: bool) -> u64 {
        let families = self.requests.collect();
        find_sample(&families, method, client, success)
            .map(|m| m.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Number of latency samples recorded for a label tuple.
    pub fn latency_sample_count(&self, method: &str, client: &str, success: bool) -> u64 {
        let families = self.latency.collect();
        find_sample(&families, method, client, success)
            .map(|m| m.get_histogram().get_sample_count())
            .unwrap_or(0)
    }
}

fn success_label(success: bool) -> &'static str {
    if success { "true" } else { "false" }
}

fn find_sample<'f>(
    families: &'f [MetricFamily],
    method: &str,
    client: &str,
    success: bool,
) -> Option<&'f Metric> {
    let wanted = [
        (LABEL_METHOD, method),
        (LABEL_CLIENT, client),
        (LABEL_SUCCESS, success_label(success)),
    ];
    families.iter().flat_map(|f| f.get_metric()).find(|m| {
        wanted.iter().all(|(name, value)| {
            m.get_label()
                .iter()
                .any(|l| l.get_name() == *name && l.get_value() == *value)
        })
    })
}

impl std::fmt::Debug for RpcMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcMetrics")
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family_names(registry: &Registry) -> Vec<String> {
        registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect()
    }

    #[test]
    fn observe_counts_per_label_tuple() {
        let metrics = RpcMetrics::new("app", "mainnet").unwrap();
        let started = Instant::now();
        metrics.observe("BalanceAt", started, "primary", true);
        metrics.observe("BalanceAt", started, "primary", true);
        metrics.observe("BalanceAt", started, "primary", false);
        metrics.observe("BalanceAt", started, "backup", true);

        assert_eq!(metrics.request_count("BalanceAt", "primary", true), 2);
        assert_eq!(metrics.request_count("BalanceAt", "primary", false), 1);
        assert_eq!(metrics.request_count("BalanceAt", "backup", true), 1);
        assert_eq!(metrics.request_count("ChainID", "primary", true), 0);
        assert_eq!(metrics.latency_sample_count("BalanceAt", "primary", true), 2);
    }

    #[test]
    fn register_and_unregister() {
        let registry = Registry::new();
        let metrics = RpcMetrics::new("app", "mainnet").unwrap();
        metrics.observe("BlockNumber", Instant::now(), "primary", true);

        metrics.register(&registry).unwrap();
        assert!(metrics.is_registered());
        let names = family_names(&registry);
        assert!(names.contains(&REQUESTS_TOTAL.to_string()));
        assert!(names.contains(&LATENCY_MILLISECONDS.to_string()));

        assert!(metrics.unregister());
        assert!(!metrics.is_registered());
        assert!(family_names(&registry).is_empty());
        assert!(!metrics.unregister());
    }

    #[test]
    fn register_twice_is_noop() {
        let registry = Registry::new();
        let metrics = RpcMetrics::new("app", "mainnet").unwrap();
        metrics.register(&registry).unwrap();
        metrics.register(&registry).unwrap();
        assert!(metrics.unregister());
    }

    #[test]
    fn duplicate_app_chain_rejected() {
        let registry = Registry::new();
        let first = RpcMetrics::new("app", "mainnet").unwrap();
        let second = RpcMetrics::new("app", "mainnet").unwrap();
        first.register(&registry).unwrap();
        assert!(second.register(&registry).is_err());
        assert!(!second.is_registered());
    }

    #[test]
    fn distinct_chains_share_registry() {
        let registry = Registry::new();
        let mainnet = RpcMetrics::new("app", "mainnet").unwrap();
        let sepolia = RpcMetrics::new("app", "sepolia").unwrap();
        mainnet.register(&registry).unwrap();
        sepolia.register(&registry).unwrap();

        mainnet.observe("ChainID", Instant::now(), "primary", true);
        sepolia.observe("ChainID", Instant::now(), "primary", true);

        let families = registry.gather();
        let requests = families
            .iter()
            .find(|f| f.get_name() == REQUESTS_TOTAL)
            .unwrap();
        assert_eq!(requests.get_metric().len(), 2);
    }

    #[test]
    fn histogram_uses_fixed_buckets() {
        let registry = Registry::new();
        let metrics = RpcMetrics::new("app", "mainnet").unwrap();
        metrics.register(&registry).unwrap();
        metrics.observe("BlockNumber", Instant::now(), "primary", true);

        let families = registry.gather();
        let latency = families
            .iter()
            .find(|f| f.get_name() == LATENCY_MILLISECONDS)
            .unwrap();
        let histogram = latency.get_metric()[0].get_histogram();
        let bounds: Vec<f64> = histogram
            .get_bucket()
            .iter()
            .map(|b| b.get_upper_bound())
            .collect();
        assert_eq!(bounds, LATENCY_BUCKETS.to_vec());
    }
}
