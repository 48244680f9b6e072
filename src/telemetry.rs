//! Process metrics for the price stream
//!
//! Counters and gauges are cheap atomics shared by clone; `StreamMetrics`
//! bundles the fixed set the server reports and renders them in Prometheus
//! text format.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter
#[derive(Debug, Clone)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Value that can go up and down
#[derive(Debug, Clone)]
pub struct Gauge {
    name: &'static str,
    help: &'static str,
    value: Arc<AtomicI64>,
}

impl Gauge {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Metrics shared by the engine, aggregator, dispatcher and server
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub ticks: Counter,
    pub alerts: Counter,
    pub aggregates_stored: Counter,
    pub sink_failures: Counter,
    pub messages_sent: Counter,
    pub subscribers_dropped: Counter,
    pub subscribers_connected: Gauge,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            ticks: Counter::new("ticks_total", "Price batches committed"),
            alerts: Counter::new("alerts_total", "Price alerts raised"),
            aggregates_stored: Counter::new("aggregates_stored_total", "Aggregate records stored"),
            sink_failures: Counter::new("sink_failures_total", "Aggregate sink failures and timeouts"),
            messages_sent: Counter::new("messages_sent_total", "Messages delivered to subscribers"),
            subscribers_dropped: Counter::new(
                "subscribers_dropped_total",
                "Subscribers removed after a failed push",
            ),
            subscribers_connected: Gauge::new("subscribers_connected", "Currently connected subscribers"),
        }
    }

    pub fn export_prometheus(&self) -> String {
        let lines = [
            self.ticks.to_prometheus(),
            self.alerts.to_prometheus(),
            self.aggregates_stored.to_prometheus(),
            self.sink_failures.to_prometheus(),
            self.messages_sent.to_prometheus(),
            self.subscribers_dropped.to_prometheus(),
            self.subscribers_connected.to_prometheus(),
        ];
        let mut output = lines.join("\n");
        output.push('\n');
        output
    }

    /// One-line summary for periodic logging
    pub fn summary(&self) -> String {
        format!(
            "ticks={} alerts={} aggregates={} sink_failures={} sent={} dropped={} connected={}",
            self.ticks.get(),
            self.alerts.get(),
            self.aggregates_stored.get(),
            self.sink_failures.get(),
            self.messages_sent.get(),
            self.subscribers_dropped.get(),
            self.subscribers_connected.get()
        )
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}
