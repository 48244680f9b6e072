//! Periodic per-ticker averages
//!
//! Once per period the aggregator computes the mean price of every ticker over
//! the window just ended and hands each record to an [`AggregateSink`]. Sink
//! calls are bounded by a timeout and isolated per ticker: one failing store
//! is logged and skipped, the others still land.

use crate::{
    config::AggregatorConfig,
    data::AggregateRecord,
    dispatcher::BroadcastDispatcher,
    error::{ErrorReporter, SinkError, StreamError},
    history::to_chrono,
    registry::TickerRegistry,
    telemetry::StreamMetrics,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Persistence collaborator for aggregate records
#[async_trait]
pub trait AggregateSink: Send + Sync {
    async fn store_aggregate(&self, record: &AggregateRecord) -> Result<(), SinkError>;

    fn name(&self) -> &str;
}

/// Writes every record to the log
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AggregateSink for LogSink {
    async fn store_aggregate(&self, record: &AggregateRecord) -> Result<(), SinkError> {
        tracing::info!("Stored {}", record);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AggregateRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AggregateRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AggregateSink for MemorySink {
    async fn store_aggregate(&self, record: &AggregateRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Outcome of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationReport {
    pub stored: usize,
    pub failed: usize,
    /// Tickers with no samples in the window
    pub skipped: usize,
    pub records: Vec<AggregateRecord>,
}

pub struct Aggregator {
    registry: Arc<TickerRegistry>,
    sink: Arc<dyn AggregateSink>,
    dispatcher: Option<Arc<BroadcastDispatcher>>,
    config: AggregatorConfig,
    metrics: StreamMetrics,
}

impl Aggregator {
    pub fn new(
        registry: Arc<TickerRegistry>,
        sink: Arc<dyn AggregateSink>,
        config: AggregatorConfig,
        metrics: StreamMetrics,
    ) -> Self {
        Self {
            registry,
            sink,
            dispatcher: None,
            config,
            metrics,
        }
    }

    /// Also push each record to interested subscribers as `price_average`
    pub fn with_dispatcher(mut self, dispatcher: Arc<BroadcastDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Aggregate the window `[now - period, now]` for every ticker
    pub async fn run_once(&self, now: DateTime<Utc>) -> AggregationReport {
        let mut report = AggregationReport::default();
        let window_start = match now.checked_sub_signed(to_chrono(self.config.period)) {
            Some(start) => start,
            None => return report,
        };

        let history = self.registry.history();
        let mut records = Vec::new();
        for symbol in self.registry.symbols() {
            match history.mean_since(&symbol, window_start) {
                Ok((mean, count)) => records.push(AggregateRecord {
                    ticker: symbol,
                    window_start,
                    window_end: now,
                    mean_price: mean.round_dp(2),
                    sample_count: count,
                }),
                Err(e) => {
                    tracing::debug!("Skipping aggregate: {}", e);
                    report.skipped += 1;
                }
            }
        }

        let timeout = self.config.sink_timeout;
        let stores = records.iter().map(|record| async move {
            match tokio::time::timeout(timeout, self.sink.store_aggregate(record)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(timeout)),
            }
        });
        let results = join_all(stores).await;

        for (record, result) in records.iter().zip(results) {
            match result {
                Ok(()) => {
                    report.stored += 1;
                    tracing::debug!("{} stored via {} sink", record, self.sink.name());
                }
                Err(e) => {
                    report.failed += 1;
                    ErrorReporter::report(
                        &StreamError::from(e),
                        &format!("Storing aggregate for {}", record.ticker),
                    );
                }
            }
        }

        self.metrics.aggregates_stored.inc_by(report.stored as u64);
        self.metrics.sink_failures.inc_by(report.failed as u64);

        if self.config.publish {
            if let Some(dispatcher) = &self.dispatcher {
                for record in &records {
                    dispatcher.publish_aggregate(record).await;
                }
            }
        }

        report.records = records;
        report
    }

    /// Aggregate once per period until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.period);
        // First tick fires immediately
        ticker.tick().await;

        tracing::info!(
            "Aggregator started: period {:?}, sink {}",
            self.config.period,
            self.sink.name()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_once(Utc::now()).await;
                    tracing::info!(
                        "Aggregation pass: {} stored, {} failed, {} skipped",
                        report.stored,
                        report.failed,
                        report.skipped
                    );
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Aggregator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryRing;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_mean_over_window() {
        let history = Arc::new(HistoryRing::new(std::time::Duration::from_secs(900), 1000));
        let registry = Arc::new(TickerRegistry::new(
            vec![("MSFT".to_string(), dec!(380.25))],
            Arc::clone(&history),
            at(-1000),
        ));
        for (i, price) in [dec!(284.00), dec!(284.50), dec!(284.56), dec!(284.70), dec!(285.04)]
            .into_iter()
            .enumerate()
        {
            registry.set("MSFT", price, at(i as i64 * 60)).unwrap();
        }

        let sink = Arc::new(MemorySink::new());
        let aggregator = Aggregator::new(
            registry,
            sink.clone(),
            AggregatorConfig::default(),
            StreamMetrics::new(),
        );

        let report = aggregator.run_once(at(240) + Duration::seconds(1)).await;
        assert_eq!(report.stored, 1);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mean_price, dec!(284.56));
        assert_eq!(records[0].sample_count, 5);
    }

    #[tokio::test]
    async fn test_ticker_without_samples_is_skipped() {
        let history = Arc::new(HistoryRing::new(std::time::Duration::from_secs(900), 1000));
        let registry = Arc::new(TickerRegistry::new(
            vec![("INTC".to_string(), dec!(58.25))],
            history,
            at(0),
        ));
        let aggregator = Aggregator::new(
            registry,
            Arc::new(MemorySink::new()),
            AggregatorConfig::default(),
            StreamMetrics::new(),
        );

        let report = aggregator.run_once(at(3600)).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.stored, 0);
    }
}
