//! Price engine: the single writer of the ticker registry
//!
//! Each tick pulls quotes from the configured source, commits them, evaluates
//! alerts against the freshly committed samples and then publishes the price
//! update followed by any alerts, so subscribers always see a price before the
//! alert it triggered.

use crate::{
    alerts::AlertDetector,
    data::{AlertEvent, PriceBatch, Quote},
    dispatcher::{BroadcastDispatcher, DispatchReport},
    error::{ErrorReporter, StreamError},
    generator::PriceSource,
    registry::TickerRegistry,
    telemetry::StreamMetrics,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub committed: usize,
    pub rejected: usize,
    pub alerts: Vec<AlertEvent>,
    pub prices: DispatchReport,
}

pub struct PriceEngine {
    source: Box<dyn PriceSource>,
    registry: Arc<TickerRegistry>,
    detector: AlertDetector,
    dispatcher: Arc<BroadcastDispatcher>,
    metrics: StreamMetrics,
}

impl PriceEngine {
    pub fn new(
        source: Box<dyn PriceSource>,
        registry: Arc<TickerRegistry>,
        detector: AlertDetector,
        dispatcher: Arc<BroadcastDispatcher>,
        metrics: StreamMetrics,
    ) -> Self {
        Self {
            source,
            registry,
            detector,
            dispatcher,
            metrics,
        }
    }

    /// Commit one batch of quotes and publish the result
    pub async fn process_quotes(&mut self, quotes: Vec<Quote>, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let mut batch = PriceBatch::new(now);

        for quote in quotes {
            match self.registry.set(&quote.symbol, quote.price, now) {
                Ok(()) => batch.insert(&quote.symbol, quote.price),
                Err(e) => {
                    report.rejected += 1;
                    ErrorReporter::report(&StreamError::from(e), "Committing quote");
                }
            }
        }
        report.committed = batch.len();

        if batch.is_empty() {
            return report;
        }
        self.metrics.ticks.inc();

        let history = self.registry.history();
        for (symbol, price) in &batch.prices {
            if let Some(alert) = self.detector.evaluate(history, symbol, *price, now) {
                report.alerts.push(alert);
            }
        }

        report.prices = self.dispatcher.publish_prices(&batch).await;
        for alert in &report.alerts {
            self.dispatcher.publish_alert(alert).await;
        }
        self.metrics.alerts.inc_by(report.alerts.len() as u64);

        tracing::debug!(
            "Tick: {} prices committed, {} alerts, {} subscribers reached",
            report.committed,
            report.alerts.len(),
            report.prices.delivered
        );

        report
    }

    /// Wait for the source's next batch and process it.
    ///
    /// Returns `None` when the source is exhausted.
    pub async fn tick(&mut self) -> Option<TickReport> {
        let current = self.registry.latest_prices();
        let quotes = self.source.next_quotes(&current).await?;
        Some(self.process_quotes(quotes, Utc::now()).await)
    }

    /// Tick until the source ends or shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Price engine started: {} tickers from {} source",
            self.registry.len(),
            self.source.name()
        );

        loop {
            let current = self.registry.latest_prices();
            let quotes = tokio::select! {
                quotes = self.source.next_quotes(&current) => quotes,
                _ = shutdown.changed() => break,
            };

            match quotes {
                Some(quotes) => {
                    self.process_quotes(quotes, Utc::now()).await;
                }
                None => {
                    tracing::info!("Price source {} exhausted", self.source.name());
                    break;
                }
            }
        }

        tracing::info!("Price engine stopped");
    }

    pub fn registry(&self) -> &Arc<TickerRegistry> {
        &self.registry
    }
}
