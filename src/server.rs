//! WebSocket price stream server
//!
//! Owns the shared state and wires the background tasks together: the price
//! engine, the aggregator, the history cleanup timer and the accept loop. All
//! of them stop when the shutdown watch flips.

use crate::{
    aggregator::{AggregateSink, Aggregator},
    alerts::AlertDetector,
    config::ServerConfig,
    dispatcher::BroadcastDispatcher,
    engine::PriceEngine,
    error::StreamError,
    generator::{PriceGenerator, PriceSource},
    history::HistoryRing,
    registry::TickerRegistry,
    session::{serve_connection, SessionContext},
    subscription::SubscriptionRegistry,
    telemetry::StreamMetrics,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub struct StreamServer {
    config: ServerConfig,
    history: Arc<HistoryRing>,
    registry: Arc<TickerRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
    sink: Arc<dyn AggregateSink>,
    metrics: StreamMetrics,
}

impl StreamServer {
    pub fn new(config: ServerConfig, sink: Arc<dyn AggregateSink>) -> Self {
        let metrics = StreamMetrics::new();
        let history = Arc::new(
            HistoryRing::from_config(&config.history).with_protected_span(config.longest_lookback()),
        );
        let registry = Arc::new(TickerRegistry::new(
            config.tickers.clone(),
            Arc::clone(&history),
            Utc::now(),
        ));
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            Arc::clone(&subscriptions),
            config.session.send_timeout,
            metrics.clone(),
        ));

        Self {
            config,
            history,
            registry,
            subscriptions,
            dispatcher,
            sink,
            metrics,
        }
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            subscriptions: Arc::clone(&self.subscriptions),
            registry: Arc::clone(&self.registry),
            config: self.config.session.clone(),
            history_limit: self.config.history.response_limit,
        }
    }

    pub fn engine(&self, source: Box<dyn PriceSource>) -> PriceEngine {
        PriceEngine::new(
            source,
            Arc::clone(&self.registry),
            AlertDetector::new(&self.config.alerts),
            Arc::clone(&self.dispatcher),
            self.metrics.clone(),
        )
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.sink),
            self.config.aggregator.clone(),
            self.metrics.clone(),
        )
        .with_dispatcher(Arc::clone(&self.dispatcher))
    }

    /// Serve with the synthetic price generator
    pub async fn run(self, listener: TcpListener, shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        let source = Box::new(PriceGenerator::new(self.config.generator.clone()));
        self.run_with_source(listener, source, shutdown).await
    }

    /// Serve until shutdown, pulling prices from `source`
    pub async fn run_with_source(
        self,
        listener: TcpListener,
        source: Box<dyn PriceSource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), StreamError> {
        let address = listener.local_addr()?;
        tracing::info!(
            "Price stream listening on ws://{} with {} tickers",
            address,
            self.registry.len()
        );

        let engine = tokio::spawn(self.engine(source).run(shutdown.clone()));
        let aggregator = tokio::spawn(self.aggregator().run(shutdown.clone()));
        let cleanup = tokio::spawn(cleanup_loop(
            Arc::clone(&self.history),
            Arc::clone(&self.subscriptions),
            self.metrics.clone(),
            self.config.history.cleanup_interval,
            shutdown.clone(),
        ));

        let context = self.session_context();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(stream, peer, context.clone(), shutdown.clone()));
                    }
                    Err(e) => tracing::warn!("Failed to accept connection: {}", e),
                },
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Shutting down price stream");
        let _ = tokio::join!(engine, aggregator, cleanup);
        tracing::info!("Final metrics: {}", self.metrics.summary());
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TickerRegistry> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn dispatcher(&self) -> &Arc<BroadcastDispatcher> {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }
}

/// Evict expired samples for tickers that stopped updating and log metrics
async fn cleanup_loop(
    history: Arc<HistoryRing>,
    subscriptions: Arc<SubscriptionRegistry>,
    metrics: StreamMetrics,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = history.prune(Utc::now());
                metrics.subscribers_connected.set(subscriptions.len() as i64);
                tracing::info!("History cleanup evicted {} samples; {}", evicted, metrics.summary());
            }
            _ = shutdown.changed() => break,
        }
    }
}
