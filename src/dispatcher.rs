//! Broadcast dispatcher
//!
//! Every publish follows the same pattern: take a snapshot of the
//! subscription registry, build the per-subscriber message from its interest,
//! push to all targets concurrently with a per-push timeout, then remove the
//! subscribers whose push failed. The live registry is only touched through
//! `remove`, never iterated.

use crate::{
    data::{AggregateRecord, AlertEvent, Interest, PriceBatch},
    error::TransportError,
    protocol::OutboundMessage,
    subscription::SubscriptionRegistry,
    telemetry::StreamMetrics,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that had something to receive
    pub targeted: usize,
    pub delivered: usize,
    /// Subscribers dropped from the registry during this publish
    pub removed: usize,
}

pub struct BroadcastDispatcher {
    subscriptions: Arc<SubscriptionRegistry>,
    send_timeout: Duration,
    metrics: StreamMetrics,
}

impl BroadcastDispatcher {
    pub fn new(subscriptions: Arc<SubscriptionRegistry>, send_timeout: Duration, metrics: StreamMetrics) -> Self {
        Self {
            subscriptions,
            send_timeout,
            metrics,
        }
    }

    /// Push one tick's prices, filtered by each subscriber's interest
    pub async fn publish_prices(&self, batch: &PriceBatch) -> DispatchReport {
        self.fan_out(|interest| {
            let data = interest.filter_prices(&batch.prices);
            if data.is_empty() {
                None
            } else {
                Some(OutboundMessage::price_update(batch, data))
            }
        })
        .await
    }

    pub async fn publish_alert(&self, alert: &AlertEvent) -> DispatchReport {
        let message = OutboundMessage::alert(alert);
        self.fan_out(|interest| interest.includes(&alert.ticker).then(|| message.clone()))
            .await
    }

    pub async fn publish_aggregate(&self, record: &AggregateRecord) -> DispatchReport {
        let message = OutboundMessage::average(record);
        self.fan_out(|interest| interest.includes(&record.ticker).then(|| message.clone()))
            .await
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    async fn fan_out<F>(&self, build: F) -> DispatchReport
    where
        F: Fn(&Interest) -> Option<OutboundMessage>,
    {
        let snapshot = self.subscriptions.snapshot();
        let mut report = DispatchReport::default();
        let mut pushes = Vec::with_capacity(snapshot.len());

        for subscriber in snapshot {
            if !subscriber.alive || subscriber.transport.is_closed() {
                if self.subscriptions.remove(subscriber.id) {
                    report.removed += 1;
                }
                continue;
            }

            let message = match build(&subscriber.interest) {
                Some(message) => message,
                None => continue,
            };
            report.targeted += 1;

            let timeout = self.send_timeout;
            pushes.push(async move {
                let result = match tokio::time::timeout(timeout, subscriber.transport.push(message)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(timeout)),
                };
                (subscriber.id, result)
            });
        }

        for (id, result) in join_all(pushes).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Dropping subscriber {}: {}", id, e);
                    if self.subscriptions.remove(id) {
                        report.removed += 1;
                    }
                }
            }
        }

        self.metrics.messages_sent.inc_by(report.delivered as u64);
        self.metrics.subscribers_dropped.inc_by(report.removed as u64);
        self.metrics
            .subscribers_connected
            .set(self.subscriptions.len() as i64);

        report
    }
}
