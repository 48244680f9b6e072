//! Per-ticker price history
//!
//! Each symbol keeps a time-ordered `VecDeque` of samples. Appends trim from
//! the front once the oldest sample falls outside the retention window, so
//! lookups only ever see samples that are still relevant. The whole ring sits
//! behind one `RwLock`: the engine task is the only writer, everyone else reads.

use crate::{
    config::HistoryConfig,
    data::{percent_change, HistoryPoint, Sample},
    error::HistoryError,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Bounded, time-ordered sample buffers keyed by symbol
#[derive(Debug)]
pub struct HistoryRing {
    series: RwLock<HashMap<String, VecDeque<Sample>>>,
    retention: chrono::Duration,
    max_samples: usize,
    /// Span behind the newest sample that the capacity cap never evicts
    protected: chrono::Duration,
}

impl HistoryRing {
    pub fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            retention: to_chrono(retention),
            max_samples: max_samples.max(1),
            protected: chrono::Duration::zero(),
        }
    }

    /// Keep every sample a lookback of `span` still needs, even past capacity.
    ///
    /// That is every sample inside `[newest - span, newest]` plus the one just
    /// before it, which `price_at_or_before` resolves to.
    pub fn with_protected_span(mut self, span: Duration) -> Self {
        self.protected = to_chrono(span);
        self
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.retention, config.max_samples)
    }

    /// Record a sample, keeping the series ordered and within retention
    pub fn append(&self, symbol: &str, sample: Sample) {
        let mut series = self.series.write();
        let samples = series.entry(symbol.to_string()).or_default();

        match samples.back() {
            Some(last) if last.timestamp > sample.timestamp => {
                let index = samples.partition_point(|s| s.timestamp <= sample.timestamp);
                samples.insert(index, sample);
            }
            _ => samples.push_back(sample),
        }

        let newest = samples.back().map(|s| s.timestamp).unwrap_or(sample.timestamp);
        if let Some(cutoff) = newest.checked_sub_signed(self.retention) {
            Self::trim(samples, cutoff);
        }

        let floor = if self.protected > chrono::Duration::zero() {
            newest.checked_sub_signed(self.protected)
        } else {
            None
        };
        while samples.len() > self.max_samples {
            if let (Some(floor), Some(next)) = (floor, samples.get(1)) {
                if next.timestamp > floor {
                    if samples.len() == self.max_samples + 1 {
                        tracing::warn!(
                            "History for {} exceeds capacity {} inside the {}s lookback; keeping samples",
                            symbol,
                            self.max_samples,
                            self.protected.num_seconds()
                        );
                    }
                    break;
                }
            }
            samples.pop_front();
        }
    }

    /// Newest price with a timestamp at or before `at`
    pub fn price_at_or_before(&self, symbol: &str, at: DateTime<Utc>) -> Result<Decimal, HistoryError> {
        let series = self.series.read();
        let samples = series
            .get(symbol)
            .ok_or_else(|| HistoryError::Unavailable(symbol.to_string()))?;

        let index = samples.partition_point(|s| s.timestamp <= at);
        if index == 0 {
            return Err(HistoryError::Unavailable(symbol.to_string()));
        }
        Ok(samples[index - 1].price)
    }

    /// Mean price and count of samples with a timestamp at or after `since`
    pub fn mean_since(&self, symbol: &str, since: DateTime<Utc>) -> Result<(Decimal, usize), HistoryError> {
        let series = self.series.read();
        let samples = series
            .get(symbol)
            .ok_or_else(|| HistoryError::Empty(symbol.to_string()))?;

        let start = samples.partition_point(|s| s.timestamp < since);
        let count = samples.len() - start;
        if count == 0 {
            return Err(HistoryError::Empty(symbol.to_string()));
        }

        let sum: Decimal = samples.range(start..).map(|s| s.price).sum();
        Ok((sum / Decimal::from(count), count))
    }

    /// Last `limit` samples, each with its change against the sample before it
    pub fn recent(&self, symbol: &str, limit: usize) -> Vec<HistoryPoint> {
        let series = self.series.read();
        let samples = match series.get(symbol) {
            Some(samples) if limit > 0 => samples,
            _ => return Vec::new(),
        };

        let start = samples.len().saturating_sub(limit);
        (start..samples.len())
            .map(|i| {
                let sample = samples[i];
                let previous = if i > 0 { samples[i - 1].price } else { sample.price };
                HistoryPoint {
                    timestamp: sample.timestamp,
                    price: sample.price,
                    change_percent: percent_change(previous, sample.price)
                        .map(|c| c.round_dp(4))
                        .unwrap_or(Decimal::ZERO),
                }
            })
            .collect()
    }

    /// Drop samples that expired relative to `now`. Returns how many were evicted.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = match now.checked_sub_signed(self.retention) {
            Some(cutoff) => cutoff,
            None => return 0,
        };
        let mut series = self.series.write();
        series
            .values_mut()
            .map(|samples| Self::trim(samples, cutoff))
            .sum()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.series.read().get(symbol).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    fn trim(samples: &mut VecDeque<Sample>, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        while samples.front().map_or(false, |s| s.timestamp < cutoff) {
            samples.pop_front();
            evicted += 1;
        }
        evicted
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::from_config(&HistoryConfig::default())
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}
