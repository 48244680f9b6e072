//! Data models for tickers, samples and the events derived from them

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A tracked symbol and its last committed price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticker[{}]: {} @ {}", self.symbol, self.price, self.updated_at)
    }
}

/// One point in a ticker's price history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// A single price draw from a source, before it is committed
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
}

impl Quote {
    pub fn new(symbol: &str, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
        }
    }
}

/// Prices committed during one tick
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBatch {
    pub prices: BTreeMap<String, Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl PriceBatch {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            prices: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn insert(&mut self, symbol: &str, price: Decimal) {
        self.prices.insert(symbol.to_string(), price);
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }
}

/// Raised when a ticker climbs faster than the alert threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub ticker: String,
    /// Rounded to two decimal places
    pub change_percent: Decimal,
    pub current_price: Decimal,
    pub previous_price: Decimal,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Alert[{}]: {} -> {} ({}%) @ {}",
            self.ticker, self.previous_price, self.current_price, self.change_percent, self.timestamp
        )
    }
}

/// Mean price of one ticker over one aggregation window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateRecord {
    pub ticker: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub mean_price: Decimal,
    pub sample_count: usize,
}

impl fmt::Display for AggregateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Aggregate[{}]: mean={} over {} samples [{} .. {}]",
            self.ticker, self.mean_price, self.sample_count, self.window_start, self.window_end
        )
    }
}

/// History entry returned to clients asking for `get_history`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    /// Change against the preceding sample
    pub change_percent: Decimal,
}

/// Which tickers a subscriber wants pushed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Interest {
    #[default]
    All,
    Tickers(BTreeSet<String>),
}

impl Interest {
    /// An empty list means every ticker.
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = symbols.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Interest::All
        } else {
            Interest::Tickers(set)
        }
    }

    pub fn includes(&self, symbol: &str) -> bool {
        match self {
            Interest::All => true,
            Interest::Tickers(set) => set.contains(symbol),
        }
    }

    /// Subset of `prices` this interest covers
    pub fn filter_prices(&self, prices: &BTreeMap<String, Decimal>) -> BTreeMap<String, Decimal> {
        match self {
            Interest::All => prices.clone(),
            Interest::Tickers(set) => prices
                .iter()
                .filter(|(symbol, _)| set.contains(symbol.as_str()))
                .map(|(symbol, price)| (symbol.clone(), *price))
                .collect(),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        match self {
            Interest::All => Vec::new(),
            Interest::Tickers(set) => set.iter().cloned().collect(),
        }
    }
}

/// Lifecycle of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Registered, receiving every ticker
    Connected,
    /// Interest narrowed by an explicit subscribe
    Subscribed,
    /// Terminal
    Disconnected,
}

impl fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberState::Connected => write!(f, "CONNECTED"),
            SubscriberState::Subscribed => write!(f, "SUBSCRIBED"),
            SubscriberState::Disconnected => write!(f, "DISCONNECTED"),
        }
    }
}

/// Percentage change from `previous` to `current`; `None` when `previous` is zero.
pub fn percent_change(previous: Decimal, current: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    Some((current - previous) / previous * Decimal::ONE_HUNDRED)
}
