//! Ticker registry: the fixed universe of symbols and their last price
//!
//! Only the price engine calls [`TickerRegistry::set`]; every commit is mirrored
//! into the shared [`HistoryRing`].

use crate::{
    data::{Sample, Ticker},
    error::RegistryError,
    history::HistoryRing,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Last-known prices for a fixed set of tickers
#[derive(Debug)]
pub struct TickerRegistry {
    tickers: RwLock<HashMap<String, Ticker>>,
    history: Arc<HistoryRing>,
}

impl TickerRegistry {
    /// Build the universe; each initial price is also the first history sample.
    pub fn new<I>(universe: I, history: Arc<HistoryRing>, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (String, Decimal)>,
    {
        let mut tickers = HashMap::new();
        for (symbol, price) in universe {
            history.append(&symbol, Sample::new(now, price));
            tickers.insert(
                symbol.clone(),
                Ticker {
                    symbol,
                    price,
                    updated_at: now,
                },
            );
        }

        tracing::debug!("Ticker registry initialised with {} symbols", tickers.len());

        Self {
            tickers: RwLock::new(tickers),
            history,
        }
    }

    /// Current price for `symbol`
    pub fn get(&self, symbol: &str) -> Result<Decimal, RegistryError> {
        self.tickers
            .read()
            .get(symbol)
            .map(|t| t.price)
            .ok_or_else(|| RegistryError::NotFound(symbol.to_string()))
    }

    /// Full record for `symbol`
    pub fn ticker(&self, symbol: &str) -> Result<Ticker, RegistryError> {
        self.tickers
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(symbol.to_string()))
    }

    /// Commit a new price and record it in history
    pub fn set(&self, symbol: &str, price: Decimal, timestamp: DateTime<Utc>) -> Result<(), RegistryError> {
        if price <= Decimal::ZERO {
            return Err(RegistryError::InvalidPrice {
                symbol: symbol.to_string(),
                price: price.to_string(),
            });
        }

        {
            let mut tickers = self.tickers.write();
            let ticker = tickers
                .get_mut(symbol)
                .ok_or_else(|| RegistryError::NotFound(symbol.to_string()))?;
            ticker.price = price;
            ticker.updated_at = timestamp;
        }

        self.history.append(symbol, Sample::new(timestamp, price));
        Ok(())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.tickers.read().contains_key(symbol)
    }

    /// Sorted symbol list
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.tickers.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Point-in-time copy of every current price
    pub fn latest_prices(&self) -> BTreeMap<String, Decimal> {
        self.tickers
            .read()
            .values()
            .map(|t| (t.symbol.clone(), t.price))
            .collect()
    }

    pub fn history(&self) -> &Arc<HistoryRing> {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.tickers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
