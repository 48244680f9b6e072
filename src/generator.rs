//! Price sources
//!
//! The engine pulls one batch of quotes per tick from a [`PriceSource`]. Two
//! sources ship with the crate: [`PriceGenerator`], a seeded random walk on a
//! jittered timer, and [`FeedSource`], which forwards externally supplied
//! quotes from a channel.

use crate::{config::GeneratorConfig, data::Quote};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Where the engine gets its prices from
#[async_trait]
pub trait PriceSource: Send {
    /// Next set of quotes given the currently committed prices.
    ///
    /// Returns `None` once the source is exhausted; the engine stops.
    async fn next_quotes(&mut self, current: &BTreeMap<String, Decimal>) -> Option<Vec<Quote>>;

    fn name(&self) -> &str;
}

/// Synthetic random walk, one move per ticker per tick
pub struct PriceGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl PriceGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    /// Jittered delay before the next tick
    pub fn next_interval(&mut self) -> Duration {
        let min = self.config.min_interval.as_millis() as u64;
        let max = self.config.max_interval.as_millis() as u64;
        if max <= min {
            return self.config.min_interval;
        }
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    /// Move one price by a bounded random percentage
    pub fn next_price(&mut self, last: Decimal) -> Decimal {
        let volatility = self
            .rng
            .gen_range(self.config.min_volatility..=self.config.max_volatility);
        let direction = if self.rng.gen_bool(self.config.up_bias) { 1.0 } else { -1.0 };
        let magnitude = self.rng.gen_range(0.1..=1.0);
        let change = direction * volatility * magnitude;

        let factor = Decimal::try_from(1.0 + change).unwrap_or(Decimal::ONE);
        let next = (last * factor).round_dp(2);
        next.max(self.config.price_floor)
    }

    /// Draw a new price for every ticker in `current`, in symbol order
    pub fn draw(&mut self, current: &BTreeMap<String, Decimal>) -> Vec<Quote> {
        current
            .iter()
            .map(|(symbol, price)| Quote::new(symbol, self.next_price(*price)))
            .collect()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

#[async_trait]
impl PriceSource for PriceGenerator {
    async fn next_quotes(&mut self, current: &BTreeMap<String, Decimal>) -> Option<Vec<Quote>> {
        let delay = self.next_interval();
        tokio::time::sleep(delay).await;
        Some(self.draw(current))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Externally supplied quotes, one batch per message
pub struct FeedSource {
    receiver: mpsc::Receiver<Vec<Quote>>,
}

impl FeedSource {
    pub fn new(receiver: mpsc::Receiver<Vec<Quote>>) -> Self {
        Self { receiver }
    }

    /// Sender half for the feed plus the source to hand to the engine
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<Quote>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl PriceSource for FeedSource {
    async fn next_quotes(&mut self, _current: &BTreeMap<String, Decimal>) -> Option<Vec<Quote>> {
        self.receiver.recv().await
    }

    fn name(&self) -> &str {
        "feed"
    }
}
