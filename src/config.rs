//! Server configuration
//!
//! Every section has a `Default` matching the reference deployment and a
//! `validate()` that reports the first problem found. `ServerConfig::from_env`
//! layers `TRADEOPS_*` environment variables (and a `.env` file, if present)
//! over the defaults.

use crate::error::StreamError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;

/// Starting universe used when no tickers are configured
pub fn default_tickers() -> Vec<(String, Decimal)> {
    vec![
        ("AAPL".to_string(), dec!(175.50)),
        ("GOOGL".to_string(), dec!(2650.00)),
        ("MSFT".to_string(), dec!(380.25)),
        ("TSLA".to_string(), dec!(845.30)),
        ("AMZN".to_string(), dec!(3200.75)),
        ("META".to_string(), dec!(485.60)),
        ("NFLX".to_string(), dec!(380.90)),
        ("NVDA".to_string(), dec!(875.40)),
        ("AMD".to_string(), dec!(165.80)),
        ("INTC".to_string(), dec!(58.25)),
    ]
}

/// Synthetic price walk parameters
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Lower bound of the per-tick volatility draw (fraction, 0.005 = 0.5%)
    pub min_volatility: f64,
    /// Upper bound of the per-tick volatility draw
    pub max_volatility: f64,
    /// Probability that a move is upwards
    pub up_bias: f64,
    pub price_floor: Decimal,
    /// Fixed seed for reproducible walks
    pub seed: Option<u64>,
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_interval.is_zero() {
            return Err("Tick interval must be greater than 0".to_string());
        }

        if self.max_interval < self.min_interval {
            return Err("Max tick interval must be greater than or equal to min tick interval".to_string());
        }

        if !(self.min_volatility > 0.0 && self.max_volatility < 1.0) {
            return Err("Volatility bounds must lie in (0, 1)".to_string());
        }

        if self.max_volatility < self.min_volatility {
            return Err("Max volatility must be greater than or equal to min volatility".to_string());
        }

        if !(0.0..=1.0).contains(&self.up_bias) {
            return Err("Up bias must be a probability in [0, 1]".to_string());
        }

        if self.price_floor <= Decimal::ZERO {
            return Err("Price floor must be positive".to_string());
        }

        Ok(())
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(3),
            min_volatility: 0.005,
            max_volatility: 0.02,
            up_bias: 0.5,
            price_floor: dec!(0.01),
            seed: None,
        }
    }
}

/// Rolling-change alert parameters
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Percent increase that must be exceeded
    pub threshold_percent: Decimal,
    pub lookback: Duration,
    /// Minimum gap between two alerts for the same ticker; `None` alerts every tick
    pub cooldown: Option<Duration>,
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold_percent <= Decimal::ZERO {
            return Err("Alert threshold must be positive".to_string());
        }

        if self.lookback.is_zero() {
            return Err("Alert lookback must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold_percent: dec!(2.0),
            lookback: Duration::from_secs(60),
            cooldown: None,
        }
    }
}

/// Periodic average parameters
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub period: Duration,
    /// Upper bound on a single sink call
    pub sink_timeout: Duration,
    /// Also push each record to subscribers as `price_average`
    pub publish: bool,
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.period.is_zero() {
            return Err("Aggregation period must be greater than 0".to_string());
        }

        if self.sink_timeout.is_zero() {
            return Err("Sink timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(300),
            sink_timeout: Duration::from_secs(5),
            publish: true,
        }
    }
}

/// History ring retention
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub retention: Duration,
    pub max_samples: usize,
    /// How often expired samples are swept for idle tickers
    pub cleanup_interval: Duration,
    /// Entries returned by `get_history`
    pub response_limit: usize,
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.retention.is_zero() {
            return Err("History retention must be greater than 0".to_string());
        }

        if self.max_samples == 0 {
            return Err("History capacity must be greater than 0".to_string());
        }

        if self.cleanup_interval.is_zero() {
            return Err("Cleanup interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(600),
            max_samples: 2048,
            cleanup_interval: Duration::from_secs(3600),
            response_limit: 20,
        }
    }
}

/// Per-connection parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on one push to one subscriber
    pub send_timeout: Duration,
    /// Idle time before the server pings a silent client
    pub heartbeat_interval: Duration,
    /// Outbound queue depth per connection
    pub outbound_buffer: usize,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.send_timeout.is_zero() {
            return Err("Send timeout must be greater than 0".to_string());
        }

        if self.heartbeat_interval.is_zero() {
            return Err("Heartbeat interval must be greater than 0".to_string());
        }

        if self.outbound_buffer == 0 {
            return Err("Outbound buffer must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
            outbound_buffer: 256,
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tickers: Vec<(String, Decimal)>,
    pub log_level: tracing::Level,
    pub generator: GeneratorConfig,
    pub alerts: AlertConfig,
    pub aggregator: AggregatorConfig,
    pub history: HistoryConfig,
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Widest window any history reader looks back over
    pub fn longest_lookback(&self) -> Duration {
        std::cmp::max(self.alerts.lookback, self.aggregator.period)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        if self.tickers.is_empty() {
            return Err("At least one ticker must be configured".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for (symbol, price) in &self.tickers {
            if symbol.is_empty() {
                return Err("Ticker symbol cannot be empty".to_string());
            }
            if !seen.insert(symbol.as_str()) {
                return Err(format!("Duplicate ticker: {}", symbol));
            }
            if *price <= Decimal::ZERO {
                return Err(format!("Initial price for {} must be positive", symbol));
            }
        }

        self.generator.validate()?;
        self.alerts.validate()?;
        self.aggregator.validate()?;
        self.history.validate()?;
        self.session.validate()?;

        let longest_lookback = self.longest_lookback();
        if self.history.retention < longest_lookback {
            return Err(format!(
                "History retention ({:?}) must cover the longest lookback ({:?})",
                self.history.retention, longest_lookback
            ));
        }

        let capacity = u32::try_from(self.history.max_samples).unwrap_or(u32::MAX);
        let covered = self.generator.min_interval.saturating_mul(capacity);
        if covered < longest_lookback {
            return Err(format!(
                "History capacity of {} samples at one per {:?} covers only {:?}, less than the longest lookback ({:?})",
                self.history.max_samples, self.generator.min_interval, covered, longest_lookback
            ));
        }

        Ok(())
    }

    /// Load configuration from `TRADEOPS_*` environment variables.
    ///
    /// Unset variables keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self, StreamError> {
        let _ = dotenvy::dotenv();

        let mut config = ServerConfig::default();

        if let Some(host) = env_var("TRADEOPS_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse::<u16>("TRADEOPS_PORT")? {
            config.port = port;
        }
        if let Some(raw) = env_var("TRADEOPS_TICKERS") {
            config.tickers = parse_tickers(&raw)?;
        }
        if let Some(level) = env_var("TRADEOPS_LOG_LEVEL") {
            config.log_level = tracing::Level::from_str(&level)
                .map_err(|_| StreamError::Configuration(format!("Invalid log level: {}", level)))?;
        }

        if let Some(ms) = env_parse::<u64>("TRADEOPS_TICK_MIN_MS")? {
            config.generator.min_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("TRADEOPS_TICK_MAX_MS")? {
            config.generator.max_interval = Duration::from_millis(ms);
        }
        if let Some(bias) = env_parse::<f64>("TRADEOPS_UP_BIAS")? {
            config.generator.up_bias = bias;
        }
        if let Some(seed) = env_parse::<u64>("TRADEOPS_SEED")? {
            config.generator.seed = Some(seed);
        }

        if let Some(threshold) = env_parse::<Decimal>("TRADEOPS_ALERT_THRESHOLD_PERCENT")? {
            config.alerts.threshold_percent = threshold;
        }
        if let Some(secs) = env_parse::<u64>("TRADEOPS_ALERT_LOOKBACK_SECS")? {
            config.alerts.lookback = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("TRADEOPS_ALERT_COOLDOWN_SECS")? {
            config.alerts.cooldown = Some(Duration::from_secs(secs));
        }

        if let Some(secs) = env_parse::<u64>("TRADEOPS_AGGREGATE_PERIOD_SECS")? {
            config.aggregator.period = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("TRADEOPS_SINK_TIMEOUT_MS")? {
            config.aggregator.sink_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = env_parse::<u64>("TRADEOPS_HISTORY_RETENTION_SECS")? {
            config.history.retention = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse::<usize>("TRADEOPS_HISTORY_MAX_SAMPLES")? {
            config.history.max_samples = max;
        }

        if let Some(ms) = env_parse::<u64>("TRADEOPS_SEND_TIMEOUT_MS")? {
            config.session.send_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("TRADEOPS_HEARTBEAT_SECS")? {
            config.session.heartbeat_interval = Duration::from_secs(secs);
        }

        config.validate().map_err(StreamError::Configuration)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            tickers: default_tickers(),
            log_level: tracing::Level::INFO,
            generator: GeneratorConfig::default(),
            alerts: AlertConfig::default(),
            aggregator: AggregatorConfig::default(),
            history: HistoryConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Builder for `ServerConfig`
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn tickers(mut self, tickers: Vec<(String, Decimal)>) -> Self {
        self.config.tickers = tickers;
        self
    }

    pub fn ticker(mut self, symbol: &str, price: Decimal) -> Self {
        self.config.tickers.push((symbol.to_string(), price));
        self
    }

    pub fn tick_interval(mut self, min: Duration, max: Duration) -> Self {
        self.config.generator.min_interval = min;
        self.config.generator.max_interval = max;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.generator.seed = Some(seed);
        self
    }

    pub fn alert_threshold(mut self, percent: Decimal) -> Self {
        self.config.alerts.threshold_percent = percent;
        self
    }

    pub fn alert_lookback(mut self, lookback: Duration) -> Self {
        self.config.alerts.lookback = lookback;
        self
    }

    pub fn alert_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.alerts.cooldown = Some(cooldown);
        self
    }

    pub fn aggregate_period(mut self, period: Duration) -> Self {
        self.config.aggregator.period = period;
        self
    }

    pub fn sink_timeout(mut self, timeout: Duration) -> Self {
        self.config.aggregator.sink_timeout = timeout;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.history.retention = retention;
        self
    }

    pub fn max_samples(mut self, max_samples: usize) -> Self {
        self.config.history.max_samples = max_samples;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.send_timeout = timeout;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.session.heartbeat_interval = interval;
        self
    }

    pub fn build(self) -> Result<ServerConfig, StreamError> {
        self.config.validate().map_err(StreamError::Configuration)?;
        Ok(self.config)
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `"AAPL=175.50,GOOGL=2650"` into a ticker universe
pub fn parse_tickers(raw: &str) -> Result<Vec<(String, Decimal)>, StreamError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (symbol, price) = entry.split_once('=').ok_or_else(|| {
                StreamError::Configuration(format!("Ticker entry must be SYMBOL=PRICE: {}", entry))
            })?;
            let price = Decimal::from_str(price.trim()).map_err(|e| {
                StreamError::Configuration(format!("Invalid price for {}: {}", symbol, e))
            })?;
            Ok((symbol.trim().to_uppercase(), price))
        })
        .collect()
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, StreamError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| StreamError::Configuration(format!("Invalid {}: {}", key, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert_eq!(ServerConfig::default().tickers.len(), 10);
    }

    #[test]
    fn test_retention_must_cover_aggregate_period() {
        let result = ServerConfig::builder()
            .aggregate_period(Duration::from_secs(900))
            .retention(Duration::from_secs(600))
            .build();
        assert!(matches!(result, Err(StreamError::Configuration(_))));
    }

    #[test]
    fn test_parse_tickers() {
        let tickers = parse_tickers("aapl=150.00, MSFT = 284.5").unwrap();
        assert_eq!(tickers, vec![
            ("AAPL".to_string(), dec!(150.00)),
            ("MSFT".to_string(), dec!(284.5)),
        ]);

        assert!(parse_tickers("AAPL").is_err());
        assert!(parse_tickers("AAPL=abc").is_err());
    }

    #[test]
    fn test_duplicate_tickers_rejected() {
        let config = ServerConfig {
            tickers: vec![("AAPL".to_string(), dec!(1)), ("AAPL".to_string(), dec!(2))],
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_capacity_must_cover_lookback_at_tick_rate() {
        let result = ServerConfig::builder()
            .tick_interval(Duration::from_millis(10), Duration::from_millis(20))
            .build();
        assert!(matches!(result, Err(StreamError::Configuration(_))));

        let config = ServerConfig::builder()
            .tick_interval(Duration::from_millis(10), Duration::from_millis(20))
            .max_samples(30_000)
            .build()
            .unwrap();
        assert_eq!(config.longest_lookback(), Duration::from_secs(300));
    }
}
