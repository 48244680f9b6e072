//! Rolling price-change alerts
//!
//! Every committed sample is compared against the newest sample at or before
//! `timestamp - lookback`. An increase strictly above the threshold produces
//! one [`AlertEvent`] for that ticker and tick. Without a cooldown a sustained
//! climb alerts on every tick.

use crate::{
    config::AlertConfig,
    data::{percent_change, AlertEvent},
    history::{to_chrono, HistoryRing},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Stateless except for the optional per-ticker cooldown
#[derive(Debug)]
pub struct AlertDetector {
    threshold_percent: Decimal,
    lookback: chrono::Duration,
    cooldown: Option<chrono::Duration>,
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl AlertDetector {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            threshold_percent: config.threshold_percent,
            lookback: to_chrono(config.lookback),
            cooldown: config.cooldown.map(to_chrono),
            last_alert: HashMap::new(),
        }
    }

    /// Check one freshly committed sample against the lookback price
    pub fn evaluate(
        &mut self,
        history: &HistoryRing,
        symbol: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        let reference_time = timestamp.checked_sub_signed(self.lookback)?;
        // Ticker younger than the lookback window
        let previous = history.price_at_or_before(symbol, reference_time).ok()?;
        let change = percent_change(previous, price)?;

        if change <= self.threshold_percent {
            return None;
        }

        if let (Some(cooldown), Some(last)) = (self.cooldown, self.last_alert.get(symbol)) {
            if timestamp - *last < cooldown {
                tracing::debug!("Suppressing alert for {} (cooldown)", symbol);
                return None;
            }
        }
        self.last_alert.insert(symbol.to_string(), timestamp);

        let change_percent = change.round_dp(2);
        tracing::info!(
            "ALERT: {} increased by {}% in {}",
            symbol,
            change_percent,
            self.window_label()
        );

        Some(AlertEvent {
            ticker: symbol.to_string(),
            change_percent,
            current_price: price,
            previous_price: previous,
            message: format!(
                "{} increased by {:.2}% in the last {}!",
                symbol,
                change_percent,
                self.window_label()
            ),
            timestamp,
        })
    }

    pub fn threshold_percent(&self) -> Decimal {
        self.threshold_percent
    }

    fn window_label(&self) -> String {
        let secs = self.lookback.num_seconds();
        if secs == 60 {
            "minute".to_string()
        } else {
            format!("{}s", secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ring() -> HistoryRing {
        HistoryRing::new(std::time::Duration::from_secs(600), 1000)
    }

    #[test]
    fn test_alert_on_jump() {
        let history = ring();
        let mut detector = AlertDetector::new(&AlertConfig::default());

        history.append("AAPL", Sample::new(at(0), dec!(150.00)));
        history.append("AAPL", Sample::new(at(60), dec!(153.75)));

        let alert = detector.evaluate(&history, "AAPL", dec!(153.75), at(60)).unwrap();
        assert_eq!(alert.change_percent, dec!(2.5));
        assert_eq!(alert.previous_price, dec!(150.00));
        assert_eq!(alert.current_price, dec!(153.75));
        assert_eq!(alert.message, "AAPL increased by 2.50% in the last minute!");
    }

    #[test]
    fn test_no_alert_without_lookback_history() {
        let history = ring();
        let mut detector = AlertDetector::new(&AlertConfig::default());

        history.append("AAPL", Sample::new(at(0), dec!(150.00)));
        history.append("AAPL", Sample::new(at(30), dec!(160.00)));

        assert!(detector.evaluate(&history, "AAPL", dec!(160.00), at(30)).is_none());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let history = ring();
        let mut detector = AlertDetector::new(&AlertConfig::default());

        history.append("MSFT", Sample::new(at(0), dec!(100.00)));
        history.append("MSFT", Sample::new(at(61), dec!(102.00)));

        assert!(detector.evaluate(&history, "MSFT", dec!(102.00), at(61)).is_none());
    }

    #[test]
    fn test_sustained_climb_alerts_every_tick() {
        let history = ring();
        let mut detector = AlertDetector::new(&AlertConfig::default());
        history.append("NVDA", Sample::new(at(0), dec!(100)));

        let mut alerts = 0;
        for (i, price) in [dec!(103), dec!(104), dec!(105)].into_iter().enumerate() {
            let ts = at(61 + i as i64);
            history.append("NVDA", Sample::new(ts, price));
            if detector.evaluate(&history, "NVDA", price, ts).is_some() {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 3);
    }

    #[test]
    fn test_cooldown_suppresses_repeats() {
        let history = ring();
        let mut detector = AlertDetector::new(&AlertConfig {
            cooldown: Some(std::time::Duration::from_secs(60)),
            ..AlertConfig::default()
        });
        history.append("TSLA", Sample::new(at(0), dec!(100)));

        assert!(detector.evaluate(&history, "TSLA", dec!(103), at(61)).is_some());
        assert!(detector.evaluate(&history, "TSLA", dec!(104), at(62)).is_none());
        assert!(detector
            .evaluate(&history, "TSLA", dec!(105), at(61) + Duration::seconds(60))
            .is_some());
    }
}
