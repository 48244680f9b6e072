//! Property-based tests using quickcheck

use chrono::{DateTime, TimeZone, Utc};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tradeops_stream::{
    alerts::AlertDetector,
    config::AlertConfig,
    data::*,
    history::HistoryRing,
    registry::TickerRegistry,
    subscription::SubscriptionRegistry,
    transport::ChannelTransport,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn cents(raw: u32) -> Decimal {
    Decimal::new(raw as i64 + 1, 2)
}

fn long_ring() -> HistoryRing {
    HistoryRing::new(std::time::Duration::from_secs(86_400), 100_000)
}

#[quickcheck]
fn prop_mean_since_is_exact_window_mean(raw: Vec<u32>, start: usize) -> TestResult {
    if raw.is_empty() {
        return TestResult::discard();
    }

    let history = long_ring();
    let prices: Vec<Decimal> = raw.iter().map(|r| cents(*r)).collect();
    for (i, price) in prices.iter().enumerate() {
        history.append("MSFT", Sample::new(at(i as i64), *price));
    }

    let start = start % prices.len();
    let window = &prices[start..];
    let expected_sum: Decimal = window.iter().copied().sum();
    let expected = expected_sum / Decimal::from(window.len());

    match history.mean_since("MSFT", at(start as i64)) {
        Ok((mean, count)) => TestResult::from_bool(mean == expected && count == window.len()),
        Err(_) => TestResult::failed(),
    }
}

#[quickcheck]
fn prop_flat_series_never_alerts(raw: u32, ticks: u8) -> bool {
    let history = long_ring();
    let mut detector = AlertDetector::new(&AlertConfig::default());
    let price = cents(raw);

    (0..ticks as i64 * 10).step_by(10).all(|secs| {
        history.append("INTC", Sample::new(at(secs), price));
        detector.evaluate(&history, "INTC", price, at(secs)).is_none()
    })
}

#[quickcheck]
fn prop_alert_iff_change_exceeds_threshold(before: u32, after: u32) -> bool {
    let history = long_ring();
    let mut detector = AlertDetector::new(&AlertConfig::default());
    let (previous, current) = (cents(before), cents(after));

    history.append("AMD", Sample::new(at(0), previous));
    history.append("AMD", Sample::new(at(60), current));

    let change = (current - previous) / previous * Decimal::ONE_HUNDRED;
    let alerted = detector.evaluate(&history, "AMD", current, at(60)).is_some();
    alerted == (change > Decimal::TWO)
}

#[quickcheck]
fn prop_get_returns_last_commit(raw: Vec<u32>) -> bool {
    let history = Arc::new(long_ring());
    let registry = TickerRegistry::new(vec![("GOOGL".to_string(), Decimal::ONE)], history, at(0));

    let mut expected = Decimal::ONE;
    for (i, r) in raw.iter().enumerate() {
        expected = cents(*r);
        if registry.set("GOOGL", expected, at(i as i64 + 1)).is_err() {
            return false;
        }
    }
    registry.get("GOOGL") == Ok(expected)
}

#[quickcheck]
fn prop_second_remove_is_noop(count: u8) -> bool {
    let subscriptions = SubscriptionRegistry::new();
    let ids: Vec<_> = (0..count)
        .map(|_| {
            let (transport, _rx) = ChannelTransport::pair(1);
            subscriptions.add(Arc::new(transport))
        })
        .collect();

    ids.iter()
        .all(|id| subscriptions.remove(*id) && !subscriptions.remove(*id))
        && subscriptions.is_empty()
}

#[quickcheck]
fn prop_filtered_prices_are_subset_of_interest(prices: BTreeMap<String, u32>, wanted: Vec<String>) -> bool {
    let prices: BTreeMap<String, Decimal> = prices.into_iter().map(|(s, p)| (s, cents(p))).collect();
    let interest = Interest::from_symbols(wanted.clone());
    let filtered = interest.filter_prices(&prices);

    let subset = filtered
        .iter()
        .all(|(symbol, price)| interest.includes(symbol) && prices.get(symbol) == Some(price));
    let complete = prices
        .keys()
        .filter(|symbol| interest.includes(symbol))
        .all(|symbol| filtered.contains_key(symbol));

    subset && complete
}
