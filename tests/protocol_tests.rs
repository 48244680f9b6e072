//! Wire format tests for inbound parsing and outbound JSON shapes

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tradeops_stream::{
    data::{AggregateRecord, AlertEvent, HistoryPoint},
    error::ProtocolError,
    protocol::{parse_inbound, InboundMessage, OutboundMessage},
};

fn to_value(message: &OutboundMessage) -> Value {
    serde_json::from_str(&message.to_json().unwrap()).unwrap()
}

#[test]
fn test_parse_all_inbound_types() {
    assert_eq!(
        parse_inbound(r#"{"type": "subscribe", "tickers": ["AAPL"]}"#).unwrap(),
        InboundMessage::Subscribe { tickers: vec!["AAPL".to_string()] }
    );
    assert_eq!(
        parse_inbound(r#"{"type": "unsubscribe", "tickers": ["AAPL", "MSFT"]}"#).unwrap(),
        InboundMessage::Unsubscribe {
            tickers: vec!["AAPL".to_string(), "MSFT".to_string()]
        }
    );
    assert_eq!(
        parse_inbound(r#"{"type": "get_history", "ticker": "TSLA"}"#).unwrap(),
        InboundMessage::GetHistory { ticker: "TSLA".to_string() }
    );
    assert_eq!(parse_inbound(r#"{"type": "ping"}"#).unwrap(), InboundMessage::Ping);
}

#[test]
fn test_subscribe_without_tickers_means_all() {
    assert_eq!(
        parse_inbound(r#"{"type": "subscribe"}"#).unwrap(),
        InboundMessage::Subscribe { tickers: Vec::new() }
    );
}

#[test]
fn test_parse_rejects_bad_input() {
    assert!(matches!(parse_inbound(""), Err(ProtocolError::InvalidJson(_))));
    assert!(matches!(parse_inbound("[1, 2]"), Err(ProtocolError::MalformedMessage(_))));
    assert!(matches!(
        parse_inbound(r#"{"type": 5}"#),
        Err(ProtocolError::MalformedMessage(_))
    ));
    assert!(matches!(
        parse_inbound(r#"{"type": "subscribe", "tickers": "AAPL"}"#),
        Err(ProtocolError::MalformedMessage(_))
    ));
    assert_eq!(
        parse_inbound(r#"{"type": "place_order"}"#),
        Err(ProtocolError::UnsupportedType("place_order".to_string()))
    );
}

#[test]
fn test_price_update_shape() {
    let mut data = BTreeMap::new();
    data.insert("AAPL".to_string(), dec!(151.0));
    let message = OutboundMessage::PriceUpdate {
        data,
        timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
    };

    let value = to_value(&message);
    assert_eq!(value["type"], "price_update");
    assert_eq!(value["data"]["AAPL"].as_f64(), Some(151.0));
    assert!(value["timestamp"].as_str().unwrap().starts_with("2024-01-02T03:04:05"));
}

#[test]
fn test_price_alert_shape() {
    let alert = AlertEvent {
        ticker: "AAPL".to_string(),
        change_percent: dec!(2.5),
        current_price: dec!(153.75),
        previous_price: dec!(150.00),
        message: "AAPL increased by 2.50% in the last minute!".to_string(),
        timestamp: Utc::now(),
    };

    let value = to_value(&OutboundMessage::alert(&alert));
    assert_eq!(value["type"], "price_alert");
    assert_eq!(value["ticker"], "AAPL");
    assert_eq!(value["change_percent"].as_f64(), Some(2.5));
    assert_eq!(value["current_price"].as_f64(), Some(153.75));
    assert_eq!(value["previous_price"].as_f64(), Some(150.0));
    assert_eq!(value["message"], "AAPL increased by 2.50% in the last minute!");
}

#[test]
fn test_price_average_shape() {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
    let record = AggregateRecord {
        ticker: "MSFT".to_string(),
        window_start: start,
        window_end: start + chrono::Duration::minutes(5),
        mean_price: dec!(284.56),
        sample_count: 5,
    };

    let value = to_value(&OutboundMessage::average(&record));
    assert_eq!(value["type"], "price_average");
    assert_eq!(value["average_price"].as_f64(), Some(284.56));
    assert_eq!(value["sample_count"], 5);
    assert!(value["window_start"].is_string());
    assert!(value["window_end"].is_string());
}

#[test]
fn test_price_history_shape() {
    let message = OutboundMessage::PriceHistory {
        ticker: "TSLA".to_string(),
        data: vec![HistoryPoint {
            timestamp: Utc::now(),
            price: dec!(845.30),
            change_percent: dec!(0),
        }],
        timestamp: Utc::now(),
    };

    let value = to_value(&message);
    assert_eq!(value["type"], "price_history");
    let entry = &value["data"][0];
    assert_eq!(entry["price"].as_f64(), Some(845.30));
    assert_eq!(entry["change_percent"].as_f64(), Some(0.0));
    assert!(entry["timestamp"].is_string());
}

#[test]
fn test_control_message_shapes() {
    let confirmed = to_value(&OutboundMessage::SubscriptionConfirmed {
        tickers: vec!["AAPL".to_string()],
        unknown: vec!["XYZ".to_string()],
        timestamp: Utc::now(),
    });
    assert_eq!(confirmed["type"], "subscription_confirmed");
    assert_eq!(confirmed["tickers"], json!(["AAPL"]));
    assert_eq!(confirmed["unknown"], json!(["XYZ"]));

    let unsubscribed = to_value(&OutboundMessage::UnsubscriptionConfirmed {
        tickers: vec!["AAPL".to_string()],
        timestamp: Utc::now(),
    });
    assert_eq!(unsubscribed["type"], "unsubscription_confirmed");

    assert_eq!(to_value(&OutboundMessage::Pong { timestamp: Utc::now() })["type"], "pong");

    let error = to_value(&OutboundMessage::error("Invalid JSON format"));
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Invalid JSON format");
}

#[test]
fn test_kind_matches_serialized_tag() {
    let messages = vec![
        OutboundMessage::CurrentPrices { data: BTreeMap::new(), timestamp: Utc::now() },
        OutboundMessage::Pong { timestamp: Utc::now() },
        OutboundMessage::error("oops"),
    ];
    for message in messages {
        assert_eq!(to_value(&message)["type"], message.kind());
    }
}

#[test]
fn test_outbound_round_trips_through_serde() {
    let message = OutboundMessage::Pong {
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    };
    let parsed: OutboundMessage = serde_json::from_str(&message.to_json().unwrap()).unwrap();
    assert_eq!(parsed, message);
}
