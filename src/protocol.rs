//! Wire messages exchanged with subscribers
//!
//! Every message is a JSON object tagged by its `"type"` field. Field names
//! are the compatibility contract with existing clients; prices serialize as
//! JSON numbers.

use crate::{
    data::{AggregateRecord, AlertEvent, HistoryPoint, PriceBatch},
    error::{ProtocolError, TransportError},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Replace the interest set; an empty list means every ticker
    Subscribe {
        #[serde(default)]
        tickers: Vec<String>,
    },
    Unsubscribe {
        #[serde(default)]
        tickers: Vec<String>,
    },
    GetHistory {
        ticker: String,
    },
    Ping,
}

/// Server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    CurrentPrices {
        data: BTreeMap<String, Decimal>,
        timestamp: DateTime<Utc>,
    },
    PriceUpdate {
        data: BTreeMap<String, Decimal>,
        timestamp: DateTime<Utc>,
    },
    PriceAlert {
        ticker: String,
        change_percent: Decimal,
        current_price: Decimal,
        previous_price: Decimal,
        message: String,
        timestamp: DateTime<Utc>,
    },
    PriceAverage {
        ticker: String,
        average_price: Decimal,
        sample_count: usize,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    PriceHistory {
        ticker: String,
        data: Vec<HistoryPoint>,
        timestamp: DateTime<Utc>,
    },
    SubscriptionConfirmed {
        tickers: Vec<String>,
        unknown: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    UnsubscriptionConfirmed {
        tickers: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn price_update(batch: &PriceBatch, data: BTreeMap<String, Decimal>) -> Self {
        OutboundMessage::PriceUpdate {
            data,
            timestamp: batch.timestamp,
        }
    }

    pub fn alert(alert: &AlertEvent) -> Self {
        OutboundMessage::PriceAlert {
            ticker: alert.ticker.clone(),
            change_percent: alert.change_percent,
            current_price: alert.current_price,
            previous_price: alert.previous_price,
            message: alert.message.clone(),
            timestamp: alert.timestamp,
        }
    }

    pub fn average(record: &AggregateRecord) -> Self {
        OutboundMessage::PriceAverage {
            ticker: record.ticker.clone(),
            average_price: record.mean_price.round_dp(2),
            sample_count: record.sample_count,
            window_start: record.window_start,
            window_end: record.window_end,
            timestamp: record.window_end,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Value of the `"type"` tag
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::CurrentPrices { .. } => "current_prices",
            OutboundMessage::PriceUpdate { .. } => "price_update",
            OutboundMessage::PriceAlert { .. } => "price_alert",
            OutboundMessage::PriceAverage { .. } => "price_average",
            OutboundMessage::PriceHistory { .. } => "price_history",
            OutboundMessage::SubscriptionConfirmed { .. } => "subscription_confirmed",
            OutboundMessage::UnsubscriptionConfirmed { .. } => "unsubscription_confirmed",
            OutboundMessage::Pong { .. } => "pong",
            OutboundMessage::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Encode(e.to_string()))
    }
}

/// Parse one inbound text frame
pub fn parse_inbound(text: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MalformedMessage("missing \"type\" field".to_string()))?;

    match kind {
        "subscribe" | "unsubscribe" | "get_history" | "ping" => serde_json::from_value(value)
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string())),
        other => Err(ProtocolError::UnsupportedType(other.to_string())),
    }
}

/// Uppercase, trim and de-duplicate requested symbols, keeping request order
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !normalized.contains(&symbol) {
            normalized.push(symbol);
        }
    }
    normalized
}
