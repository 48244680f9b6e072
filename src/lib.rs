//! # TradeOps Price Stream
//!
//! Real-time price broadcast and alerting core. A single engine task moves
//! ticker prices, keeps a bounded history per ticker, raises rolling-change
//! alerts and fans every update out to WebSocket subscribers filtered by
//! their interest. A periodic aggregator stores per-ticker averages through a
//! pluggable sink.
//!
//! ## Quick Start
//! ```rust,ignore
//! use tradeops_stream::prelude::*;
//!
//! let config = ServerConfig::from_env()?;
//! let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! StreamServer::new(config, std::sync::Arc::new(LogSink)).run(listener, shutdown_rx).await?;
//! ```

pub mod aggregator;
pub mod alerts;
pub mod config;
pub mod data;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod generator;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod subscription;
pub mod telemetry;
pub mod transport;

pub use data::*;
pub use error::*;

pub use aggregator::{AggregateSink, AggregationReport, Aggregator, LogSink, MemorySink};
pub use alerts::AlertDetector;
pub use config::{
    AggregatorConfig, AlertConfig, GeneratorConfig, HistoryConfig, ServerConfig, ServerConfigBuilder,
    SessionConfig,
};
pub use dispatcher::{BroadcastDispatcher, DispatchReport};
pub use engine::{PriceEngine, TickReport};
pub use generator::{FeedSource, PriceGenerator, PriceSource};
pub use history::HistoryRing;
pub use protocol::{parse_inbound, InboundMessage, OutboundMessage};
pub use registry::TickerRegistry;
pub use server::StreamServer;
pub use session::{Session, SessionContext};
pub use subscription::{SubscriberId, SubscriberSnapshot, SubscriptionRegistry};
pub use telemetry::{Counter, Gauge, StreamMetrics};
pub use transport::{ChannelTransport, Transport};

/// Prelude - the types needed to embed or run the stream
///
/// Import with: `use tradeops_stream::prelude::*;`
pub mod prelude {
    pub use crate::aggregator::{AggregateSink, LogSink, MemorySink};
    pub use crate::config::ServerConfig;
    pub use crate::data::{AggregateRecord, AlertEvent, Interest, Quote};
    pub use crate::error::StreamError;
    pub use crate::generator::{FeedSource, PriceSource};
    pub use crate::protocol::{InboundMessage, OutboundMessage};
    pub use crate::server::StreamServer;
}

/// Install the fmt subscriber at `level`. A second call is ignored when a global subscriber is already set.
pub fn init_logging(level: tracing::Level) {
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}
