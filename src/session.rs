//! Per-connection session
//!
//! A session registers its subscriber on connect and removes it when dropped.
//! The socket is split: a writer task drains the connection's outbound queue
//! into the sink, while the read loop answers client requests. Silence longer
//! than the heartbeat interval earns a ping; a second silent interval closes
//! the connection. A subscriber dropped by the dispatcher is closed at once.

use crate::{
    config::SessionConfig,
    data::Interest,
    error::{ErrorReporter, StreamError, TransportError},
    protocol::{normalize_symbols, parse_inbound, InboundMessage, OutboundMessage},
    registry::TickerRegistry,
    subscription::{SubscriberId, SubscriptionRegistry},
    transport::{ChannelTransport, Transport},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Shared state every session needs
#[derive(Clone)]
pub struct SessionContext {
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub registry: Arc<TickerRegistry>,
    pub config: SessionConfig,
    /// Entries returned for `get_history`
    pub history_limit: usize,
}

/// One registered subscriber and its outbound queue
pub struct Session {
    id: SubscriberId,
    transport: ChannelTransport,
    context: SessionContext,
    removal: watch::Receiver<bool>,
}

impl Session {
    /// Queue the `current_prices` snapshot and register for broadcasts.
    ///
    /// Both happen under the subscription lock: a tick committed after the
    /// snapshot was read is always published to this subscriber, and behind it.
    pub fn open(transport: ChannelTransport, context: SessionContext) -> Result<Self, TransportError> {
        let id = context.subscriptions.add_with(Arc::new(transport.clone()), || {
            transport.try_push(OutboundMessage::CurrentPrices {
                data: context.registry.latest_prices(),
                timestamp: Utc::now(),
            })
        })?;

        let removal = context.subscriptions.removal(id);
        Ok(Self {
            id,
            transport,
            context,
            removal,
        })
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// False once the dispatcher dropped this subscriber
    pub fn is_registered(&self) -> bool {
        self.context.subscriptions.contains(self.id)
    }

    /// Watch that flips once this subscriber leaves the registry
    pub fn removal(&self) -> watch::Receiver<bool> {
        self.removal.clone()
    }

    /// Parse and answer one text frame. Bad input yields an `error` reply.
    pub fn handle_text(&self, text: &str) -> OutboundMessage {
        match parse_inbound(text) {
            Ok(message) => self.handle(message),
            Err(e) => {
                let reply = OutboundMessage::error(e.to_string());
                ErrorReporter::report(&StreamError::from(e), "Parsing client message");
                reply
            }
        }
    }

    pub fn handle(&self, message: InboundMessage) -> OutboundMessage {
        match message {
            InboundMessage::Subscribe { tickers } => self.subscribe(&tickers),
            InboundMessage::Unsubscribe { tickers } => self.unsubscribe(&tickers),
            InboundMessage::GetHistory { ticker } => {
                let ticker = ticker.trim().to_uppercase();
                let data = self
                    .context
                    .registry
                    .history()
                    .recent(&ticker, self.context.history_limit);
                OutboundMessage::PriceHistory {
                    ticker,
                    data,
                    timestamp: Utc::now(),
                }
            }
            InboundMessage::Ping => OutboundMessage::Pong { timestamp: Utc::now() },
        }
    }

    fn subscribe(&self, tickers: &[String]) -> OutboundMessage {
        let requested = normalize_symbols(tickers);
        let (known, unknown): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|symbol| self.context.registry.contains(symbol));

        let interest = if requested.is_empty() {
            Interest::All
        } else {
            Interest::Tickers(known.iter().cloned().collect())
        };

        if let Err(e) = self.context.subscriptions.set_interest(self.id, interest) {
            return OutboundMessage::error(e.to_string());
        }

        if !unknown.is_empty() {
            tracing::debug!("Subscriber {} asked for unknown tickers: {:?}", self.id, unknown);
        }
        tracing::info!("Subscriber {} subscribed to: {:?}", self.id, known);

        let tickers = if requested.is_empty() {
            self.context.registry.symbols()
        } else {
            known
        };
        OutboundMessage::SubscriptionConfirmed {
            tickers,
            unknown,
            timestamp: Utc::now(),
        }
    }

    fn unsubscribe(&self, tickers: &[String]) -> OutboundMessage {
        let symbols = normalize_symbols(tickers);
        let universe = self.context.registry.symbols();

        match self.context.subscriptions.unsubscribe(self.id, &symbols, &universe) {
            Ok(_) => {
                tracing::info!("Subscriber {} unsubscribed from: {:?}", self.id, symbols);
                OutboundMessage::UnsubscriptionConfirmed {
                    tickers: symbols,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => OutboundMessage::error(e.to_string()),
        }
    }

    pub async fn reply(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.transport.push(message).await
    }

    pub async fn send_frame(&self, frame: Message) -> Result<(), TransportError> {
        self.transport.push_frame(frame).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.context.subscriptions.remove(self.id);
    }
}

/// Run one WebSocket connection to completion
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: SessionContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!("WebSocket handshake failed for {}: {}", peer, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (transport, mut outbound) = ChannelTransport::pair(context.config.outbound_buffer);
    let heartbeat = context.config.heartbeat_interval;
    let drain_timeout = context.config.send_timeout;

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if ws_sender.send(frame).await.is_err() || closing {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let session = match Session::open(transport, context) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!("Could not open session for {}: {}", peer, e);
            writer.abort();
            return;
        }
    };
    tracing::info!("Client {} connected as subscriber {}", peer, session.id());

    let mut removal = session.removal();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            frame = tokio::time::timeout(heartbeat, ws_receiver.next()) => match frame {
                Err(_) => {
                    if awaiting_pong {
                        tracing::info!("Subscriber {} timed out", session.id());
                        break;
                    }
                    awaiting_pong = true;
                    if session.send_frame(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    tracing::debug!("WebSocket error for {}: {}", peer, e);
                    break;
                }
                Ok(Some(Ok(message))) => {
                    awaiting_pong = false;
                    match message {
                        Message::Text(text) => {
                            let reply = session.handle_text(&text);
                            if session.reply(reply).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            },
            _ = removal.changed() => {
                tracing::info!("Subscriber {} was dropped; closing connection", session.id());
                let _ = tokio::time::timeout(drain_timeout, session.send_frame(Message::Close(None))).await;
                break;
            }
            _ = shutdown.changed() => {
                let _ = tokio::time::timeout(drain_timeout, session.send_frame(Message::Close(None))).await;
                break;
            }
        }
    }

    let id = session.id();
    drop(session);
    if tokio::time::timeout(drain_timeout, writer).await.is_err() {
        tracing::debug!("Writer for subscriber {} did not drain in time", id);
    }

    tracing::info!("Client {} (subscriber {}) disconnected", peer, id);
}
