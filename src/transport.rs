//! Outbound delivery to a single subscriber
//!
//! The dispatcher only knows about [`Transport`]. The WebSocket server uses
//! [`ChannelTransport`]: each push lands in a bounded per-connection queue
//! that a dedicated writer task drains into the socket, which keeps
//! per-subscriber ordering and lets the dispatcher bound every push with a
//! timeout.

use crate::{error::TransportError, protocol::OutboundMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// A sink for messages addressed to one subscriber
#[async_trait]
pub trait Transport: Send + Sync {
    async fn push(&self, message: OutboundMessage) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool {
        false
    }
}

/// Bounded queue feeding a connection's writer task
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<Message>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Transport plus the receiving end for the writer task
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queue a message without waiting. Fails if the queue is full.
    pub fn try_push(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let text = message.to_json()?;
        self.sender.try_send(Message::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Queue a raw frame (pings, close) behind any pending messages
    pub async fn push_frame(&self, frame: Message) -> Result<(), TransportError> {
        self.sender.send(frame).await.map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn push(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let text = message.to_json()?;
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_push_serializes_to_text_frame() {
        let (transport, mut rx) = ChannelTransport::pair(4);
        transport
            .push(OutboundMessage::Pong { timestamp: Utc::now() })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Message::Text(text)) => assert!(text.contains("\"type\":\"pong\"")),
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped_fails() {
        let (transport, rx) = ChannelTransport::pair(4);
        drop(rx);

        assert!(transport.is_closed());
        let result = transport.push(OutboundMessage::Pong { timestamp: Utc::now() }).await;
        assert_eq!(result, Err(TransportError::Closed));
    }

    #[test]
    fn test_try_push_reports_full_queue() {
        let (transport, _rx) = ChannelTransport::pair(1);
        let pong = || OutboundMessage::Pong { timestamp: Utc::now() };

        assert_eq!(transport.try_push(pong()), Ok(()));
        assert_eq!(transport.try_push(pong()), Err(TransportError::QueueFull));
    }
}
