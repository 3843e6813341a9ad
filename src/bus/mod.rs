//! In-process event bus.
//!
//! # Data Flow
//! ```text
//! Publishers (bridge inbound, breaker notifications, internal services)
//!     → EventBus::publish (broadcast channel)
//!     → every receiver: bridge relay loop, address consumers
//! ```
//!
//! # Design Decisions
//! - A single bounded broadcast channel; address filtering is receiver-side
//! - Publishing with no receivers is not an error
//! - Slow receivers lag and skip messages rather than blocking publishers

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

/// A message travelling on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub address: String,
    pub body: Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl BusMessage {
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            body,
            headers: HashMap::new(),
        }
    }
}

/// Cloneable handle to the shared bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish `body` on `address`. Returns how many receivers saw it.
    pub fn publish(&self, address: impl Into<String>, body: Value) -> usize {
        self.send(BusMessage::new(address, body))
    }

    /// Publish a fully formed message.
    pub fn send(&self, message: BusMessage) -> usize {
        let address = message.address.clone();
        match self.tx.send(message) {
            Ok(receivers) => {
                tracing::trace!(address = %address, receivers, "Bus message published");
                receivers
            }
            Err(_) => {
                tracing::trace!(address = %address, "Bus message published with no receivers");
                0
            }
        }
    }

    /// Receive every message, regardless of address.
    pub fn subscribe_all(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Receive only messages for `address`.
    pub fn consumer(&self, address: impl Into<String>) -> Consumer {
        Consumer {
            address: address.into(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Address-filtered receiver.
pub struct Consumer {
    address: String,
    rx: broadcast::Receiver<BusMessage>,
}

impl Consumer {
    /// Next message on this address; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) if message.address == self.address => return Some(message),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(address = %self.address, skipped, "Bus consumer lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}
