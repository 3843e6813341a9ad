//! Bridge session state.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::bridge::envelope::ServerFrame;

/// Opaque identifier of a connected bridge client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One connected client, owned by the multiplexer.
#[derive(Debug)]
pub struct BridgeSession {
    pub id: SessionId,
    /// Outbound addresses this session receives.
    pub subscriptions: HashSet<String>,
    /// Bounded FIFO toward the transport writer.
    outbox: mpsc::Sender<ServerFrame>,
}

impl BridgeSession {
    pub fn new(id: SessionId, outbox: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id,
            subscriptions: HashSet::new(),
            outbox,
        }
    }

    /// Queue a frame without waiting.
    ///
    /// `Full` means the client has stopped draining its outbox; `Closed`
    /// means the transport side is gone.
    pub fn push(&self, frame: ServerFrame) -> Result<(), TrySendError<ServerFrame>> {
        self.outbox.try_send(frame)
    }

    pub fn is_subscribed(&self, address: &str) -> bool {
        self.subscriptions.contains(address)
    }
}

/// Read-only view of a session for status endpoints.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub subscriptions: Vec<String>,
}

impl From<&BridgeSession> for SessionInfo {
    fn from(session: &BridgeSession) -> Self {
        let mut subscriptions: Vec<String> = session.subscriptions.iter().cloned().collect();
        subscriptions.sort();
        Self {
            id: session.id,
            subscriptions,
        }
    }
}
