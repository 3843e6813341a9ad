//! Session multiplexer between the event bus and bridge clients.
//!
//! # Responsibilities
//! - Own every connected session and its subscriptions
//! - Relay permitted bus messages to subscribed sessions
//! - Publish permitted client messages onto the bus
//! - Report refusals to the originating session only
//!
//! # Design Decisions
//! - One relay task reads the bus; each session has its own FIFO outbox,
//!   so per-session order matches bus order
//! - Delivering to a session whose transport has gone is a no-op
//! - Outboxes are bounded; a session whose outbox fills up is disconnected
//! - No lock is held across an await

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::bridge::envelope::{ClientFrame, ServerFrame};
use crate::bridge::permissions::{Direction, PermissionTable};
use crate::bridge::session::{BridgeSession, SessionId, SessionInfo};
use crate::bus::{BusMessage, EventBus};
use crate::observability::metrics;

/// Errors surfaced to a single bridge session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("{direction} access to {address:?} denied")]
    PermissionDenied { direction: Direction, address: String },

    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

/// Default per-session outbox capacity.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Relays bus traffic to and from connected sessions.
#[derive(Debug)]
pub struct SessionMultiplexer {
    permissions: PermissionTable,
    bus: EventBus,
    sessions: DashMap<SessionId, BridgeSession>,
    outbox_capacity: usize,
}

impl SessionMultiplexer {
    pub fn new(permissions: PermissionTable, bus: EventBus) -> Self {
        Self {
            permissions,
            bus,
            sessions: DashMap::new(),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }

    /// Frames a session may have queued before it is dropped as too slow.
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    /// Register a new session with no subscriptions.
    ///
    /// The receiver yields every frame destined for the client, in order.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<ServerFrame>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        self.sessions.insert(id, BridgeSession::new(id, tx));
        metrics::record_bridge_sessions(self.sessions.len());
        tracing::info!(session = %id, "Bridge session connected");
        (id, rx)
    }

    /// Destroy a session and all of its subscriptions.
    pub fn disconnect(&self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id);
        metrics::record_bridge_sessions(self.sessions.len());
        if let Some((_, session)) = &removed {
            tracing::info!(
                session = %id,
                subscriptions = session.subscriptions.len(),
                "Bridge session disconnected"
            );
        }
        removed.is_some()
    }

    /// Subscribe a session to an outbound address.
    pub fn subscribe(&self, id: SessionId, address: &str) -> Result<(), BridgeError> {
        if !self.permissions.permit(Direction::Outbound, address) {
            tracing::debug!(session = %id, address = %address, "Subscription denied");
            return Err(BridgeError::PermissionDenied {
                direction: Direction::Outbound,
                address: address.to_string(),
            });
        }
        let mut session = self.sessions.get_mut(&id).ok_or(BridgeError::UnknownSession(id))?;
        session.subscriptions.insert(address.to_string());
        tracing::debug!(session = %id, address = %address, "Session subscribed");
        Ok(())
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SessionId, address: &str) -> Result<bool, BridgeError> {
        let mut session = self.sessions.get_mut(&id).ok_or(BridgeError::UnknownSession(id))?;
        Ok(session.subscriptions.remove(address))
    }

    /// Publish a client message on the bus if the inbound rules allow it.
    pub fn inbound(
        &self,
        id: SessionId,
        address: &str,
        body: Value,
        headers: HashMap<String, String>,
    ) -> Result<usize, BridgeError> {
        if !self.sessions.contains_key(&id) {
            return Err(BridgeError::UnknownSession(id));
        }
        if !self.permissions.permit(Direction::Inbound, address) {
            tracing::warn!(session = %id, address = %address, "Inbound message denied");
            metrics::record_bridge_frame("inbound", "denied");
            return Err(BridgeError::PermissionDenied {
                direction: Direction::Inbound,
                address: address.to_string(),
            });
        }

        metrics::record_bridge_frame("inbound", "published");
        Ok(self.bus.send(BusMessage {
            address: address.to_string(),
            body,
            headers,
        }))
    }

    /// Apply one decoded client frame.
    ///
    /// Refusals are queued to the originating session as `err` frames and
    /// also returned to the caller.
    pub fn handle_frame(&self, id: SessionId, frame: ClientFrame) -> Result<(), BridgeError> {
        let result = match frame {
            ClientFrame::Send { address, body, headers } | ClientFrame::Publish { address, body, headers } => self
                .inbound(id, &address, body, headers)
                .map(|_| ()),
            ClientFrame::Register { address } => self.subscribe(id, &address),
            ClientFrame::Unregister { address } => self.unsubscribe(id, &address).map(|_| ()),
            ClientFrame::Ping => {
                self.push(id, ServerFrame::Pong);
                Ok(())
            }
        };

        if let Err(BridgeError::PermissionDenied { address, .. }) = &result {
            self.push(id, ServerFrame::access_denied(address.clone()));
        }
        result
    }

    /// Queue a frame for one session. Missing or closed sessions are ignored;
    /// a session with a full outbox is disconnected.
    pub fn push(&self, id: SessionId, frame: ServerFrame) -> bool {
        let pushed = match self.sessions.get(&id) {
            Some(session) => session.push(frame),
            None => return false,
        };
        match pushed {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.evict(id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Fan a bus message out to every subscribed session.
    ///
    /// Returns the number of sessions that accepted the frame.
    pub fn deliver(&self, message: &BusMessage) -> usize {
        if !self.permissions.permit(Direction::Outbound, &message.address) {
            tracing::trace!(address = %message.address, "Outbound message not bridged");
            return 0;
        }

        let mut delivered = 0;
        let mut overflowing = Vec::new();
        for session in self.sessions.iter() {
            if !session.is_subscribed(&message.address) {
                continue;
            }
            let frame = ServerFrame::Rec {
                address: message.address.clone(),
                body: message.body.clone(),
                headers: message.headers.clone(),
            };
            match session.push(frame) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => overflowing.push(session.id),
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(session = %session.id, "Delivery to closed session skipped");
                }
            }
        }
        // Shard guards from the iteration must be released before removal.
        for id in overflowing {
            self.evict(id);
        }

        if delivered > 0 {
            metrics::record_bridge_frame("outbound", "delivered");
        }
        delivered
    }

    /// Start the relay loop.
    ///
    /// The bus subscription is taken before this returns, so nothing
    /// published afterwards is missed.
    pub fn spawn_relay(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe_all();
        let mux = Arc::clone(self);

        tokio::spawn(async move {
            tracing::info!("Bridge relay started");
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(message) => {
                            mux.deliver(&message);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Bridge relay lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            tracing::info!("Bridge relay stopped");
        })
    }

    fn evict(&self, id: SessionId) {
        tracing::warn!(session = %id, capacity = self.outbox_capacity, "Bridge client not reading; disconnecting");
        metrics::record_bridge_frame("outbound", "overflow");
        self.disconnect(id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of all sessions, ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.iter().map(|s| SessionInfo::from(s.value())).collect();
        sessions.sort_by_key(|s| s.id.to_string());
        sessions
    }

    /// Subscriptions of one session, sorted.
    pub fn subscriptions(&self, id: SessionId) -> Option<Vec<String>> {
        self.sessions.get(&id).map(|s| SessionInfo::from(s.value()).subscriptions)
    }
}
