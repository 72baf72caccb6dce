//! A registered client as seen by the hub.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Message;
use super::outbound::{OutboundQueue, OutboundReceiver};

/// Per-connection identifier. Successive connections that reuse a name get
/// distinct ids, so a late unregister from an old connection cannot remove
/// the new one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh time-ordered id.
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One named participant. The hub owns it from registration until it is
/// unregistered or evicted.
#[derive(Debug)]
pub struct Client {
    /// Connection id.
    pub id: ClientId,
    /// Unique display name.
    pub name: String,
    /// Producer half of the outbound queue.
    pub outbound: OutboundQueue,
    /// Cancelled by the hub when it evicts this client.
    pub evicted: CancellationToken,
}

impl Client {
    /// Create a client and the receiver its dispatch loop drains.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = OutboundQueue::new(capacity);
        let client = Self {
            id: ClientId::new(),
            name: name.into(),
            outbound,
            evicted: CancellationToken::new(),
        };
        (client, rx)
    }

    /// The actor's view of this client, kept after the client itself is
    /// handed to the hub.
    pub fn membership(&self) -> Membership {
        Membership {
            id: self.id.clone(),
            name: self.name.clone(),
            evicted: self.evicted.clone(),
        }
    }
}

/// Identity of a registered client plus its eviction signal.
#[derive(Clone, Debug)]
pub struct Membership {
    /// Connection id.
    pub id: ClientId,
    /// Display name.
    pub name: String,
    evicted: CancellationToken,
}

impl Membership {
    /// Wrap a payload sent by this client.
    pub fn message(&self, payload: impl Into<Bytes>) -> Message {
        Message::new(self.name.clone(), self.id.clone(), payload)
    }

    /// Resolves once the hub evicts this client.
    pub async fn evicted(&self) {
        self.evicted.cancelled().await;
    }

    /// Whether the hub has evicted this client.
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }
}
