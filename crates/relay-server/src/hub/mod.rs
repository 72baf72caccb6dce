//! The hub: single authority over live clients and message fan-out.
//!
//! All membership changes and every broadcast run one at a time on a single
//! control loop fed by three channels. Snapshot and gate queries read the
//! shared [`Registry`] under a read lock and never wait on the loop.

pub mod client;
pub mod outbound;
pub mod registry;
pub mod stats;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use client::{Client, ClientId, Membership};
pub use outbound::{OutboundQueue, OutboundReceiver, PushError};
pub use registry::{BroadcastOutcome, Registry};
pub use stats::{HubStats, ServerSnapshot};

use crate::errors::RelayError;

/// Capacity of the register and unregister channels.
const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// An opaque payload in transit from one client to the others.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Sender name; the sender never receives its own message.
    pub from: String,
    /// Sender connection. Only the connection currently owning `from` may
    /// broadcast.
    pub sender: ClientId,
    /// Raw bytes, relayed unchanged.
    pub payload: Bytes,
}

impl Message {
    /// Wrap a payload from connection `sender` registered as `from`.
    pub fn new(from: impl Into<String>, sender: ClientId, payload: impl Into<Bytes>) -> Self {
        Self {
            from: from.into(),
            sender,
            payload: payload.into(),
        }
    }
}

struct RegisterRequest {
    client: Client,
    reply: oneshot::Sender<Result<(), RelayError>>,
}

struct UnregisterRequest {
    name: String,
    id: ClientId,
}

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::Sender<UnregisterRequest>,
    broadcast_tx: mpsc::Sender<Message>,
    registry: Arc<RwLock<Registry>>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl HubHandle {
    /// Start the control loop.
    ///
    /// The loop runs until `shutdown` is cancelled, at which point every
    /// outbound queue is closed so clients drain and disconnect, or until
    /// every handle is dropped.
    pub fn spawn(broadcast_capacity: usize, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(broadcast_capacity.max(1));
        let registry = Arc::new(RwLock::new(Registry::new()));

        let control = ControlLoop {
            registry: registry.clone(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            shutdown,
        };
        let task = tokio::spawn(control.run());

        let handle = Self {
            register_tx,
            unregister_tx,
            broadcast_tx,
            registry,
            started_at: Utc::now(),
            started: Instant::now(),
        };
        (handle, task)
    }

    /// Register a client. Fails with [`RelayError::HandshakeRejected`] if the
    /// name is taken by the time the control loop sees the request.
    pub async fn register(&self, client: Client) -> Result<(), RelayError> {
        let (reply, rx) = oneshot::channel();
        self.register_tx
            .send(RegisterRequest { client, reply })
            .await
            .map_err(|_| RelayError::HubClosed)?;
        rx.await.map_err(|_| RelayError::HubClosed)?
    }

    /// Remove `name` if it is still owned by connection `id`.
    pub async fn unregister(&self, name: &str, id: &ClientId) {
        let req = UnregisterRequest {
            name: name.to_string(),
            id: id.clone(),
        };
        if self.unregister_tx.send(req).await.is_err() {
            debug!(name, client_id = %id, "hub closed, unregister skipped");
        }
    }

    /// Hand a message to the control loop, waiting while the broadcast-in
    /// channel is full.
    pub async fn broadcast(&self, message: Message) -> Result<(), RelayError> {
        self.broadcast_tx
            .send(message)
            .await
            .map_err(|_| RelayError::HubClosed)
    }

    /// Whether `name` is currently connected.
    pub fn is_connected(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }

    /// Number of connected clients.
    pub fn connected_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Point-in-time view of names, counters and uptime.
    pub fn snapshot(&self) -> ServerSnapshot {
        let (users, stats) = {
            let registry = self.registry.read();
            (registry.names(), registry.stats())
        };
        ServerSnapshot {
            started_at: self.started_at,
            taken_at: Utc::now(),
            uptime: self.started.elapsed(),
            users,
            stats,
        }
    }
}

struct ControlLoop {
    registry: Arc<RwLock<Registry>>,
    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::Receiver<UnregisterRequest>,
    broadcast_rx: mpsc::Receiver<Message>,
    shutdown: CancellationToken,
}

impl ControlLoop {
    async fn run(mut self) {
        info!("hub control loop started");
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    let closed = self.registry.write().close_all();
                    info!(closed, "hub shutting down, outbound queues closed");
                    break;
                }
                req = self.unregister_rx.recv() => match req {
                    Some(req) => {
                        let _ = self.registry.write().unregister(&req.name, &req.id);
                    }
                    None => break,
                },
                req = self.register_rx.recv() => match req {
                    Some(req) => {
                        let result = self.registry.write().register(req.client);
                        // Requester may have gone away; its client is dropped either way.
                        let _ = req.reply.send(result);
                    }
                    None => break,
                },
                message = self.broadcast_rx.recv() => match message {
                    Some(message) => {
                        let _ = self.registry.write().broadcast(&message);
                    }
                    None => break,
                },
            }
        }
        if !self.shutdown.is_cancelled() {
            debug!("all hub handles dropped");
        }
        info!("hub control loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn wait_for(hub: &HubHandle, check: impl Fn(&ServerSnapshot) -> bool) -> ServerSnapshot {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let snap = hub.snapshot();
                if check(&snap) {
                    return snap;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached")
    }

    async fn join(hub: &HubHandle, name: &str, capacity: usize) -> (Membership, OutboundReceiver) {
        let (client, rx) = Client::new(name, capacity);
        let member = client.membership();
        hub.register(client).await.unwrap();
        (member, rx)
    }

    #[tokio::test]
    async fn register_and_snapshot() {
        let (hub, _task) = HubHandle::spawn(16, CancellationToken::new());
        let _bob = join(&hub, "bob", 4).await;
        let _alice = join(&hub, "alice", 4).await;

        assert!(hub.is_connected("alice"));
        assert_eq!(hub.connected_count(), 2);

        let snap = hub.snapshot();
        assert_eq!(snap.users, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(snap.stats.total_connections, 2);
        assert!(snap.taken_at >= snap.started_at);
    }

    #[tokio::test]
    async fn fan_out_excludes_sender() {
        let (hub, _task) = HubHandle::spawn(16, CancellationToken::new());
        let (alice, mut alice_rx) = join(&hub, "alice", 4).await;
        let (_b, mut bob_rx) = join(&hub, "bob", 4).await;

        hub.broadcast(alice.message(Bytes::from_static(b"hello")))
            .await
            .unwrap();

        let got = tokio::time::timeout(TIMEOUT, bob_rx.recv()).await.unwrap();
        assert_eq!(got.unwrap(), Bytes::from_static(b"hello"));

        let snap = wait_for(&hub, |s| s.stats.total_messages == 1).await;
        assert_eq!(snap.stats.total_bytes_relayed, 5);
        assert!(alice_rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let (hub, _task) = HubHandle::spawn(16, CancellationToken::new());
        let _first = join(&hub, "alice", 4).await;

        let (dup, _rx) = Client::new("alice", 4);
        let err = hub.register(dup).await.unwrap_err();
        assert!(matches!(err, RelayError::HandshakeRejected { ref name } if name == "alice"));
        assert_eq!(hub.snapshot().stats.total_connections, 1);
    }

    #[tokio::test]
    async fn unregister_removes_and_stale_id_is_ignored() {
        let (hub, _task) = HubHandle::spawn(16, CancellationToken::new());
        let (old, _old_rx) = join(&hub, "alice", 4).await;
        hub.unregister("alice", &old.id).await;
        let _ = wait_for(&hub, |s| s.users.is_empty()).await;

        let (_new, _new_rx) = join(&hub, "alice", 4).await;
        hub.unregister("alice", &old.id).await;

        // A later register round-trip proves the stale unregister was processed.
        let _bob = join(&hub, "bob", 4).await;
        let _ = wait_for(&hub, |s| s.users.len() == 2).await;
        assert!(hub.is_connected("alice"));
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted() {
        let (hub, _task) = HubHandle::spawn(16, CancellationToken::new());
        let (alice, _alice_rx) = join(&hub, "alice", 4).await;
        let (slow, mut slow_rx) = join(&hub, "slow", 2).await;

        for i in 0..3u8 {
            hub.broadcast(alice.message(vec![i])).await.unwrap();
        }

        let snap = wait_for(&hub, |s| s.stats.total_evictions == 1).await;
        assert_eq!(snap.users, vec!["alice".to_string()]);
        assert_eq!(snap.stats.total_messages, 3);
        assert!(slow.is_evicted());

        assert_eq!(slow_rx.recv().await.unwrap()[..], [0]);
        assert_eq!(slow_rx.recv().await.unwrap()[..], [1]);
        assert!(slow_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_queues_and_stops_loop() {
        let token = CancellationToken::new();
        let (hub, task) = HubHandle::spawn(16, token.clone());
        let (_a, mut alice_rx) = join(&hub, "alice", 4).await;

        token.cancel();
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

        assert!(alice_rx.recv().await.is_none());
        assert_eq!(hub.connected_count(), 0);

        let (late, _rx) = Client::new("late", 4);
        assert_eq!(hub.register(late).await.unwrap_err(), RelayError::HubClosed);
        assert_eq!(
            hub.broadcast(Message::new("late", ClientId::new(), Bytes::new())).await,
            Err(RelayError::HubClosed)
        );
    }

    #[tokio::test]
    async fn loop_exits_when_handles_dropped() {
        let (hub, task) = HubHandle::spawn(16, CancellationToken::new());
        drop(hub);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn loop_exits_when_last_clone_dropped() {
        let token = CancellationToken::new();
        let (hub, task) = HubHandle::spawn(16, token.clone());
        let (_alice, _rx) = join(&hub, "alice", 4).await;
        let other = hub.clone();
        drop(hub);
        assert!(!task.is_finished());

        drop(other);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn evicted_sender_is_not_relayed() {
        let (hub, _task) = HubHandle::spawn(16, CancellationToken::new());
        let (alice, _alice_rx) = join(&hub, "alice", 8).await;
        let (slow, _slow_rx) = join(&hub, "slow", 1).await;

        for i in 0..2u8 {
            hub.broadcast(alice.message(vec![i])).await.unwrap();
        }
        let _ = wait_for(&hub, |s| s.stats.total_evictions == 1).await;

        // Same name again, new connection
        let (_slow_again, mut again_rx) = join(&hub, "slow", 8).await;
        hub.broadcast(slow.message(Bytes::from_static(b"from-evicted")))
            .await
            .unwrap();
        hub.broadcast(alice.message(Bytes::from_static(b"live")))
            .await
            .unwrap();

        let got = tokio::time::timeout(TIMEOUT, again_rx.recv()).await.unwrap();
        assert_eq!(&got.unwrap()[..], b"live");
        assert_eq!(hub.snapshot().stats.total_messages, 3);
    }
}
