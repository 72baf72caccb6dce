//! Live-client table and fan-out.
//!
//! [`Registry`] is plain synchronous state. The hub control loop is its only
//! writer; snapshot readers share it behind a read lock.

use std::collections::HashMap;

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use super::client::{Client, ClientId};
use super::outbound::PushError;
use super::stats::HubStats;
use super::Message;
use crate::errors::RelayError;
use crate::metrics as m;

/// Result of fanning out one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Recipients whose queue accepted the payload.
    pub delivered: usize,
    /// Recipients evicted because their queue was full.
    pub evicted: Vec<String>,
    /// Recipients removed because their queue was already closed.
    pub dropped: Vec<String>,
}

/// Name-keyed table of live clients plus cumulative counters.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<String, Client>,
    stats: HubStats,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently connected.
    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Number of live clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Connected names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Current counter values.
    pub fn stats(&self) -> HubStats {
        self.stats
    }

    /// Atomically check the name and insert the client.
    ///
    /// A duplicate leaves the existing entry untouched; the rejected client is
    /// dropped, which closes its queue.
    pub fn register(&mut self, mut client: Client) -> Result<(), RelayError> {
        if self.clients.contains_key(&client.name) {
            let _ = client.outbound.close();
            warn!(name = %client.name, client_id = %client.id, "registration rejected, name taken");
            counter!(m::REGISTRATIONS_REJECTED_TOTAL).increment(1);
            return Err(RelayError::HandshakeRejected { name: client.name });
        }

        self.stats.total_connections += 1;
        info!(
            name = %client.name,
            client_id = %client.id,
            total_users = self.clients.len() + 1,
            "client registered"
        );
        let _ = self.clients.insert(client.name.clone(), client);
        counter!(m::CONNECTIONS_TOTAL).increment(1);
        self.record_active();
        Ok(())
    }

    /// Remove `name` if it still belongs to connection `id`, closing its queue.
    ///
    /// Returns `false` when the name is absent or owned by a newer connection.
    pub fn unregister(&mut self, name: &str, id: &ClientId) -> bool {
        match self.clients.get(name) {
            Some(client) if client.id == *id => {}
            Some(_) => {
                debug!(name, client_id = %id, "stale unregister ignored");
                return false;
            }
            None => return false,
        }
        let Some(mut client) = self.clients.remove(name) else {
            return false;
        };
        let _ = client.outbound.close();
        info!(
            name,
            client_id = %id,
            total_users = self.clients.len(),
            "client unregistered"
        );
        self.record_active();
        true
    }

    /// Fan `message` out to every client except its sender.
    ///
    /// Counters are updated first. A recipient whose queue is full is evicted
    /// in the same pass. Returns `None`, touching no counter, when the sender
    /// no longer owns its name (evicted or replaced by a newer connection).
    pub fn broadcast(&mut self, message: &Message) -> Option<BroadcastOutcome> {
        match self.clients.get(&message.from) {
            Some(owner) if owner.id == message.sender => {}
            _ => {
                debug!(
                    from = %message.from,
                    client_id = %message.sender,
                    "message from unregistered connection dropped"
                );
                return None;
            }
        }

        let len = message.payload.len() as u64;
        self.stats.total_messages += 1;
        self.stats.total_bytes_relayed += len;
        counter!(m::MESSAGES_TOTAL).increment(1);
        counter!(m::BYTES_RELAYED_TOTAL).increment(len);

        let mut outcome = BroadcastOutcome::default();
        for (name, client) in &self.clients {
            if *name == message.from {
                continue;
            }
            match client.outbound.push(message.payload.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(PushError::Full) => outcome.evicted.push(name.clone()),
                Err(PushError::Closed) => outcome.dropped.push(name.clone()),
            }
        }

        for name in &outcome.evicted {
            if let Some(mut client) = self.clients.remove(name) {
                let _ = client.outbound.close();
                client.evicted.cancel();
                self.stats.total_evictions += 1;
                counter!(m::EVICTIONS_TOTAL).increment(1);
                warn!(name = %name, client_id = %client.id, "client evicted, outbound queue full");
            }
        }
        for name in &outcome.dropped {
            if let Some(client) = self.clients.remove(name) {
                debug!(name = %name, client_id = %client.id, "removed client with closed queue");
            }
        }
        if !outcome.evicted.is_empty() || !outcome.dropped.is_empty() {
            self.record_active();
        }

        debug!(
            from = %message.from,
            bytes = len,
            delivered = outcome.delivered,
            "message relayed"
        );
        Some(outcome)
    }

    /// Close every queue and empty the table. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        let count = self.clients.len();
        for (_, mut client) in self.clients.drain() {
            let _ = client.outbound.close();
        }
        self.record_active();
        count
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active(&self) {
        gauge!(m::CONNECTIONS_ACTIVE).set(self.clients.len() as f64);
    }
}
