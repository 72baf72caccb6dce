//! Hub counters and point-in-time snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cumulative counters. Only the hub control loop mutates them, and they
/// never decrease.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Clients ever registered.
    pub total_connections: u64,
    /// Messages accepted for fan-out.
    pub total_messages: u64,
    /// Payload bytes accepted for fan-out (counted once per message).
    pub total_bytes_relayed: u64,
    /// Clients dropped because their outbound queue was full.
    pub total_evictions: u64,
}

/// Consistent view of the hub taken under a single read-lock acquisition.
#[derive(Clone, Debug, Serialize)]
pub struct ServerSnapshot {
    /// When the hub was created.
    pub started_at: DateTime<Utc>,
    /// When this snapshot was captured.
    pub taken_at: DateTime<Utc>,
    /// Time since the hub was created.
    pub uptime: Duration,
    /// Connected names, sorted.
    pub users: Vec<String>,
    /// Counter values at capture time.
    pub stats: HubStats,
}

impl ServerSnapshot {
    /// Number of connected clients.
    pub fn connected_users(&self) -> usize {
        self.users.len()
    }

    /// Whole seconds of uptime.
    pub fn uptime_seconds(&self) -> u64 {
        self.uptime.as_secs()
    }

    /// Average messages per second since start, `0.0` with no uptime.
    #[allow(clippy::cast_precision_loss)]
    pub fn messages_per_second(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.stats.total_messages as f64 / secs
        } else {
            0.0
        }
    }

    /// Average relayed bandwidth in megabits per second, `0.0` with no uptime.
    #[allow(clippy::cast_precision_loss)]
    pub fn bandwidth_mbps(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            (self.stats.total_bytes_relayed as f64 * 8.0) / (secs * 1_000_000.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(uptime: Duration, stats: HubStats) -> ServerSnapshot {
        let now = Utc::now();
        ServerSnapshot {
            started_at: now,
            taken_at: now,
            uptime,
            users: vec!["alice".into(), "bob".into()],
            stats,
        }
    }

    #[test]
    fn rates_are_zero_without_uptime() {
        let snap = snapshot(
            Duration::ZERO,
            HubStats {
                total_messages: 10,
                total_bytes_relayed: 1000,
                ..HubStats::default()
            },
        );
        assert!(snap.messages_per_second().abs() < f64::EPSILON);
        assert!(snap.bandwidth_mbps().abs() < f64::EPSILON);
    }

    #[test]
    fn messages_per_second() {
        let snap = snapshot(
            Duration::from_secs(10),
            HubStats {
                total_messages: 50,
                ..HubStats::default()
            },
        );
        assert!((snap.messages_per_second() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn bandwidth_mbps() {
        // 1_000_000 bytes over 8 s = 1 Mbps
        let snap = snapshot(
            Duration::from_secs(8),
            HubStats {
                total_bytes_relayed: 1_000_000,
                ..HubStats::default()
            },
        );
        assert!((snap.bandwidth_mbps() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn connected_users_and_uptime() {
        let snap = snapshot(Duration::from_millis(2500), HubStats::default());
        assert_eq!(snap.connected_users(), 2);
        assert_eq!(snap.uptime_seconds(), 2);
    }

    #[test]
    fn stats_serialize_snake_case() {
        let json = serde_json::to_value(HubStats::default()).unwrap();
        assert_eq!(json["total_connections"], 0);
        assert_eq!(json["total_bytes_relayed"], 0);
        assert_eq!(json["total_evictions"], 0);
    }
}
