//! Metrics Collection
//!
//! Counts connection churn and the fate of every packet copy offered to a
//! connection. Each counter is kept both as an in-process atomic (for
//! [`PoolStats`] snapshots) and as a `metrics` counter for whatever recorder
//! the embedding process installs.

use metrics::{counter, describe_counter};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pool metrics collector
#[derive(Debug)]
pub struct PoolMetrics {
    packets_queued: AtomicU64,
    packets_dropped: AtomicU64,
    connections_added: AtomicU64,
    connections_removed: AtomicU64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        describe_counter!(
            "pool_packets_queued_total",
            "Packet copies queued on a connection"
        );
        describe_counter!(
            "pool_packets_dropped_total",
            "Packet copies rejected by a filter or refused by a full or closed queue"
        );
        describe_counter!("pool_connections_added_total", "Total connections added");
        describe_counter!("pool_connections_removed_total", "Total connections removed");

        Self {
            packets_queued: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            connections_added: AtomicU64::new(0),
            connections_removed: AtomicU64::new(0),
        }
    }

    pub fn record_packet_queued(&self) {
        self.packets_queued.fetch_add(1, Ordering::Relaxed);
        counter!("pool_packets_queued_total").increment(1);
    }

    pub fn record_packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
        counter!("pool_packets_dropped_total").increment(1);
    }

    pub fn record_connection_added(&self) {
        self.connections_added.fetch_add(1, Ordering::Relaxed);
        counter!("pool_connections_added_total").increment(1);
    }

    pub fn record_connection_removed(&self) {
        self.connections_removed.fetch_add(1, Ordering::Relaxed);
        counter!("pool_connections_removed_total").increment(1);
    }

    pub fn snapshot(&self, connections: usize) -> PoolStats {
        PoolStats {
            connections,
            packets_queued: self.packets_queued.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            connections_added: self.connections_added.load(Ordering::Relaxed),
            connections_removed: self.connections_removed.load(Ordering::Relaxed),
        }
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently in the pool
    pub connections: usize,
    pub packets_queued: u64,
    pub packets_dropped: u64,
    pub connections_added: u64,
    pub connections_removed: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PoolStats(connections: {}, queued: {}, dropped: {}, added: {}, removed: {})",
            self.connections,
            self.packets_queued,
            self.packets_dropped,
            self.connections_added,
            self.connections_removed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_metrics() {
        let metrics = PoolMetrics::new();
        metrics.record_packet_queued();
        metrics.record_packet_queued();
        metrics.record_packet_dropped();
        metrics.record_connection_added();

        let stats = metrics.snapshot(1);
        assert_eq!(stats.packets_queued, 2);
        assert_eq!(stats.packets_dropped, 1);
        assert_eq!(stats.connections_added, 1);
        assert_eq!(stats.connections_removed, 0);
        assert!(stats.to_string().contains("queued: 2"));
    }
}
