//! Connection Pool Manager
//!
//! Owns every live connection, keeps a reverse index from MAVLink address to
//! the connections that have seen it, and fans packets out to their queues.

use anyhow::{Context, Result};
use dashmap::DashMap;
use mavtables_core::{MavAddress, SharedPacket};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::connection::{Connection, SendOutcome};
use crate::metrics::{PoolMetrics, PoolStats};

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Connection Pool Manager
///
/// Thread-safe: connections can be added, removed and routed to from any
/// thread.
pub struct ConnectionPool {
    /// Active connections indexed by ID
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// Address -> connections that have learned it. Expired addresses are
    /// dropped on `learn` and `purge_expired`; lookups re-check the
    /// connection's own pool in between.
    index: RwLock<HashMap<MavAddress, BTreeSet<ConnectionId>>>,
    /// Metrics collector
    metrics: PoolMetrics,
}

impl ConnectionPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            index: RwLock::new(HashMap::new()),
            metrics: PoolMetrics::new(),
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// IDs of every connection, sorted
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Add a connection to the pool
    ///
    /// Addresses already known to the connection (static configuration) are
    /// indexed immediately. Returns an error if the ID is already in use.
    pub fn add(&self, connection: impl Into<Arc<Connection>>) -> Result<Arc<Connection>> {
        let connection = connection.into();
        let id = connection.id().clone();

        match self.connections.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                anyhow::bail!("Connection with ID '{}' already exists", id);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&connection));
            }
        }

        let addresses = connection.addresses().addresses();
        if !addresses.is_empty() {
            let mut index = self.index.write();
            for address in &addresses {
                index.entry(*address).or_default().insert(id.clone());
            }
        }

        self.metrics.record_connection_added();
        info!(
            connection_id = %id,
            mirror = connection.is_mirror(),
            addresses = addresses.len(),
            total_connections = self.connection_count(),
            "Connection added to pool"
        );

        Ok(connection)
    }

    /// Remove a connection from the pool
    ///
    /// Closes its queue so the writer drains what is left and stops.
    pub fn remove(&self, id: &str) -> Result<Arc<Connection>> {
        let (_, connection) = self
            .connections
            .remove(id)
            .with_context(|| format!("Connection '{}' not found", id))?;

        connection.close();
        self.index.write().retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });

        self.metrics.record_connection_removed();
        info!(
            connection_id = %id,
            total_connections = self.connection_count(),
            "Connection removed from pool"
        );

        Ok(connection)
    }

    /// Get a connection by ID
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Record that `address` is reachable through connection `id`.
    ///
    /// Returns true if the connection had not seen the address before.
    pub fn learn(&self, id: &str, address: MavAddress) -> Result<bool> {
        let connection = self
            .get(id)
            .with_context(|| format!("Connection '{}' not found", id))?;

        let expired = connection.addresses().purge_expired();
        let added = connection.add_address(address);
        if !added && expired.is_empty() {
            return Ok(false);
        }

        let mut index = self.index.write();
        Self::unindex(&mut index, id, &expired);
        // A concurrent remove may have already cleared this connection
        if added && self.connections.contains_key(id) {
            index.entry(address).or_default().insert(connection.id().clone());
            debug!(connection_id = %id, address = %address, "Learned address");
        }
        Ok(added)
    }

    /// Drop expired addresses of every connection from the routing index.
    ///
    /// Returns the number of addresses dropped.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<(ConnectionId, Vec<MavAddress>)> = self
            .connections
            .iter()
            .map(|e| (e.key().clone(), e.value().addresses().purge_expired()))
            .filter(|(_, expired)| !expired.is_empty())
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut index = self.index.write();
        let mut dropped = 0;
        for (id, addresses) in &expired {
            Self::unindex(&mut index, id, addresses);
            dropped += addresses.len();
        }
        debug!(dropped, "Purged expired addresses");
        dropped
    }

    fn unindex(
        index: &mut HashMap<MavAddress, BTreeSet<ConnectionId>>,
        id: &str,
        addresses: &[MavAddress],
    ) {
        for address in addresses {
            if let Some(ids) = index.get_mut(address) {
                ids.remove(id);
                if ids.is_empty() {
                    index.remove(address);
                }
            }
        }
    }

    /// Number of addresses in the routing index.
    pub fn indexed_addresses(&self) -> usize {
        self.index.read().len()
    }

    /// Connections through which `dest` is reachable, excluding `origin`.
    pub fn route(&self, dest: MavAddress, origin: Option<&str>) -> BTreeSet<ConnectionId> {
        let candidates = match self.index.read().get(&dest) {
            Some(ids) => ids.clone(),
            None => return BTreeSet::new(),
        };

        candidates
            .into_iter()
            .filter(|id| Some(id.as_str()) != origin)
            .filter(|id| {
                self.connections
                    .get(id.as_str())
                    .is_some_and(|conn| conn.contains(dest))
            })
            .collect()
    }

    /// Offer `packet` to every connection that should see it, except `origin`.
    ///
    /// A packet with a specific destination goes to the connections that know
    /// that address plus every mirror connection. Broadcasts and packets
    /// without a destination go to every connection. Each connection applies
    /// its own filter. Returns the number of queues the packet was pushed to.
    pub fn send(&self, packet: &SharedPacket, origin: Option<&str>) -> usize {
        let targets: Vec<Arc<Connection>> = match packet.dest() {
            Some(dest) if !dest.is_broadcast() => {
                let routed = self.route(dest, origin);
                self.connections
                    .iter()
                    .filter(|e| Some(e.key().as_str()) != origin)
                    .filter(|e| e.value().is_mirror() || routed.contains(e.key()))
                    .map(|e| Arc::clone(e.value()))
                    .collect()
            }
            _ => self
                .connections
                .iter()
                .filter(|e| Some(e.key().as_str()) != origin)
                .map(|e| Arc::clone(e.value()))
                .collect(),
        };

        let mut queued = 0;
        for connection in targets {
            match connection.send(packet, origin) {
                SendOutcome::Queued { .. } => {
                    queued += 1;
                    self.metrics.record_packet_queued();
                }
                SendOutcome::Rejected | SendOutcome::Dropped(_) => {
                    self.metrics.record_packet_dropped();
                }
                SendOutcome::Unreachable => {}
            }
        }

        trace!(
            packet = %packet.name(),
            origin = origin.unwrap_or("-"),
            queued,
            "Packet distributed"
        );
        queued
    }

    /// Handle a packet arriving on connection `origin`: learn its source
    /// address there, then send it to every other connection.
    pub fn receive(&self, origin: &str, packet: &SharedPacket) -> Result<usize> {
        self.learn(origin, packet.source())?;
        Ok(self.send(packet, Some(origin)))
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        self.metrics.snapshot(self.connection_count())
    }

    /// Close every connection's queue without removing it.
    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().close();
        }
        info!(connections = self.connection_count(), "Closed all connection queues");
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
