//! Addresses reachable through one connection.

use mavtables_core::MavAddress;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Entry {
    order: u64,
    last_seen: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<MavAddress, Entry>,
    next_order: u64,
}

/// Set of MAVLink addresses learned on a connection.
///
/// With a timeout configured, addresses not re-added within the timeout are
/// treated as gone and dropped on the next write.
#[derive(Debug, Default)]
pub struct AddressPool {
    inner: RwLock<Inner>,
    timeout: Option<Duration>,
}

impl AddressPool {
    /// Pool whose addresses never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool forgetting addresses not seen for `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn is_live(&self, entry: &Entry, now: Instant) -> bool {
        self.timeout
            .map_or(true, |timeout| now.duration_since(entry.last_seen) <= timeout)
    }

    /// Add an address, or refresh it if already known.
    ///
    /// Returns true if the address was not in the pool.
    pub fn add(&self, address: MavAddress) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.write();
        self.purge_locked(&mut inner, now);

        if let Some(entry) = inner.entries.get_mut(&address) {
            entry.last_seen = now;
            return false;
        }

        let order = inner.next_order;
        inner.next_order += 1;
        inner.entries.insert(
            address,
            Entry {
                order,
                last_seen: now,
            },
        );
        true
    }

    pub fn contains(&self, address: MavAddress) -> bool {
        let now = Instant::now();
        self.inner
            .read()
            .entries
            .get(&address)
            .is_some_and(|entry| self.is_live(entry, now))
    }

    /// Live addresses in the order they were first added.
    pub fn addresses(&self) -> Vec<MavAddress> {
        let now = Instant::now();
        let inner = self.inner.read();
        let mut live: Vec<_> = inner
            .entries
            .iter()
            .filter(|(_, entry)| self.is_live(entry, now))
            .map(|(address, entry)| (entry.order, *address))
            .collect();
        live.sort_unstable_by_key(|(order, _)| *order);
        live.into_iter().map(|(_, address)| address).collect()
    }

    /// Drop expired addresses, returning them.
    pub fn purge_expired(&self) -> Vec<MavAddress> {
        let mut inner = self.inner.write();
        self.purge_locked(&mut inner, Instant::now())
    }

    fn purge_locked(&self, inner: &mut Inner, now: Instant) -> Vec<MavAddress> {
        if self.timeout.is_none() {
            return Vec::new();
        }
        let expired: Vec<_> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !self.is_live(entry, now))
            .map(|(address, _)| *address)
            .collect();
        for address in &expired {
            inner.entries.remove(address);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.addresses().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
