//! A single link to a group of MAVLink components.
//!
//! A connection knows which addresses are reachable through it, filters every
//! packet offered to it and queues the accepted ones for its writer.

use crate::address_pool::AddressPool;
use crate::pool::ConnectionId;
use crate::queue::{PacketQueue, QueuedPacket};
use mavtables_core::config::AppConfig;
use mavtables_core::error::QueueError;
use mavtables_core::{MavAddress, SharedPacket};
use mavtables_filter::{Context, Filter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// What happened to a packet offered to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for transmission at this priority
    Queued { priority: i32 },
    /// Every candidate address was rejected by the filter
    Rejected,
    /// No address on this connection is a candidate
    Unreachable,
    /// Accepted but the queue refused it
    Dropped(QueueError),
}

impl SendOutcome {
    #[inline]
    pub fn is_queued(&self) -> bool {
        matches!(self, SendOutcome::Queued { .. })
    }
}

/// Connection: filter + address pool + outbound queue.
pub struct Connection {
    id: ConnectionId,
    filter: Arc<Filter>,
    addresses: AddressPool,
    queue: Arc<PacketQueue<SharedPacket>>,
    mirror: bool,
}

impl Connection {
    /// Start building a connection with the given ID and filter.
    pub fn builder(id: impl Into<ConnectionId>, filter: Arc<Filter>) -> ConnectionBuilder {
        ConnectionBuilder::new(id.into(), filter)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn filter(&self) -> &Arc<Filter> {
        &self.filter
    }

    pub fn addresses(&self) -> &AddressPool {
        &self.addresses
    }

    /// Outbound queue, shared with the writer.
    pub fn queue(&self) -> &Arc<PacketQueue<SharedPacket>> {
        &self.queue
    }

    /// A mirror connection is offered every packet regardless of destination.
    pub fn is_mirror(&self) -> bool {
        self.mirror
    }

    /// Record that `address` is reachable here. Returns true if it was new.
    pub fn add_address(&self, address: MavAddress) -> bool {
        self.addresses.add(address)
    }

    pub fn contains(&self, address: MavAddress) -> bool {
        self.addresses.contains(address)
    }

    /// Filter `packet` and queue it if accepted.
    ///
    /// A packet addressed to a specific component is only considered if that
    /// component is reachable here. Broadcasts, packets without a target and
    /// every packet on a mirror connection are checked against each reachable
    /// address and queued once with the highest accepted priority.
    pub fn send(&self, packet: &SharedPacket, ingress: Option<&str>) -> SendOutcome {
        let outcome = match packet.dest() {
            Some(dest) if !dest.is_broadcast() && !self.mirror => {
                self.send_to_address(packet, dest, ingress)
            }
            _ => self.send_to_all(packet, ingress),
        };

        trace!(
            connection = %self.id,
            packet = %packet.name(),
            source = %packet.source(),
            outcome = ?outcome,
            "Offered packet"
        );
        outcome
    }

    fn send_to_address(
        &self,
        packet: &SharedPacket,
        dest: MavAddress,
        ingress: Option<&str>,
    ) -> SendOutcome {
        if !self.addresses.contains(dest) {
            return SendOutcome::Unreachable;
        }

        let ctx = Context { dest, ingress };
        match self.filter.will_accept(packet.as_ref(), &ctx) {
            (true, priority) => self.enqueue(packet, priority),
            (false, _) => SendOutcome::Rejected,
        }
    }

    fn send_to_all(&self, packet: &SharedPacket, ingress: Option<&str>) -> SendOutcome {
        let addresses = self.addresses.addresses();
        if addresses.is_empty() {
            return SendOutcome::Unreachable;
        }

        let best = addresses
            .into_iter()
            .filter_map(|dest| {
                let ctx = Context { dest, ingress };
                match self.filter.will_accept(packet.as_ref(), &ctx) {
                    (true, priority) => Some(priority),
                    (false, _) => None,
                }
            })
            .max();

        match best {
            Some(priority) => self.enqueue(packet, priority),
            None => SendOutcome::Rejected,
        }
    }

    fn enqueue(&self, packet: &SharedPacket, priority: i32) -> SendOutcome {
        match self.queue.try_push(packet.clone(), priority) {
            Ok(()) => SendOutcome::Queued { priority },
            Err(err) => {
                warn!(
                    connection = %self.id,
                    packet = %packet.name(),
                    error = %err,
                    "Dropping accepted packet"
                );
                SendOutcome::Dropped(err)
            }
        }
    }

    /// Next packet to transmit, waiting up to `timeout`.
    ///
    /// `Duration::MAX` waits until a packet arrives or the connection closes.
    pub fn next_packet(&self, timeout: Duration) -> Result<SharedPacket, QueueError> {
        self.queue.pop_timeout(timeout).map(QueuedPacket::into_packet)
    }

    /// Close the outbound queue; the writer drains it and then stops.
    pub fn close(&self) {
        self.queue.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addresses", &self.addresses.addresses())
            .field("queue", &self.queue)
            .field("mirror", &self.mirror)
            .finish()
    }
}

/// Builder for [`Connection`].
pub struct ConnectionBuilder {
    id: ConnectionId,
    filter: Arc<Filter>,
    queue_capacity: Option<usize>,
    address_timeout: Option<Duration>,
    mirror: bool,
    on_push: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ConnectionBuilder {
    pub fn new(id: ConnectionId, filter: Arc<Filter>) -> Self {
        Self {
            id,
            filter,
            queue_capacity: None,
            address_timeout: None,
            mirror: false,
            on_push: None,
        }
    }

    /// Take queue capacity and address timeout from the application config.
    pub fn config(self, config: &AppConfig) -> Self {
        self.queue_capacity(config.queue.capacity)
            .address_timeout(config.address_pool.timeout())
    }

    /// Bound the outbound queue. Zero is raised to one.
    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn address_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.address_timeout = timeout;
        self
    }

    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Called after each packet is queued, e.g. to wake a writer.
    pub fn on_push<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_push = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Connection {
        let mut queue = PacketQueue::with_capacity(self.queue_capacity);
        if let Some(callback) = self.on_push {
            queue = queue.with_push_callback(callback);
        }
        let addresses = match self.address_timeout {
            Some(timeout) => AddressPool::with_timeout(timeout),
            None => AddressPool::new(),
        };

        Connection {
            id: self.id,
            filter: self.filter,
            addresses,
            queue: Arc::new(queue),
            mirror: self.mirror,
        }
    }
}
