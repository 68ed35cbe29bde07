//! mavtables Connection Pool
//!
//! Per-peer connections and the pool that routes packets between them.
//!
//! # Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │       Connection Pool            │
//!        │  (pool.rs)                       │
//!        │  - add/remove/learn              │
//!        │  - address -> connections index  │
//!        │  - route, send, receive          │
//!        └──────────┬───────────────────────┘
//!                   │ one per peer
//!        ┌──────────▼───────────────────────┐
//!        │       Connection                 │
//!        │  (connection.rs)                 │
//!        │  - Filter (shared)               │
//!        │  - AddressPool (address_pool.rs) │
//!        │  - PacketQueue (queue.rs)        │
//!        └──────────┬───────────────────────┘
//!                   │ next_packet()
//!              transport writer
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use mavtables_core::{MavAddress, MavPacket};
//! use mavtables_filter::FilterConfig;
//! use mavtables_pool::{Connection, ConnectionPool};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let filter = Arc::new(FilterConfig::example().into_filter().unwrap());
//! let pool = ConnectionPool::new();
//! pool.add(Connection::builder("gcs", filter.clone()).build()).unwrap();
//! pool.add(Connection::builder("vehicle", filter).build()).unwrap();
//! pool.learn("vehicle", MavAddress::new(1, 1)).unwrap();
//!
//! let packet = MavPacket::builder(76, "COMMAND_LONG")
//!     .source(MavAddress::new(255, 190))
//!     .dest(MavAddress::new(1, 1))
//!     .build()
//!     .shared();
//! assert_eq!(pool.receive("gcs", &packet).unwrap(), 1);
//!
//! let vehicle = pool.get("vehicle").unwrap();
//! let out = vehicle.next_packet(Duration::from_millis(10)).unwrap();
//! assert_eq!(out.name(), "COMMAND_LONG");
//! ```

pub mod address_pool;
pub mod connection;
pub mod metrics;
pub mod pool;
pub mod queue;

pub use address_pool::AddressPool;
pub use connection::{Connection, ConnectionBuilder, SendOutcome};
pub use metrics::{PoolMetrics, PoolStats};
pub use pool::{ConnectionId, ConnectionPool};
pub use queue::{PacketQueue, QueuedPacket};
