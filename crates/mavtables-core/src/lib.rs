//! # mavtables core
//!
//! Shared building blocks for the mavtables MAVLink firewall:
//!
//! - **Addresses**: [`MavAddress`] (system + component), [`MavSubnet`]
//!   (address + mask, with the `/`, `\` and `:` notations) and [`IpAddress`]
//!   for UDP peer metadata.
//! - **Packets**: the [`Packet`] trait that decoders implement, plus the owned
//!   [`MavPacket`].
//! - **Errors**: `thiserror` error types shared by the filter and pool crates.
//! - **Configuration**: [`AppConfig`], loaded from YAML with environment
//!   overrides.
//!
//! ## Example
//!
//! ```
//! use mavtables_core::{MavAddress, MavSubnet};
//!
//! let subnet: MavSubnet = "128.0/8".parse().unwrap();
//! assert!(subnet.contains(MavAddress::new(128, 42)));
//! assert!(!subnet.contains("129.0".parse().unwrap()));
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod packet;

pub use address::{IpAddress, MavAddress, MavSubnet};
pub use config::AppConfig;
pub use error::{MavtablesError, Result};
pub use packet::{MavPacket, Packet, PacketVersion, SharedPacket};
