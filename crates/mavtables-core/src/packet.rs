//! The packet abstraction the filter and router operate on.
//!
//! Wire decoding lives outside this workspace. Decoders hand over values
//! implementing [`Packet`]; everything downstream only reads header fields
//! and never mutates a packet once it has been received.

use crate::address::MavAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// MAVLink protocol version of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketVersion {
    V1,
    V2,
}

impl fmt::Display for PacketVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketVersion::V1 => write!(f, "v1.0"),
            PacketVersion::V2 => write!(f, "v2.0"),
        }
    }
}

/// Read-only view of a decoded MAVLink packet.
pub trait Packet: fmt::Debug + Send + Sync {
    /// Protocol version the packet was received with.
    fn version(&self) -> PacketVersion;

    /// Numeric message ID.
    fn id(&self) -> u32;

    /// Message name, e.g. `HEARTBEAT`.
    fn name(&self) -> &str;

    /// Address of the sender.
    fn source(&self) -> MavAddress;

    /// Target address, if the message type carries one.
    fn dest(&self) -> Option<MavAddress>;

    /// Priority the packet arrived with. Conditions may bound on it.
    fn priority(&self) -> i32 {
        0
    }

    /// Raw packet bytes.
    fn data(&self) -> &[u8];
}

/// Packet shared between every connection it is queued on.
pub type SharedPacket = Arc<dyn Packet>;

/// Owned packet for decoders that have already parsed the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MavPacket {
    version: PacketVersion,
    id: u32,
    name: String,
    source: MavAddress,
    dest: Option<MavAddress>,
    priority: i32,
    data: Vec<u8>,
}

impl MavPacket {
    /// Creates a builder for a packet with the given message ID and name.
    pub fn builder(id: u32, name: impl Into<String>) -> MavPacketBuilder {
        MavPacketBuilder::new(id, name)
    }

    /// Wraps the packet for sharing across queues.
    pub fn shared(self) -> SharedPacket {
        Arc::new(self)
    }
}

impl Packet for MavPacket {
    fn version(&self) -> PacketVersion {
        self.version
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> MavAddress {
        self.source
    }

    fn dest(&self) -> Option<MavAddress> {
        self.dest
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for MavPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{}) from {}", self.name, self.id, self.source)?;
        if let Some(dest) = self.dest {
            write!(f, " to {}", dest)?;
        }
        write!(f, " ({})", self.version)
    }
}

/// Builder for [`MavPacket`].
#[derive(Debug)]
pub struct MavPacketBuilder {
    packet: MavPacket,
}

impl MavPacketBuilder {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            packet: MavPacket {
                version: PacketVersion::V2,
                id,
                name: name.into(),
                source: MavAddress::BROADCAST,
                dest: None,
                priority: 0,
                data: Vec::new(),
            },
        }
    }

    pub fn version(mut self, version: PacketVersion) -> Self {
        self.packet.version = version;
        self
    }

    pub fn source(mut self, source: MavAddress) -> Self {
        self.packet.source = source;
        self
    }

    pub fn dest(mut self, dest: MavAddress) -> Self {
        self.packet.dest = Some(dest);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.packet.priority = priority;
        self
    }

    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.packet.data = data.into();
        self
    }

    pub fn build(self) -> MavPacket {
        self.packet
    }

    /// Builds the packet and wraps it for sharing across queues.
    pub fn shared(self) -> SharedPacket {
        self.packet.shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let packet = MavPacket::builder(0, "HEARTBEAT").build();
        assert_eq!(packet.version(), PacketVersion::V2);
        assert_eq!(packet.source(), MavAddress::BROADCAST);
        assert_eq!(packet.dest(), None);
        assert_eq!(packet.priority(), 0);
        assert!(packet.data().is_empty());
    }

    #[test]
    fn test_display() {
        let packet = MavPacket::builder(76, "COMMAND_LONG")
            .version(PacketVersion::V1)
            .source(MavAddress::new(1, 1))
            .dest(MavAddress::new(2, 0))
            .build();
        assert_eq!(packet.to_string(), "COMMAND_LONG (#76) from 1.1 to 2.0 (v1.0)");

        let packet = MavPacket::builder(0, "HEARTBEAT")
            .source(MavAddress::new(3, 1))
            .build();
        assert_eq!(packet.to_string(), "HEARTBEAT (#0) from 3.1 (v2.0)");
    }

    #[test]
    fn test_shared_packet_is_object_safe() {
        let shared: SharedPacket = MavPacket::builder(0, "HEARTBEAT")
            .data(vec![0xFD, 0x09])
            .priority(4)
            .shared();
        assert_eq!(shared.name(), "HEARTBEAT");
        assert_eq!(shared.priority(), 4);
        assert_eq!(shared.data(), &[0xFD, 0x09]);
    }

    #[test]
    fn test_shared_packet_debug() {
        let shared = MavPacket::builder(76, "COMMAND_LONG").shared();
        let result: std::result::Result<SharedPacket, ()> = Ok(shared);
        let text = format!("{:?}", result.unwrap());
        assert!(text.contains("COMMAND_LONG"));
    }
}
