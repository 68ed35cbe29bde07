//! Rule conditions.
//!
//! An [`If`] matches a packet on any combination of message type, source
//! subnet, destination subnet and priority range. Fields left unset match
//! everything, so `If::any()` always matches.

use mavtables_core::{MavAddress, MavSubnet, Packet};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Message type selector: numeric message ID or message name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PacketType {
    Id(u32),
    Name(String),
}

impl PacketType {
    #[inline]
    pub fn matches(&self, packet: &dyn Packet) -> bool {
        match self {
            PacketType::Id(id) => packet.id() == *id,
            PacketType::Name(name) => packet.name() == name,
        }
    }
}

impl FromStr for PacketType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u32>() {
            Ok(id) => PacketType::Id(id),
            Err(_) => PacketType::Name(s.to_string()),
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Id(id) => write!(f, "#{}", id),
            PacketType::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Conjunction of optional packet predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct If {
    packet_type: Option<PacketType>,
    source: Option<MavSubnet>,
    dest: Option<MavSubnet>,
    min_priority: Option<i32>,
    max_priority: Option<i32>,
}

impl If {
    /// Condition that matches every packet.
    pub fn any() -> Self {
        Self::default()
    }

    /// Require a message type.
    pub fn with_type(mut self, packet_type: PacketType) -> Self {
        self.packet_type = Some(packet_type);
        self
    }

    /// Require a message ID.
    pub fn with_id(self, id: u32) -> Self {
        self.with_type(PacketType::Id(id))
    }

    /// Require a message name.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_type(PacketType::Name(name.into()))
    }

    /// Require the source address to lie in `subnet`.
    pub fn with_source(mut self, subnet: MavSubnet) -> Self {
        self.source = Some(subnet);
        self
    }

    /// Require the destination address to lie in `subnet`.
    pub fn with_dest(mut self, subnet: MavSubnet) -> Self {
        self.dest = Some(subnet);
        self
    }

    /// Require the packet priority to be at least `priority`.
    pub fn with_min_priority(mut self, priority: i32) -> Self {
        self.min_priority = Some(priority);
        self
    }

    /// Require the packet priority to be at most `priority`.
    pub fn with_max_priority(mut self, priority: i32) -> Self {
        self.max_priority = Some(priority);
        self
    }

    pub fn packet_type(&self) -> Option<&PacketType> {
        self.packet_type.as_ref()
    }

    pub fn source(&self) -> Option<MavSubnet> {
        self.source
    }

    pub fn dest(&self) -> Option<MavSubnet> {
        self.dest
    }

    pub fn priority_range(&self) -> (Option<i32>, Option<i32>) {
        (self.min_priority, self.max_priority)
    }

    /// True when no field is set.
    pub fn is_any(&self) -> bool {
        *self == Self::default()
    }

    /// Check the condition against a packet on its way to `dest`.
    ///
    /// The destination is the address being routed to, not necessarily the
    /// packet's own target (broadcasts are checked once per address).
    #[inline]
    pub fn check(&self, packet: &dyn Packet, dest: MavAddress) -> bool {
        if let Some(packet_type) = &self.packet_type {
            if !packet_type.matches(packet) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if !source.contains(packet.source()) {
                return false;
            }
        }
        if let Some(subnet) = &self.dest {
            if !subnet.contains(dest) {
                return false;
            }
        }
        let priority = packet.priority();
        if self.min_priority.is_some_and(|min| priority < min) {
            return false;
        }
        if self.max_priority.is_some_and(|max| priority > max) {
            return false;
        }
        true
    }
}

impl fmt::Display for If {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "if any");
        }

        write!(f, "if")?;
        if let Some(packet_type) = &self.packet_type {
            write!(f, " {}", packet_type)?;
        }
        if let Some(source) = &self.source {
            write!(f, " from {}", source)?;
        }
        if let Some(dest) = &self.dest {
            write!(f, " to {}", dest)?;
        }
        match (self.min_priority, self.max_priority) {
            (Some(min), Some(max)) => write!(f, " with priority >= {} and <= {}", min, max),
            (Some(min), None) => write!(f, " with priority >= {}", min),
            (None, Some(max)) => write!(f, " with priority <= {}", max),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavtables_core::MavPacket;

    fn subnet(s: &str) -> MavSubnet {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> MavAddress {
        s.parse().unwrap()
    }

    fn heartbeat(source: &str) -> MavPacket {
        MavPacket::builder(0, "HEARTBEAT").source(addr(source)).build()
    }

    #[test]
    fn test_any_matches_everything() {
        let cond = If::any();
        assert!(cond.is_any());
        assert!(cond.check(&heartbeat("1.1"), addr("2.2")));
        assert!(cond.check(&heartbeat("255.255"), MavAddress::BROADCAST));
    }

    #[test]
    fn test_type_match() {
        let by_name = If::any().with_name("HEARTBEAT");
        let by_id = If::any().with_id(0);
        let other = If::any().with_name("PING");
        let packet = heartbeat("1.1");

        assert!(by_name.check(&packet, addr("2.2")));
        assert!(by_id.check(&packet, addr("2.2")));
        assert!(!other.check(&packet, addr("2.2")));
        assert!(!If::any().with_id(4).check(&packet, addr("2.2")));
    }

    #[test]
    fn test_source_and_dest() {
        let cond = If::any()
            .with_source(subnet("192.0/8"))
            .with_dest(subnet("127.1"));

        assert!(cond.check(&heartbeat("192.7"), addr("127.1")));
        assert!(!cond.check(&heartbeat("193.7"), addr("127.1")));
        assert!(!cond.check(&heartbeat("192.7"), addr("127.2")));
    }

    #[test]
    fn test_priority_bounds() {
        let cond = If::any().with_min_priority(2).with_max_priority(4);
        let at = |priority| {
            MavPacket::builder(0, "HEARTBEAT")
                .priority(priority)
                .build()
        };

        assert!(!cond.check(&at(1), addr("1.1")));
        assert!(cond.check(&at(2), addr("1.1")));
        assert!(cond.check(&at(4), addr("1.1")));
        assert!(!cond.check(&at(5), addr("1.1")));
    }

    #[test]
    fn test_packet_type_from_str() {
        assert_eq!("76".parse::<PacketType>().unwrap(), PacketType::Id(76));
        assert_eq!(
            "PING".parse::<PacketType>().unwrap(),
            PacketType::Name("PING".to_string())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(If::any().to_string(), "if any");
        assert_eq!(
            If::any()
                .with_name("HEARTBEAT")
                .with_source(subnet("1.0/8"))
                .with_dest(subnet("255.0"))
                .to_string(),
            "if HEARTBEAT from 1.0/8 to 255.0"
        );
        assert_eq!(If::any().with_dest(subnet("1.0\\4")).to_string(), "if to 1.0\\4");
        assert_eq!(
            If::any().with_id(76).with_min_priority(3).to_string(),
            "if #76 with priority >= 3"
        );
        assert_eq!(
            If::any().with_min_priority(-1).with_max_priority(1).to_string(),
            "if with priority >= -1 and <= 1"
        );
    }
}
