//! MAVLink and transport addressing.
//!
//! A MAVLink address packs the system ID into the high byte and the component
//! ID into the low byte of a 16-bit value. Subnets pair an address with a
//! mask and are written in one of four textual forms:
//!
//! | Form                          | Meaning                                    |
//! | ----------------------------- | ------------------------------------------ |
//! | `128.4`                       | exactly this address                       |
//! | `128.0/8`                     | leading 8 bits must match (system 128)     |
//! | `128.0\4`                     | any system, leading 4 component bits match |
//! | `255.16:128.240`              | explicit system and component masks        |
//!
//! Rendering always picks the shortest of these forms, so parsing the text of
//! a subnet yields the same subnet back.

use crate::error::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// MAVLink address (system ID + component ID).
///
/// Ordering is that of the packed value, i.e. system first, then component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MavAddress(u16);

impl MavAddress {
    /// The broadcast address `0.0`.
    pub const BROADCAST: MavAddress = MavAddress(0);

    /// Create an address from a system ID and a component ID.
    #[inline]
    pub const fn new(system: u8, component: u8) -> Self {
        Self(((system as u16) << 8) | component as u16)
    }

    /// Create an address from its packed 16-bit form.
    #[inline]
    pub const fn from_u16(address: u16) -> Self {
        Self(address)
    }

    /// Create an address from wide system and component fields.
    ///
    /// Fails if either does not fit in a byte.
    pub fn from_parts(system: u32, component: u32) -> Result<Self, AddressError> {
        let system = u8::try_from(system)
            .map_err(|_| AddressError::out_of_range("System ID", system.into(), 255))?;
        let component = u8::try_from(component)
            .map_err(|_| AddressError::out_of_range("Component ID", component.into(), 255))?;
        Ok(Self::new(system, component))
    }

    /// Packed 16-bit value.
    #[inline]
    pub const fn address(&self) -> u16 {
        self.0
    }

    /// System ID (high byte).
    #[inline]
    pub const fn system(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Component ID (low byte).
    #[inline]
    pub const fn component(&self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    /// True for `0.0`.
    #[inline]
    pub const fn is_broadcast(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u32> for MavAddress {
    type Error = AddressError;

    fn try_from(address: u32) -> Result<Self, Self::Error> {
        u16::try_from(address)
            .map(Self)
            .map_err(|_| AddressError::out_of_range("Address", address.into(), 65535))
    }
}

impl From<u16> for MavAddress {
    fn from(address: u16) -> Self {
        Self(address)
    }
}

/// Parse one decimal field of an address. Only ASCII digits are accepted.
fn parse_field(text: &str, whole: &str) -> Result<u64, AddressError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::invalid_address(whole));
    }
    text.parse::<u64>()
        .map_err(|_| AddressError::invalid_address(whole))
}

impl FromStr for MavAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (system, component) = s
            .split_once('.')
            .ok_or_else(|| AddressError::invalid_address(s))?;
        let system = parse_field(system, s)?;
        let component = parse_field(component, s)?;

        if system > 255 {
            return Err(AddressError::out_of_range("System ID", system, 255));
        }
        if component > 255 {
            return Err(AddressError::out_of_range("Component ID", component, 255));
        }

        Ok(Self::new(system as u8, component as u8))
    }
}

impl TryFrom<String> for MavAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MavAddress> for String {
    fn from(address: MavAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for MavAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.system(), self.component())
    }
}

/// A set of MAVLink addresses sharing the masked bits of `address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MavSubnet {
    address: MavAddress,
    mask: u16,
}

impl MavSubnet {
    /// Subnet from an address and a 16-bit mask.
    pub const fn new(address: MavAddress, mask: u16) -> Self {
        Self { address, mask }
    }

    /// Subnet from an address and separate system and component masks.
    pub const fn with_masks(address: MavAddress, system_mask: u8, component_mask: u8) -> Self {
        Self {
            address,
            mask: ((system_mask as u16) << 8) | component_mask as u16,
        }
    }

    /// Subnet containing only `address`.
    pub const fn exact(address: MavAddress) -> Self {
        Self::new(address, 0xFFFF)
    }

    /// Subnet containing every address.
    pub const fn any() -> Self {
        Self::new(MavAddress::BROADCAST, 0)
    }

    /// Subnet from `/bits` notation: the leading `bits` (0 - 16) must match.
    pub fn from_prefix(address: MavAddress, bits: u32) -> Result<Self, AddressError> {
        if bits > 16 {
            return Err(AddressError::MaskOutOfRange {
                notation: "Forward slash".to_string(),
                bits,
                max: 16,
            });
        }
        Ok(Self::new(address, ((0xFFFF_u32 << (16 - bits)) & 0xFFFF) as u16))
    }

    /// Subnet from `\bits` notation: any system, the leading `bits` (0 - 8) of
    /// the component must match.
    pub fn from_component_prefix(address: MavAddress, bits: u32) -> Result<Self, AddressError> {
        if bits > 8 {
            return Err(AddressError::MaskOutOfRange {
                notation: "Backslash".to_string(),
                bits,
                max: 8,
            });
        }
        Ok(Self::new(address, ((0xFFFF_u32 << (8 - bits)) & 0x00FF) as u16))
    }

    /// Address the subnet was written with.
    #[inline]
    pub const fn address(&self) -> MavAddress {
        self.address
    }

    /// 16-bit mask, system mask in the high byte.
    #[inline]
    pub const fn mask(&self) -> u16 {
        self.mask
    }

    /// Whether `address` falls inside the subnet.
    #[inline]
    pub const fn contains(&self, address: MavAddress) -> bool {
        (address.address() & self.mask) == (self.address.address() & self.mask)
    }
}

impl FromStr for MavSubnet {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(split) = s.find([':', '/', '\\']) else {
            return s
                .parse::<MavAddress>()
                .map(Self::exact)
                .map_err(|_| AddressError::invalid_subnet(s));
        };

        let (address, rest) = s.split_at(split);
        let notation = rest.as_bytes()[0];
        let suffix = &rest[1..];
        if suffix.contains([':', '/', '\\']) {
            return Err(AddressError::invalid_subnet(s));
        }

        let address: MavAddress = address
            .parse()
            .map_err(|_| AddressError::invalid_subnet(s))?;

        match notation {
            b':' => {
                let mask: MavAddress = suffix
                    .parse()
                    .map_err(|_| AddressError::invalid_subnet(s))?;
                Ok(Self::new(address, mask.address()))
            }
            _ => {
                if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(AddressError::invalid_subnet(s));
                }
                let bits = suffix.parse::<u32>().unwrap_or(u32::MAX);
                if notation == b'/' {
                    Self::from_prefix(address, bits)
                } else {
                    Self::from_component_prefix(address, bits)
                }
            }
        }
    }
}

impl TryFrom<String> for MavSubnet {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MavSubnet> for String {
    fn from(subnet: MavSubnet) -> Self {
        subnet.to_string()
    }
}

impl fmt::Display for MavSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;

        let mask = self.mask;
        let low = mask as u8;
        if mask == 0xFFFF {
            Ok(())
        } else if mask.count_ones() == mask.leading_ones() {
            write!(f, "/{}", mask.leading_ones())
        } else if mask & 0xFF00 == 0 && low.count_ones() == low.leading_ones() {
            write!(f, "\\{}", low.leading_ones())
        } else {
            write!(f, ":{}", MavAddress::from_u16(mask))
        }
    }
}

/// IPv4 address and port of a UDP peer.
///
/// Only used as connection metadata, never by filter conditions. A port of 0
/// means "unspecified" and is omitted from the text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpAddress {
    address: Ipv4Addr,
    port: u16,
}

impl IpAddress {
    pub const fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    /// Same address with a different port.
    pub const fn with_port(&self, port: u16) -> Self {
        Self::new(self.address, port)
    }

    pub const fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for IpAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidIp {
            value: s.to_string(),
        };

        let (address, port) = match s.split_once(':') {
            Some((address, port)) => {
                if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let port = port.parse::<u64>().map_err(|_| invalid())?;
                let port = u16::try_from(port)
                    .map_err(|_| AddressError::out_of_range("Port number", port, 65535))?;
                (address, port)
            }
            None => (s, 0),
        };

        let address = address.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        Ok(Self::new(address, port))
    }
}

impl TryFrom<String> for IpAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IpAddress> for String {
    fn from(address: IpAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if self.port != 0 {
            write!(f, ":{}", self.port)?;
        }
        Ok(())
    }
}
