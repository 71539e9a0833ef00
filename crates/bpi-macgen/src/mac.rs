//! Interface table and MAC address derivation

use std::fmt;

use crate::serial::SERIAL_BYTES;

/// First octet of every generated address: unicast, locally administered
pub const LOCAL_ADMIN_PREFIX: u8 = 0x02;

/// Interface family, stored in the second octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InterfaceType {
    /// Wired LAN port
    Lan = 0x01,
    /// Wireless radio
    Wifi = 0x02,
}

/// A network interface that gets an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    /// Interface name as written to the address file
    pub name: &'static str,
    /// Interface family
    pub kind: InterfaceType,
    /// Position within its family, stored in the third octet
    pub index: u8,
}

impl Interface {
    const fn new(name: &'static str, kind: InterfaceType, index: u8) -> Self {
        Self { name, kind, index }
    }
}

/// Interfaces of the board, in assignment order
pub const INTERFACES: [Interface; 7] = [
    Interface::new("lan0", InterfaceType::Lan, 0),
    Interface::new("lan1", InterfaceType::Lan, 1),
    Interface::new("lan2", InterfaceType::Lan, 2),
    Interface::new("lan3", InterfaceType::Lan, 3),
    Interface::new("wifi0", InterfaceType::Wifi, 0),
    Interface::new("wifi1", InterfaceType::Wifi, 1),
    Interface::new("wifi2", InterfaceType::Wifi, 2),
];

/// A 48-bit MAC address, displayed as lowercase colon-separated hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Address for `interface`; `increment` is added to the last serial byte.
pub fn generate_mac(
    interface: &Interface,
    serial: [u8; SERIAL_BYTES],
    increment: u8,
) -> MacAddress {
    let [s0, s1, s2] = serial;
    MacAddress([
        LOCAL_ADMIN_PREFIX,
        interface.kind as u8,
        interface.index,
        s0,
        s1,
        s2.wrapping_add(increment),
    ])
}

/// One generated address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Interface the address belongs to
    pub interface: Interface,
    /// Generated address
    pub mac: MacAddress,
}

/// Addresses for every entry of [`INTERFACES`]; the n-th interface adds `n`
/// to the last serial byte.
pub fn generate_all(serial: [u8; SERIAL_BYTES]) -> Vec<Assignment> {
    (0u8..)
        .zip(INTERFACES.iter())
        .map(|(increment, interface)| Assignment {
            interface: *interface,
            mac: generate_mac(interface, serial, increment),
        })
        .collect()
}
