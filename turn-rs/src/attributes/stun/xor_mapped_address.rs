const XOR_MAPPED_ADDRESS: u16 = 0x0020;

crate::attributes::address_port::xor_socket_addr_attribute!(
    /// The XOR-MAPPED-ADDRESS attribute carries the reflexive transport
    /// address of the client as seen by the server, obfuscated through
    /// the XOR function.
    ///
    /// # Examples
    ///```rust
    /// # use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    /// # use turn_rs::attributes::stun::XorMappedAddress;
    /// let socket = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 32853);
    /// let attr = XorMappedAddress::from(socket);
    /// assert_eq!(attr.socket_address().port(), 32853);
    ///```
    XorMappedAddress,
    XOR_MAPPED_ADDRESS,
);
