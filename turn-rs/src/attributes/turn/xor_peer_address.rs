const XOR_PEER_ADDRESS: u16 = 0x0012;

crate::attributes::address_port::xor_socket_addr_attribute!(
    /// The XOR-PEER-ADDRESS specifies the address and port of the peer as
    /// seen from the TURN server.
    ///
    /// # Examples
    ///```rust
    /// # use std::net::SocketAddr;
    /// # use turn_rs::attributes::turn::XorPeerAddress;
    /// let peer: SocketAddr = "198.51.100.7:49152".parse().expect("Invalid address");
    /// let attr = XorPeerAddress::from(peer);
    /// assert_eq!(attr.socket_address(), &peer);
    ///```
    XorPeerAddress,
    XOR_PEER_ADDRESS,
);
