const XOR_RELAYED_ADDRESS: u16 = 0x0016;

crate::attributes::address_port::xor_socket_addr_attribute!(
    /// The XOR-RELAYED-ADDRESS is present in Allocate responses. It
    /// specifies the address and port that the server allocated to the
    /// client.
    XorRelayedAddress,
    XOR_RELAYED_ADDRESS,
);
