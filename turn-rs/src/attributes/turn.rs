//! RFC 5766 attributes: allocation lifetime, relayed and peer addresses,
//! channel numbers and application data.

mod channel_number;
mod data;
mod dont_fragment;
mod lifetime;
mod requested_transport;
mod xor_peer_address;
mod xor_relayed_address;

pub use self::{
    channel_number::ChannelNumber, data::Data, dont_fragment::DontFragment, lifetime::LifeTime,
    requested_transport::RequestedTransport, xor_peer_address::XorPeerAddress,
    xor_relayed_address::XorRelayedAddress,
};
