use crate::client::ClientState;
use crate::error::TurnError;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Events produced by the [`TurnClient`](crate::client::TurnClient).
/// They are drained with [`TurnClient::events`](crate::client::TurnClient::events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnClientEvent {
    /// Datagram to be sent to the server
    OutputPacket(Vec<u8>),
    /// [`TurnClient::on_timeout`](crate::client::TurnClient::on_timeout)
    /// must be called once this time elapses. A new event replaces the
    /// previous one. No event after an input means no timer is armed.
    TimeoutScheduled(Duration),
    /// The client moved to a new state
    StateChanged(ClientState),
    /// Data relayed from a peer
    DataReceived {
        /// Transport address of the peer
        peer: SocketAddr,
        /// Application data
        data: Vec<u8>,
    },
    /// A permission was installed or renewed
    PermissionCreated(IpAddr),
    /// A permission could not be installed or renewed
    PermissionFailed(IpAddr, TurnError),
    /// A channel was bound or its binding renewed
    ChannelBound {
        /// Channel number
        channel: u16,
        /// Peer bound to the channel
        peer: SocketAddr,
    },
    /// A channel could not be bound or its binding renewed
    ChannelBindFailed {
        /// Channel number
        channel: u16,
        /// Peer the channel was meant for
        peer: SocketAddr,
        /// Reason
        error: TurnError,
    },
    /// Fatal error, the client moves to [`ClientState::Error`]
    Error(TurnError),
}
