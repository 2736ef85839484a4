use std::error;
use std::fmt;
use turn_rs::error::{StunDecodeError, StunEncodeError};
use turn_rs::StunError;

/// Errors reported by the TURN client, either synchronously by its
/// operations or through [`TurnClientEvent::Error`](crate::events::TurnClientEvent::Error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// The transaction ran out of retransmissions without a response
    Timeout,
    /// The server answered with an error response
    ServerError {
        /// Numeric error code
        code: u16,
        /// Reason phrase sent by the server
        reason: String,
    },
    /// The channel or the peer is already bound to a different counterpart
    BindingConflict,
    /// Data can not be sent before the allocation is ready
    NotReady,
    /// No permission nor channel is installed for the peer
    NoPermission,
    /// Channel number out of the range `0x4000..=0x7FFF`, or no channel left
    InvalidChannel,
    /// The operation is not allowed in the current client state
    InvalidState,
    /// The queue of pending outbound data is full
    QueueFull,
    /// The allocation lifetime elapsed without a successful refresh
    AllocationExpired,
    /// Every response received for a transaction failed the integrity check
    ProtectionViolated,
    /// A response carried comprehension-required attributes this client does
    /// not understand
    UnknownAttributes(Vec<u16>),
    /// The transport failed
    Transport(String),
    /// A message could not be encoded
    Encode(String),
    /// The client configuration is not valid
    InvalidConfig(String),
    /// A success response lacks a mandatory attribute
    MalformedResponse(String),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TurnError::Timeout => write!(f, "transaction timed out"),
            TurnError::ServerError { code, reason } => {
                write!(f, "server error {}: {}", code, reason)
            }
            TurnError::BindingConflict => write!(f, "channel binding conflict"),
            TurnError::NotReady => write!(f, "allocation not ready"),
            TurnError::NoPermission => write!(f, "no permission installed for peer"),
            TurnError::InvalidChannel => write!(f, "invalid channel number"),
            TurnError::InvalidState => write!(f, "operation not allowed in current state"),
            TurnError::QueueFull => write!(f, "send queue is full"),
            TurnError::AllocationExpired => write!(f, "allocation expired"),
            TurnError::ProtectionViolated => write!(f, "integrity protection violated"),
            TurnError::UnknownAttributes(attrs) => {
                write!(f, "unknown comprehension-required attributes: [")?;
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "0x{:04X}", attr)?;
                }
                write!(f, "]")
            }
            TurnError::Transport(e) => write!(f, "transport error: {}", e),
            TurnError::Encode(e) => write!(f, "encode error: {}", e),
            TurnError::InvalidConfig(e) => write!(f, "invalid configuration: {}", e),
            TurnError::MalformedResponse(e) => write!(f, "malformed response: {}", e),
        }
    }
}

impl error::Error for TurnError {}

impl From<StunEncodeError> for TurnError {
    fn from(e: StunEncodeError) -> Self {
        TurnError::Encode(e.to_string())
    }
}

impl From<StunError> for TurnError {
    fn from(e: StunError) -> Self {
        TurnError::Encode(e.to_string())
    }
}

/// Reasons why an inbound datagram was not processed. None of them changes
/// the state of the client, the datagram is simply dropped.
#[derive(Debug)]
pub enum StunAgentError {
    /// The datagram is neither a valid STUN message nor ChannelData
    DecodeError(StunDecodeError),
    /// Valid message that nobody was waiting for
    Discarded,
    /// A transaction with the same id is already in progress
    DuplicatedTransaction,
}

impl fmt::Display for StunAgentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StunAgentError::DecodeError(e) => write!(f, "decode error: {}", e),
            StunAgentError::Discarded => write!(f, "message discarded"),
            StunAgentError::DuplicatedTransaction => write!(f, "duplicated transaction"),
        }
    }
}

impl error::Error for StunAgentError {}

impl From<StunDecodeError> for StunAgentError {
    fn from(e: StunDecodeError) -> Self {
        StunAgentError::DecodeError(e)
    }
}
