//! Wire format of the messages a TURN client exchanges with its relay:
//! STUN requests, responses and indications (RFC 5389) with the TURN
//! methods and attributes (RFC 5766), plus ChannelData framing.
//!
//! Messages are assembled with [`StunMessageBuilder`], written by a
//! [`MessageEncoder`] and read back by a [`MessageDecoder`]. The decoder
//! checks FINGERPRINT whenever it is present, and MESSAGE-INTEGRITY when its
//! [`DecoderContext`] carries a key and asks for validation.
//!
//! # Usage
//! An Allocate request as a client sends it first, without credentials:
//!```rust
//! # use turn_rs::attributes::stun::Software;
//! # use turn_rs::attributes::turn::RequestedTransport;
//! # use turn_rs::methods::ALLOCATE;
//! # use turn_rs::{MessageClass, MessageEncoderBuilder, StunMessageBuilder, TransactionId};
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let request = StunMessageBuilder::new(ALLOCATE, MessageClass::Request, TransactionId::from([0x01; 12]))
//!     .with_attribute(RequestedTransport::udp())
//!     .with_attribute(Software::new("turn-rs")?)
//!     .build();
//!
//! let encoder = MessageEncoderBuilder::default().build();
//! let bytes = encoder.encode_to_vec(&request)?;
//! assert_eq!(bytes.len(), 40);
//! #   Ok(())
//! # }
//!```
//!
//! Reading the RFC 5769 IPv4 response with its short-term key:
//!```rust
//! # use turn_rs::attributes::stun::XorMappedAddress;
//! # use turn_rs::methods::BINDING;
//! # use turn_rs::{DecoderContextBuilder, HMACKey, MessageClass, MessageDecoderBuilder};
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let key = HMACKey::new_short_term(turn_vectors::RFC5769_PASSWORD)?;
//! let ctx = DecoderContextBuilder::default()
//!     .with_key(key)
//!     .with_validation()
//!     .build();
//! let decoder = MessageDecoderBuilder::default().with_context(ctx).build();
//!
//! let (response, size) = decoder.decode(&turn_vectors::SAMPLE_IPV4_RESPONSE)?;
//! assert_eq!(size, 80);
//! assert_eq!(response.method(), BINDING);
//! assert_eq!(response.class(), MessageClass::SuccessResponse);
//!
//! let mapped = response
//!     .get::<XorMappedAddress>()
//!     .ok_or("XOR-MAPPED-ADDRESS missing")?
//!     .as_xor_mapped_address()?;
//! assert_eq!(mapped.socket_address().to_string(), "192.0.2.1:32853");
//! #   Ok(())
//! # }
//!```

#![deny(missing_docs)]

pub mod attributes;
mod channel_data;
mod common;
mod context;
pub mod error;
mod message;
pub mod methods;
mod raw;
mod strings;
mod types;

pub use crate::attributes::{AttributeType, StunAttribute, StunAttributeType};
pub use crate::channel_data::{
    demultiplex, ChannelData, PacketKind, CHANNEL_DATA_HEADER_SIZE, MAX_CHANNEL_NUMBER,
    MIN_CHANNEL_NUMBER,
};
pub use crate::context::{
    DecoderContext, DecoderContextBuilder, EncoderContext, EncoderContextBuilder, MessageDecoder,
    MessageDecoderBuilder, MessageEncoder, MessageEncoderBuilder, StunPadding,
};
pub use crate::error::{StunDecodeError, StunEncodeError, StunError, StunErrorType};
pub use crate::message::{
    MessageClass, MessageMethod, MessageType, StunMessage, StunMessageBuilder,
};
pub use crate::raw::MESSAGE_HEADER_SIZE;
pub use crate::types::{
    AddressFamily, Cookie, CredentialMechanism, ErrorCode, HMACKey, TransactionId, MAGIC_COOKIE,
};

trait Encode {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError>;
}

trait Decode<'a> {
    fn decode(raw_value: &'a [u8]) -> Result<(Self, usize), StunError>
    where
        Self: Sized;
}
