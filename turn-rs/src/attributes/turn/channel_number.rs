use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::common::check_buffer_boundaries;
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;
use crate::{Decode, Encode};

const CHANNEL_NUMBER: u16 = 0x000C;

// Number followed by two reserved bytes
const VALUE_SIZE: usize = 4;

/// Channel a ChannelBind request binds to the peer in XOR-PEER-ADDRESS.
///
/// # Examples
///```rust
/// # use turn_rs::attributes::turn::ChannelNumber;
/// assert_eq!(ChannelNumber::new(0x4000).number(), 0x4000);
///```
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ChannelNumber(u16);

impl ChannelNumber {
    /// Attribute for channel `number`. The range is checked by the client,
    /// not here.
    pub fn new(number: u16) -> Self {
        Self(number)
    }

    /// The channel number
    pub fn number(&self) -> u16 {
        self.0
    }
}

impl DecodeAttributeValue for ChannelNumber {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let value = ctx.raw_value();
        check_buffer_boundaries(value, VALUE_SIZE)?;
        let (number, _) = u16::decode(value)?;
        Ok((Self(number), VALUE_SIZE))
    }
}

impl EncodeAttributeValue for ChannelNumber {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        (u32::from(self.0) << 16).encode(ctx.raw_value_mut())
    }
}

attribute_marker!(ChannelNumber, CHANNEL_NUMBER);
