use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;

const DONT_FRAGMENT: u16 = 0x001A;

/// The DONT-FRAGMENT attribute is used by the client to request that the
/// server set the DF bit in the IP header when relaying the application
/// data onward to the peer. It has no value part.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DontFragment;

impl DecodeAttributeValue for DontFragment {
    fn decode(_ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        Ok((DontFragment, 0))
    }
}

impl EncodeAttributeValue for DontFragment {
    fn encode(&self, _ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        Ok(0)
    }
}

attribute_marker!(DontFragment, DONT_FRAGMENT);
