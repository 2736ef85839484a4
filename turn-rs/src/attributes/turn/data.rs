use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::common::check_buffer_boundaries;
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;

const DATA: u16 = 0x0013;

/// Application payload of Send and Data indications: the bytes the peer
/// sees as the UDP payload.
///
/// # Examples
///```rust
/// # use turn_rs::attributes::turn::Data;
/// let attr = Data::new(b"hello");
/// assert_eq!(attr.as_bytes(), b"hello");
/// assert_eq!(attr.len(), 5);
///```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Data(Vec<u8>);

impl Data {
    /// Copies `payload` into a new attribute
    pub fn new(payload: impl AsRef<[u8]>) -> Self {
        Self(payload.as_ref().into())
    }

    /// Payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Payload size
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for an empty payload
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Takes the payload out of the attribute
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for Data {
    fn from(payload: Vec<u8>) -> Self {
        Self(payload)
    }
}

impl DecodeAttributeValue for Data {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let payload = Self::new(ctx.raw_value());
        let size = payload.len();
        Ok((payload, size))
    }
}

impl EncodeAttributeValue for Data {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let out = ctx.raw_value_mut();
        check_buffer_boundaries(out, self.len())?;
        out[..self.len()].copy_from_slice(self.as_bytes());
        Ok(self.len())
    }
}

attribute_marker!(Data, DATA);
