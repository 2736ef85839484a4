use crate::attributes::{attribute_marker, AttributeType, DecodeAttributeValue, EncodeAttributeValue};
use crate::common::check_buffer_boundaries;
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::{StunError, StunErrorType};
use byteorder::{BigEndian, ByteOrder};

const UNKNOWN_ATTRIBUTES: u16 = 0x000A;

/// List of comprehension required types the server did not understand,
/// sent along a 420 (Unknown Attribute) error. Each entry takes 16 bits.
///
/// ```rust
/// # use turn_rs::attributes::stun::UnknownAttributes;
/// # use turn_rs::AttributeType;
/// let mut rejected = UnknownAttributes::default();
/// rejected.add(AttributeType::new(0x0024));
/// rejected.add(AttributeType::new(0x0024));
/// assert_eq!(rejected.attributes(), &[AttributeType::new(0x0024)]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownAttributes(Vec<AttributeType>);

impl UnknownAttributes {
    /// Appends `attr_type` unless it is already listed
    pub fn add(&mut self, attr_type: AttributeType) {
        if !self.0.contains(&attr_type) {
            self.0.push(attr_type);
        }
    }

    /// Listed types, in wire order
    pub fn attributes(&self) -> &[AttributeType] {
        self.0.as_slice()
    }
}

impl From<Vec<AttributeType>> for UnknownAttributes {
    fn from(types: Vec<AttributeType>) -> Self {
        types.into_iter().fold(Self::default(), |mut list, t| {
            list.add(t);
            list
        })
    }
}

impl DecodeAttributeValue for UnknownAttributes {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let value = ctx.raw_value();
        let entries = value.chunks_exact(2);
        if !entries.remainder().is_empty() {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("{} bytes can not hold 16 bit types", value.len()),
            ));
        }
        let types: Vec<_> = entries
            .map(|entry| AttributeType::new(BigEndian::read_u16(entry)))
            .collect();
        Ok((Self::from(types), value.len()))
    }
}

impl EncodeAttributeValue for UnknownAttributes {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let size = 2 * self.0.len();
        let out = ctx.raw_value_mut();
        check_buffer_boundaries(out, size)?;
        for (entry, attr_type) in out.chunks_exact_mut(2).zip(&self.0) {
            BigEndian::write_u16(entry, attr_type.as_u16());
        }
        Ok(size)
    }
}

attribute_marker!(UnknownAttributes, UNKNOWN_ATTRIBUTES);
