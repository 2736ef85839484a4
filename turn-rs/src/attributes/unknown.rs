use crate::attributes::{AttributeType, EncodeAttributeValue};
use crate::context::AttributeEncoderContext;
use crate::error::{StunError, StunErrorType};

/// Attribute of a type this crate has no decoder for. Its value is kept
/// untouched. Unknown attributes are only ever decoded, never sent.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Unknown {
    code: AttributeType,
    value: Vec<u8>,
}

impl Unknown {
    pub(crate) fn new(code: AttributeType, value: &[u8]) -> Self {
        let value = value.to_vec();
        Self { code, value }
    }

    /// Type code read from the wire
    pub fn attribute_type(&self) -> AttributeType {
        self.code
    }

    /// Value bytes, without padding
    pub fn attribute_data(&self) -> &[u8] {
        self.value.as_slice()
    }
}

impl EncodeAttributeValue for Unknown {
    fn encode(&self, _ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let reason = format!("{} has no encoder", self.code);
        Err(StunError::new(StunErrorType::InvalidParam, reason))
    }
}
