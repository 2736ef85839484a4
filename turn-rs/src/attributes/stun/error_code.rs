use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;
use crate::types::ErrorCode as ErrorCodeValue;
use crate::{Decode, Encode};

const ERROR_CODE: u16 = 0x0009;

/// The ERROR-CODE attribute is used in error response messages. It
/// carries a numeric code in the range 300 to 699 and a reason phrase.
///
/// # Examples
///```rust
/// # use turn_rs::attributes::stun::ErrorCode;
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let attr = ErrorCode::from(turn_rs::ErrorCode::new(437, "Allocation Mismatch")?);
/// assert_eq!(attr.error_code().class(), 4);
/// assert_eq!(attr.error_code().number(), 37);
/// assert_eq!(attr.error_code().reason(), "Allocation Mismatch");
/// #  Ok(())
/// # }
///```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode(ErrorCodeValue);

impl ErrorCode {
    /// Returns the error code carried by this attribute.
    pub fn error_code(&self) -> &ErrorCodeValue {
        &self.0
    }
}

impl From<ErrorCodeValue> for ErrorCode {
    fn from(error: ErrorCodeValue) -> Self {
        Self(error)
    }
}

impl DecodeAttributeValue for ErrorCode {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (error, size) = ErrorCodeValue::decode(ctx.raw_value())?;
        Ok((Self(error), size))
    }
}

impl EncodeAttributeValue for ErrorCode {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        self.0.encode(ctx.raw_value_mut())
    }
}

attribute_marker!(ErrorCode, ERROR_CODE);
