use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::common::check_buffer_boundaries;
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::{StunError, StunErrorType};
use crate::types::HMACKey;
use hmac_sha1::hmac_sha1;

const MESSAGE_INTEGRITY: u16 = 0x0008;
const MESSAGE_INTEGRITY_SIZE: usize = 20;

/// The MESSAGE-INTEGRITY attribute contains an
/// [`HMAC-SHA1`](https://datatracker.ietf.org/doc/html/rfc2104) of the
/// STUN message. The text used as input covers the message up to the
/// attribute itself, with the header length adjusted to point to the end
/// of the MESSAGE-INTEGRITY attribute.
///
/// # Examples
///```rust
/// # use turn_rs::attributes::stun::MessageIntegrity;
/// # use turn_rs::HMACKey;
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let key = HMACKey::new_long_term("user", "realm", "pass")?;
/// // Attribute to be encoded, the HMAC is computed when the message is encoded
/// let attr = MessageIntegrity::new(key);
/// assert!(!attr.validate(&[0x00; 20], &HMACKey::new_short_term("pass")?));
/// #  Ok(())
/// # }
///```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageIntegrity {
    /// Encodable version of this attribute. This is used when the attribute
    /// is added to a message that is going to be sent to the network.
    Encodable(HMACKey),
    /// Decodable version of this attribute. This is the decoded attribute
    /// received from the network.
    Decodable([u8; MESSAGE_INTEGRITY_SIZE]),
}

impl MessageIntegrity {
    /// Creates a new attribute.
    /// # Arguments:
    /// - `key` - The key used for the `HMAC` depends on which credential mechanism is in use.
    pub fn new(key: HMACKey) -> Self {
        MessageIntegrity::Encodable(key)
    }

    /// Validates the message using the `HMAC` value generated from the key
    /// # Arguments:
    /// * `input`- the STUN message up to (but excluding) the attribute itself.
    /// * `key`- the [`HMACKey`] key
    /// # Returns:
    /// true if the message integrity attribute matches the computed value.
    pub fn validate(&self, input: &[u8], key: &HMACKey) -> bool {
        match self {
            MessageIntegrity::Decodable(value) => hmac_sha1(key.as_bytes(), input) == *value,
            MessageIntegrity::Encodable(_) => false,
        }
    }
}

impl From<[u8; MESSAGE_INTEGRITY_SIZE]> for MessageIntegrity {
    fn from(val: [u8; MESSAGE_INTEGRITY_SIZE]) -> Self {
        MessageIntegrity::Decodable(val)
    }
}

impl EncodeAttributeValue for MessageIntegrity {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        match self {
            MessageIntegrity::Encodable(_) => {
                let raw_value = ctx.raw_value_mut();
                check_buffer_boundaries(raw_value, MESSAGE_INTEGRITY_SIZE)?;
                raw_value[..MESSAGE_INTEGRITY_SIZE].fill(0);
                Ok(MESSAGE_INTEGRITY_SIZE)
            }
            MessageIntegrity::Decodable(_) => Err(StunError::new(
                StunErrorType::InvalidParam,
                "Not encodable attribute",
            )),
        }
    }

    fn post_encode(&self, mut ctx: AttributeEncoderContext) -> Result<(), StunError> {
        match self {
            MessageIntegrity::Encodable(key) => {
                check_buffer_boundaries(ctx.raw_value(), MESSAGE_INTEGRITY_SIZE)?;
                let hmac = hmac_sha1(key.as_bytes(), ctx.encoded_message());
                ctx.raw_value_mut()[..MESSAGE_INTEGRITY_SIZE].copy_from_slice(&hmac);
                Ok(())
            }
            MessageIntegrity::Decodable(_) => Err(StunError::new(
                StunErrorType::InvalidParam,
                "Not encodable attribute",
            )),
        }
    }
}

impl DecodeAttributeValue for MessageIntegrity {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        if raw_value.len() != MESSAGE_INTEGRITY_SIZE {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!(
                    "MESSAGE-INTEGRITY must be {} bytes, got {}",
                    MESSAGE_INTEGRITY_SIZE,
                    raw_value.len()
                ),
            ));
        }
        let mut value = [0u8; MESSAGE_INTEGRITY_SIZE];
        value.copy_from_slice(raw_value);
        Ok((MessageIntegrity::Decodable(value), MESSAGE_INTEGRITY_SIZE))
    }
}

attribute_marker!(MessageIntegrity, MESSAGE_INTEGRITY);
