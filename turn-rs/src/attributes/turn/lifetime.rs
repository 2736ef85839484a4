use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;
use crate::{Decode, Encode};
use std::time::Duration;

const LIFETIME: u16 = 0x000D;

/// The LIFETIME attribute represents the duration for which the server
/// will maintain an allocation in the absence of a refresh. The value is
/// the number of seconds remaining until expiration. A value of zero in
/// a Refresh request deletes the allocation.
///
/// # Examples
///```rust
/// # use turn_rs::attributes::turn::LifeTime;
/// # use std::time::Duration;
/// let attr = LifeTime::new(600);
/// assert_eq!(attr.as_duration(), Duration::from_secs(600));
///```
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct LifeTime(u32);

impl LifeTime {
    /// Creates a lifetime of `seconds`
    pub fn new(seconds: u32) -> Self {
        Self(seconds)
    }

    /// Returns the lifetime in seconds
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the lifetime as a [`Duration`]
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0))
    }
}

impl From<u32> for LifeTime {
    fn from(seconds: u32) -> Self {
        Self(seconds)
    }
}

impl DecodeAttributeValue for LifeTime {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (value, size) = u32::decode(ctx.raw_value())?;
        Ok((Self(value), size))
    }
}

impl EncodeAttributeValue for LifeTime {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        self.0.encode(ctx.raw_value_mut())
    }
}

attribute_marker!(LifeTime, LIFETIME);
