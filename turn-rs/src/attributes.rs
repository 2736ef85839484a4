//! Attributes a TURN client sends and receives.
//!
//! [`stun`] holds the RFC 5389 attributes used for authentication and
//! diagnostics, [`turn`] the RFC 5766 relay attributes. Any other type is
//! decoded as [`Unknown`], which keeps its raw value so that the caller can
//! apply the comprehension rules.

use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::{StunError, StunErrorType};
use std::fmt;

mod address_port;
mod text_attr;
mod unknown;

pub mod stun;
pub mod turn;

pub use unknown::Unknown;

pub(crate) trait EncodeAttributeValue {
    fn encode(&self, ctx: AttributeEncoderContext) -> Result<usize, StunError>;

    // Runs once the whole message has been written, for attributes that
    // cover the preceding bytes.
    fn post_encode(&self, _ctx: AttributeEncoderContext) -> Result<(), StunError> {
        Ok(())
    }
}

pub(crate) trait DecodeAttributeValue {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError>
    where
        Self: Sized;
}

/// 16 bit attribute type. Types below `0x8000` are comprehension required.
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct AttributeType(u16);

const COMPREHENSION_OPTIONAL: u16 = 0x8000;

impl AttributeType {
    /// Wraps a raw type value
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw type value
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Messages with an unknown attribute of this kind must be rejected.
    pub fn is_comprehension_required(&self) -> bool {
        self.0 & COMPREHENSION_OPTIONAL == 0
    }

    /// Unknown attributes of this kind can be ignored.
    pub fn is_comprehension_optional(&self) -> bool {
        self.0 & COMPREHENSION_OPTIONAL != 0
    }
}

impl From<u16> for AttributeType {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<AttributeType> for u16 {
    fn from(attr_type: AttributeType) -> Self {
        attr_type.as_u16()
    }
}

impl fmt::Debug for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AttributeType (0x{:04X})", self.0)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "attribute type (0x{:04X})", self.0)
    }
}

/// Implemented by every attribute to expose its type code.
pub trait StunAttributeType {
    /// Type code of this attribute value
    fn attribute_type(&self) -> AttributeType;

    /// Type code of the attribute kind
    fn get_type() -> AttributeType
    where
        Self: Sized;
}

// Ties an attribute struct to its type code and to its `StunAttribute`
// variant.
macro_rules! attribute_marker (
    ($attr:ident, $code:ident) => {
        impl crate::attributes::StunAttributeType for $attr {
            fn get_type() -> crate::attributes::AttributeType {
                crate::attributes::AttributeType::new($code)
            }

            fn attribute_type(&self) -> crate::attributes::AttributeType {
                Self::get_type()
            }
        }

        impl From<$attr> for crate::attributes::StunAttribute {
            fn from(attr: $attr) -> Self {
                Self::$attr(attr)
            }
        }
    }
);
pub(crate) use attribute_marker;

// Builds the `StunAttribute` enum and its dispatch code out of the list of
// supported attributes.
macro_rules! attribute_registry (
    ($(($attr:ident, $module:ident)),* $(,)?) => {
        paste::paste! {
            /// Decoded attribute, one variant per supported attribute.
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub enum StunAttribute {
                /// Any type without a variant of its own
                Unknown(Unknown),
                $(
                    #[doc = "`" $attr "` attribute"]
                    $attr($module::$attr),
                )*
            }
        }

        impl EncodeAttributeValue for StunAttribute {
            fn encode(&self, ctx: AttributeEncoderContext) -> Result<usize, StunError> {
                match self {
                    Self::Unknown(value) => value.encode(ctx),
                    $(Self::$attr(value) => value.encode(ctx),)*
                }
            }

            fn post_encode(&self, ctx: AttributeEncoderContext) -> Result<(), StunError> {
                match self {
                    Self::Unknown(value) => value.post_encode(ctx),
                    $(Self::$attr(value) => value.post_encode(ctx),)*
                }
            }
        }

        pub(crate) fn decode_attribute(
            attr_type: AttributeType,
            ctx: AttributeDecoderContext,
        ) -> Result<StunAttribute, StunError> {
            match attr_type {
                $(
                    t if t == <$module::$attr as StunAttributeType>::get_type() => {
                        <$module::$attr as DecodeAttributeValue>::decode(ctx)
                            .map(|(value, _)| StunAttribute::$attr(value))
                    }
                )*
                other => Ok(StunAttribute::Unknown(Unknown::new(other, ctx.raw_value()))),
            }
        }

        impl StunAttribute {
            /// Type code of the wrapped attribute
            pub fn attribute_type(&self) -> AttributeType {
                match self {
                    Self::Unknown(value) => value.attribute_type(),
                    $(Self::$attr(value) => value.attribute_type(),)*
                }
            }

            $(
                paste::paste! {
                    #[doc = "True for the `" $attr "` variant"]
                    pub fn [<is_ $attr:snake>](&self) -> bool {
                        matches!(self, Self::$attr(_))
                    }

                    #[doc = "The wrapped `" $attr "`, or [`StunErrorType::InvalidParam`] for any other variant"]
                    pub fn [<as_ $attr:snake>](&self) -> Result<&$module::$attr, StunError> {
                        if let Self::$attr(value) = self {
                            return Ok(value);
                        }
                        Err(StunError::new(
                            StunErrorType::InvalidParam,
                            format!("{} is not {}", self.attribute_type(), stringify!($attr)),
                        ))
                    }
                }
            )*
        }
    }
);

attribute_registry!(
    (ErrorCode, stun),
    (Fingerprint, stun),
    (MessageIntegrity, stun),
    (Nonce, stun),
    (Realm, stun),
    (Software, stun),
    (UnknownAttributes, stun),
    (UserName, stun),
    (XorMappedAddress, stun),
    (ChannelNumber, turn),
    (Data, turn),
    (DontFragment, turn),
    (LifeTime, turn),
    (RequestedTransport, turn),
    (XorPeerAddress, turn),
    (XorRelayedAddress, turn),
);

impl StunAttribute {
    /// True for an [`Unknown`] attribute in the comprehension required
    /// range. Messages carrying one are discarded.
    pub fn is_unknown_comprehension_required(&self) -> bool {
        matches!(self, Self::Unknown(attr) if attr.attribute_type().is_comprehension_required())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::turn::LifeTime;

    #[test]
    fn attribute_type_formatting() {
        let attr_type = AttributeType::from(0x1234);
        assert_eq!(format!("{:?}", attr_type), "AttributeType (0x1234)");
        assert_eq!(format!("{}", attr_type), "attribute type (0x1234)");
        assert_eq!(u16::from(attr_type), 0x1234);
    }

    #[test]
    fn comprehension_ranges() {
        for required in [0x0000, 0x0013, 0x7FFF] {
            assert!(AttributeType::new(required).is_comprehension_required());
        }
        for optional in [0x8000, 0x8022, 0xFFFF] {
            assert!(AttributeType::new(optional).is_comprehension_optional());
        }
    }

    #[test]
    fn variant_accessors() {
        let attr = StunAttribute::from(LifeTime::new(600));
        assert!(attr.is_life_time());
        assert!(!attr.is_data());
        assert_eq!(attr.attribute_type(), LifeTime::get_type());
        assert_eq!(attr.as_life_time().expect("LifeTime expected").as_u32(), 600);
        assert_eq!(
            attr.as_nonce().expect_err("Nonce accessor succeeded"),
            StunErrorType::InvalidParam
        );
        assert!(!attr.is_unknown_comprehension_required());

        let required = StunAttribute::Unknown(Unknown::new(AttributeType::new(0x0024), &[1, 2][..]));
        assert!(required.is_unknown_comprehension_required());
        let optional = StunAttribute::Unknown(Unknown::new(AttributeType::new(0x8029), &[][..]));
        assert!(!optional.is_unknown_comprehension_required());
    }
}
