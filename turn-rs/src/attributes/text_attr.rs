use crate::error::{StunError, StunErrorType};

// Length limits of a text attribute, in bytes and in characters. They are
// applied to locally created values and to received ones.
pub(crate) fn check_length(
    value: &str,
    max_bytes: usize,
    max_chars: usize,
) -> Result<(), StunError> {
    let bytes = value.len();
    let chars = value.chars().count();
    if bytes > max_bytes || chars > max_chars {
        return Err(StunError::new(
            StunErrorType::ValueTooLong,
            format!(
                "{} bytes ({} characters), limits are {} bytes and {} characters",
                bytes, chars, max_bytes, max_chars
            ),
        ));
    }
    Ok(())
}

// Declares an attribute holding UTF-8 text. `prepare` transforms values
// given to `new`, `enforce` transforms values read from the wire.
macro_rules! text_attribute {
    (
        $(#[$meta:meta])*
        $name:ident,
        $attr_type:ident,
        max_bytes = $max_bytes:expr,
        max_chars = $max_chars:expr,
        prepare = $prepare:path,
        enforce = $enforce:path,
    ) => (
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Clone, Hash)]
        pub struct $name(String);

        impl $name {
            /// Fails if `value` breaks the grammar or the length limits of
            /// the attribute.
            pub fn new<S>(value: S) -> Result<Self, crate::StunError>
            where
                S: AsRef<str>,
            {
                let text = $prepare(value.as_ref())?;
                crate::attributes::text_attr::check_length(&text, $max_bytes, $max_chars)?;
                Ok(Self(text))
            }

            /// Text carried by the attribute
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, text: &str) -> bool {
                self.0 == text
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, text: &&str) -> bool {
                self.0 == *text
            }
        }

        impl PartialEq<$name> for &str {
            fn eq(&self, attr: &$name) -> bool {
                attr == self
            }
        }

        impl std::convert::TryFrom<&str> for $name {
            type Error = crate::StunError;

            fn try_from(text: &str) -> Result<Self, Self::Error> {
                Self::new(text)
            }
        }

        impl std::convert::TryFrom<String> for $name {
            type Error = crate::StunError;

            fn try_from(text: String) -> Result<Self, Self::Error> {
                Self::new(text)
            }
        }

        impl crate::attributes::DecodeAttributeValue for $name {
            fn decode(ctx: crate::context::AttributeDecoderContext) -> Result<(Self, usize), crate::StunError> {
                let wire = ctx.raw_value();
                let text = std::str::from_utf8(wire)?;
                crate::attributes::text_attr::check_length(text, $max_bytes, $max_chars)?;
                Ok((Self($enforce(text)?), wire.len()))
            }
        }

        impl crate::attributes::EncodeAttributeValue for $name {
            fn encode(&self, mut ctx: crate::context::AttributeEncoderContext) -> Result<usize, crate::StunError> {
                use crate::Encode;
                crate::attributes::text_attr::check_length(&self.0, $max_bytes, $max_chars)?;
                self.0.as_str().encode(ctx.raw_value_mut())
            }
        }

        crate::attributes::attribute_marker!($name, $attr_type);
    )
}
pub(crate) use text_attribute;
