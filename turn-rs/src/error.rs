//! Errors raised while encoding or decoding messages.
//!
//! [`StunError`] is the low level error of a single field. Whole message
//! operations wrap it into [`StunDecodeError`] or [`StunEncodeError`], which
//! say where in the message things went wrong.

use crate::AttributeType;
use std::error;
use std::fmt;

/// Category of a [`StunError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunErrorType {
    /// A value breaks the rules of its field
    InvalidParam,
    /// A check over the encoded bytes did not pass
    ValidationFailed,
    /// A value exceeds the maximum size of its field
    ValueTooLong,
    /// The buffer is too short for the operation
    SmallBuffer,
}

impl fmt::Display for StunErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidParam => "invalid parameter",
            Self::ValidationFailed => "validation failed",
            Self::ValueTooLong => "value is too long",
            Self::SmallBuffer => "small input buffer",
        })
    }
}

/// Field level error. Equality only looks at the [`StunErrorType`].
#[derive(Debug)]
pub struct StunError {
    kind: StunErrorType,
    detail: String,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

impl StunError {
    pub(crate) fn new<S>(kind: StunErrorType, detail: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            detail: detail.into(),
            source: None,
        }
    }

    fn caused_by<E>(kind: StunErrorType, cause: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            detail: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Category of the error
    pub fn error_type(&self) -> StunErrorType {
        self.kind
    }

    /// Human readable detail
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for StunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}. {}", self.kind, self.detail)
    }
}

impl error::Error for StunError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|cause| cause as &(dyn error::Error + 'static))
    }
}

impl PartialEq for StunError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for StunError {}

impl PartialEq<StunErrorType> for StunError {
    fn eq(&self, kind: &StunErrorType) -> bool {
        self.kind == *kind
    }
}

impl PartialEq<StunError> for StunErrorType {
    fn eq(&self, error: &StunError) -> bool {
        *self == error.kind
    }
}

macro_rules! invalid_param_from {
    ($($cause:ty),*) => {
        $(
            impl From<$cause> for StunError {
                fn from(cause: $cause) -> Self {
                    Self::caused_by(StunErrorType::InvalidParam, cause)
                }
            }
        )*
    };
}

invalid_param_from!(
    std::array::TryFromSliceError,
    std::str::Utf8Error,
    std::num::TryFromIntError
);

impl From<precis_core::Error> for StunError {
    fn from(cause: precis_core::Error) -> Self {
        Self::new(StunErrorType::InvalidParam, cause.to_string())
    }
}

/// A [`StunError`] tied to one attribute of a message.
#[derive(Debug)]
pub struct StunAttributeError {
    /// Type of the offending attribute
    pub attr_type: AttributeType,
    /// Index of the attribute in the message, starting at zero
    pub position: usize,
    /// What went wrong
    pub error: StunError,
}

impl fmt::Display for StunAttributeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}, position: {}, error: {}",
            self.attr_type, self.position, self.error
        )
    }
}

/// Reasons for dropping a received datagram.
#[derive(Debug)]
pub enum StunDecodeError {
    /// Not a STUN header: too short, leading bits set, bad magic cookie, or
    /// a length field that disagrees with the datagram size.
    MalformedHeader(StunError),
    /// An attribute runs past the end of the message.
    TruncatedAttribute {
        /// Known when the attribute header itself was complete
        attr_type: Option<AttributeType>,
        /// Index of the attribute in the message
        position: usize,
    },
    /// MESSAGE-INTEGRITY or FINGERPRINT does not match the message.
    IntegrityMismatch(AttributeType),
    /// A known attribute holds a value that can not be decoded.
    InvalidAttribute(StunAttributeError),
}

impl fmt::Display for StunDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MalformedHeader(e) => write!(f, "malformed header: {}", e),
            Self::TruncatedAttribute {
                attr_type: Some(attr_type),
                position,
            } => write!(f, "truncated {}, position: {}", attr_type, position),
            Self::TruncatedAttribute {
                attr_type: None,
                position,
            } => write!(f, "truncated attribute, position: {}", position),
            Self::IntegrityMismatch(attr_type) => write!(f, "integrity mismatch: {}", attr_type),
            Self::InvalidAttribute(e) => write!(f, "invalid attribute: {}", e),
        }
    }
}

impl error::Error for StunDecodeError {}

/// Reasons a message could not be written.
#[derive(Debug)]
pub enum StunEncodeError {
    /// Header or buffer level problem
    Message(StunError),
    /// One attribute could not be written
    Attribute(StunAttributeError),
}

impl fmt::Display for StunEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Message(e) => write!(f, "encode error: message level: {}", e),
            Self::Attribute(e) => write!(f, "encode error: attribute level: {}", e),
        }
    }
}

impl error::Error for StunEncodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn equality_by_type() {
        let error = StunError::new(StunErrorType::SmallBuffer, "test");
        assert_eq!(error, StunErrorType::SmallBuffer);
        assert_eq!(StunErrorType::SmallBuffer, error);
        assert_ne!(error, StunErrorType::InvalidParam);
        assert_eq!(error, StunError::new(StunErrorType::SmallBuffer, "other"));
        assert_eq!(error.to_string(), "small input buffer. test");
    }

    #[test]
    fn wrapped_causes() {
        let cause = std::str::from_utf8(&[0xfe, 0xff]).expect_err("Invalid UTF-8 accepted");
        let error = StunError::from(cause);
        assert_eq!(error.error_type(), StunErrorType::InvalidParam);
        assert!(error.source().is_some());
        assert!(StunError::new(StunErrorType::ValueTooLong, "x").source().is_none());
    }

    #[test]
    fn decode_error_messages() {
        let error = StunDecodeError::TruncatedAttribute {
            attr_type: Some(AttributeType::new(0x0013)),
            position: 2,
        };
        assert_eq!(error.to_string(), "truncated attribute type (0x0013), position: 2");

        let error = StunDecodeError::TruncatedAttribute {
            attr_type: None,
            position: 0,
        };
        assert_eq!(error.to_string(), "truncated attribute, position: 0");

        let error = StunDecodeError::IntegrityMismatch(AttributeType::new(0x0008));
        assert_eq!(error.to_string(), "integrity mismatch: attribute type (0x0008)");
    }
}
