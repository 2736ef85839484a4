use crate::attributes::stun::{Fingerprint, MessageIntegrity};
use crate::attributes::{StunAttribute, StunAttributeType};
use crate::common::check_buffer_boundaries;
use crate::error::{StunError, StunErrorType};
use crate::{Encode, TransactionId};
use std::convert::TryFrom;
use std::fmt;

// The two class bits sit at positions 4 and 8 of the 14 bit type field,
// the method bits fill the remaining positions, from the most significant:
// M11..M7 C1 M6..M4 C0 M3..M0.
const CLASS_HIGH: u16 = 0x0100;
const CLASS_LOW: u16 = 0x0010;

/// Method and class packed in the first 14 bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    method: MessageMethod,
    class: MessageClass,
}

impl MessageType {
    /// Pairs a method with a class
    pub fn new(method: MessageMethod, class: MessageClass) -> Self {
        Self { method, class }
    }

    /// The class bits
    pub fn class(&self) -> MessageClass {
        self.class
    }

    /// The method bits
    pub fn method(&self) -> MessageMethod {
        self.method
    }

    /// Wire value of the type field
    pub fn as_u16(&self) -> u16 {
        let method = self.method.0;
        let class = match self.class {
            MessageClass::Request => 0,
            MessageClass::Indication => CLASS_LOW,
            MessageClass::SuccessResponse => CLASS_HIGH,
            MessageClass::ErrorResponse => CLASS_HIGH | CLASS_LOW,
        };
        (method & 0x000F) | ((method & 0x0070) << 1) | ((method & 0x0F80) << 2) | class
    }
}

impl From<u16> for MessageType {
    fn from(value: u16) -> Self {
        let class = match (value & CLASS_HIGH != 0, value & CLASS_LOW != 0) {
            (false, false) => MessageClass::Request,
            (false, true) => MessageClass::Indication,
            (true, false) => MessageClass::SuccessResponse,
            (true, true) => MessageClass::ErrorResponse,
        };
        let method = (value & 0x000F) | ((value >> 1) & 0x0070) | ((value >> 2) & 0x0F80);
        Self::new(MessageMethod(method), class)
    }
}

impl From<&[u8; 2]> for MessageType {
    fn from(value: &[u8; 2]) -> Self {
        Self::from(u16::from_be_bytes(*value))
    }
}

impl Encode for MessageType {
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, StunError> {
        check_buffer_boundaries(buffer, 2)?;
        buffer[..2].copy_from_slice(&self.as_u16().to_be_bytes());
        Ok(2)
    }
}

/// 12 bit method. The ones a TURN client uses are listed in
/// [`methods`](crate::methods).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageMethod(pub(crate) u16);

impl MessageMethod {
    /// Numeric method value
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for MessageMethod {
    type Error = StunError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value > 0x0FFF {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("{:#06x} does not fit in 12 bits", value),
            ));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for MessageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::methods::*;
        let name = match *self {
            BINDING => "binding",
            ALLOCATE => "allocate",
            REFRESH => "refresh",
            SEND => "send",
            DATA => "data",
            CREATE_PERMISSION => "create permission",
            CHANNEL_BIND => "channel bind",
            MessageMethod(other) => return write!(f, "method ({:#05x})", other),
        };
        f.write_str(name)
    }
}

/// Whether a message is a request, an indication or one of the two kinds
/// of response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Expects a response
    Request,
    /// Fire and forget
    Indication,
    /// The request succeeded
    SuccessResponse,
    /// The request failed, see ERROR-CODE
    ErrorResponse,
}

impl MessageClass {
    /// Success or error response
    pub fn is_response(&self) -> bool {
        matches!(self, Self::SuccessResponse | Self::ErrorResponse)
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Indication => "indication",
            Self::SuccessResponse => "success response",
            Self::ErrorResponse => "error response",
        })
    }
}

// MESSAGE-INTEGRITY and then FINGERPRINT close the message, everything
// else keeps the order it was added in.
fn trailing_rank(attr: &StunAttribute) -> u8 {
    match attr {
        StunAttribute::MessageIntegrity(_) => 1,
        StunAttribute::Fingerprint(_) => 2,
        _ => 0,
    }
}

/// Builds a [`StunMessage`] attribute by attribute.
#[derive(Debug)]
pub struct StunMessageBuilder(StunMessage);

impl StunMessageBuilder {
    /// Empty message. Requests need a fresh random `transaction_id`,
    /// responses reuse the one of their request.
    pub fn new(
        method: MessageMethod,
        class: MessageClass,
        transaction_id: TransactionId,
    ) -> StunMessageBuilder {
        let attributes = Vec::new();
        Self(StunMessage {
            method,
            class,
            transaction_id,
            attributes,
        })
    }

    /// Appends `attribute`
    pub fn with_attribute<T>(mut self, attribute: T) -> Self
    where
        T: Into<StunAttribute>,
    {
        self.0.attributes.push(attribute.into());
        self
    }

    /// Moves the integrity attributes to the end and returns the message.
    pub fn build(self) -> StunMessage {
        let mut msg = self.0;
        msg.attributes.sort_by_key(trailing_rank);
        msg
    }
}

/// Decoded message, or one ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    method: MessageMethod,
    class: MessageClass,
    transaction_id: TransactionId,
    attributes: Vec<StunAttribute>,
}

impl StunMessage {
    /// Method of the message
    pub fn method(&self) -> MessageMethod {
        self.method
    }

    /// Class of the message
    pub fn class(&self) -> MessageClass {
        self.class
    }

    /// Identifier shared with the request or response
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Attributes in wire order
    pub fn attributes(&self) -> &[StunAttribute] {
        &self.attributes
    }

    /// First attribute of kind `A`
    pub fn get<A>(&self) -> Option<&StunAttribute>
    where
        A: StunAttributeType,
    {
        let wanted = A::get_type();
        self.attributes
            .iter()
            .find(|attr| attr.attribute_type() == wanted)
    }

    /// True when an attribute of kind `A` is present
    pub fn contains<A>(&self) -> bool
    where
        A: StunAttributeType,
    {
        self.get::<A>().is_some()
    }
}
