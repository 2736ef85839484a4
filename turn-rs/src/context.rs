use crate::attributes::stun::{Fingerprint, MessageIntegrity};
use crate::attributes::{decode_attribute, EncodeAttributeValue};
use crate::common::{check_buffer_boundaries, fill_padding_value, padding, DEFAULT_PADDING_VALUE};
use crate::error::{StunAttributeError, StunDecodeError, StunEncodeError, StunError, StunErrorType};
use crate::raw::{
    get_input_text, MessageHeader, RawAttributes, RawMessage, ATTRIBUTE_HEADER_SIZE,
    MESSAGE_HEADER_SIZE,
};
use crate::types::MAGIC_COOKIE;
use crate::{
    AttributeType, Decode, Encode, HMACKey, MessageType, StunAttribute, StunAttributeType,
    StunMessage, StunMessageBuilder, TransactionId,
};
use fallible_iterator::{FallibleIterator, IntoFallibleIterator};
use std::convert::TryFrom;

// Header plus the largest length the 16 bit field can hold
const MAX_MESSAGE_SIZE: usize = MESSAGE_HEADER_SIZE + u16::MAX as usize;

/// Decoding options: the key MESSAGE-INTEGRITY is checked against.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct DecoderContext {
    key: Option<HMACKey>,
    validation: bool,
}

impl DecoderContext {
    /// Key for MESSAGE-INTEGRITY, if any
    pub fn key(&self) -> Option<&HMACKey> {
        self.key.as_ref()
    }

    /// True when MESSAGE-INTEGRITY must be verified
    pub fn validate(&self) -> bool {
        self.validation
    }
}

/// Builds a [`DecoderContext`]
#[derive(Debug, Default)]
pub struct DecoderContextBuilder(DecoderContext);

impl DecoderContextBuilder {
    /// Key used to verify MESSAGE-INTEGRITY
    pub fn with_key(self, key: HMACKey) -> Self {
        Self(DecoderContext {
            key: Some(key),
            ..self.0
        })
    }

    /// Turns on MESSAGE-INTEGRITY verification. FINGERPRINT is verified
    /// whenever present, with or without this option.
    pub fn with_validation(self) -> Self {
        Self(DecoderContext {
            validation: true,
            ..self.0
        })
    }

    /// The context
    pub fn build(self) -> DecoderContext {
        self.0
    }
}

// What an attribute decoder gets to see: the message up to the attribute
// and the attribute value.
#[derive(Debug)]
pub(crate) struct AttributeDecoderContext<'a> {
    preceding: &'a [u8],
    value: &'a [u8],
}

impl<'a> AttributeDecoderContext<'a> {
    pub(crate) fn new(preceding: &'a [u8], value: &'a [u8]) -> Self {
        Self { preceding, value }
    }

    pub fn decoded_message(&self) -> &'a [u8] {
        self.preceding
    }

    pub fn raw_value(&self) -> &'a [u8] {
        self.value
    }
}

/// Builds a [`MessageDecoder`]
#[derive(Debug, Default)]
pub struct MessageDecoderBuilder(MessageDecoder);

impl MessageDecoderBuilder {
    /// Options to decode with
    pub fn with_context(self, ctx: DecoderContext) -> Self {
        Self(MessageDecoder { ctx: Some(ctx) })
    }

    /// The decoder
    pub fn build(self) -> MessageDecoder {
        self.0
    }
}

/// Turns datagrams into [`StunMessage`]s.
#[derive(Debug, Default, Clone)]
pub struct MessageDecoder {
    ctx: Option<DecoderContext>,
}

// Nothing but FINGERPRINT may follow MESSAGE-INTEGRITY, and nothing at all
// may follow FINGERPRINT. Such attributes are skipped.
#[derive(Debug, Default)]
struct AttributeFilter {
    integrity_seen: bool,
    fingerprint_seen: bool,
}

impl AttributeFilter {
    fn ignore(&mut self, attr_type: AttributeType) -> bool {
        let fingerprint = attr_type == Fingerprint::get_type();
        let skip = self.fingerprint_seen || (self.integrity_seen && !fingerprint);
        if !skip {
            self.fingerprint_seen |= fingerprint;
            self.integrity_seen |= attr_type == MessageIntegrity::get_type();
        }
        skip
    }
}

fn invalid_attribute(attr_type: AttributeType, position: usize, error: StunError) -> StunDecodeError {
    StunDecodeError::InvalidAttribute(StunAttributeError {
        attr_type,
        position,
        error,
    })
}

impl MessageDecoder {
    /// Decodes the single message `buffer` holds and returns it with the
    /// number of bytes read. Any error means the datagram must be dropped.
    pub fn decode(&self, buffer: &[u8]) -> Result<(StunMessage, usize), StunDecodeError> {
        let (header, _) = MessageHeader::decode(buffer).map_err(StunDecodeError::MalformedHeader)?;
        header
            .validate(buffer.len())
            .map_err(StunDecodeError::MalformedHeader)?;
        let (raw, size) = RawMessage::decode(buffer).map_err(StunDecodeError::MalformedHeader)?;

        let msg_type = MessageType::from(raw.header.msg_type);
        let mut builder = StunMessageBuilder::new(
            msg_type.method(),
            msg_type.class(),
            TransactionId::from(raw.header.transaction_id),
        );

        let mut filter = AttributeFilter::default();
        let mut iter = RawAttributes::from(raw.attributes).into_fallible_iter();
        let mut position = 0;
        loop {
            // Offset of the attribute about to be read
            let offset = iter.pos();
            let next = iter.next().map_err(|e| StunDecodeError::TruncatedAttribute {
                attr_type: e.attr_type.map(AttributeType::from),
                position: e.position,
            })?;
            let Some(raw_attr) = next else {
                break;
            };

            let attr_type = AttributeType::from(raw_attr.attr_type);
            if !filter.ignore(attr_type) {
                let preceding = &buffer[..MESSAGE_HEADER_SIZE + offset];
                let ctx = AttributeDecoderContext::new(preceding, raw_attr.value);
                let attr = decode_attribute(attr_type, ctx)
                    .map_err(|e| invalid_attribute(attr_type, position, e))?;
                let attr_size = ATTRIBUTE_HEADER_SIZE + raw_attr.value.len();
                self.verify(&attr, buffer, offset, attr_size, position)?;
                builder = builder.with_attribute(attr);
            }
            position += 1;
        }

        Ok((builder.build(), size))
    }

    // Checks FINGERPRINT always and MESSAGE-INTEGRITY when a key and
    // validation are configured.
    fn verify(
        &self,
        attr: &StunAttribute,
        buffer: &[u8],
        offset: usize,
        attr_size: usize,
        position: usize,
    ) -> Result<(), StunDecodeError> {
        let input_text = || {
            get_input_text(buffer, offset, attr_size)
                .map_err(|e| invalid_attribute(attr.attribute_type(), position, e))
        };

        let valid = match attr {
            StunAttribute::Fingerprint(fingerprint) => fingerprint.validate(&input_text()?),
            StunAttribute::MessageIntegrity(integrity) => {
                match self.ctx.as_ref().filter(|ctx| ctx.validate()).and_then(DecoderContext::key) {
                    Some(key) => integrity.validate(&input_text()?, key),
                    None => true,
                }
            }
            _ => true,
        };

        if valid {
            Ok(())
        } else {
            Err(StunDecodeError::IntegrityMismatch(attr.attribute_type()))
        }
    }

    /// Options this decoder was built with
    pub fn get_context(&self) -> Option<&DecoderContext> {
        self.ctx.as_ref()
    }
}

/// Value of the padding bytes. Outgoing messages pad with zeros; other
/// values only serve to reproduce the RFC 5769 test vectors.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StunPadding {
    /// Pad with this byte
    Custom(u8),
}

/// Encoding options
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct EncoderContext {
    padding: Option<StunPadding>,
}

impl EncoderContext {
    /// Byte written into padding
    pub fn padding(&self) -> u8 {
        let Some(StunPadding::Custom(value)) = self.padding else {
            return DEFAULT_PADDING_VALUE;
        };
        value
    }
}

/// Builds an [`EncoderContext`]
#[derive(Debug, Default)]
pub struct EncoderContextBuilder(EncoderContext);

impl EncoderContextBuilder {
    /// Pads with something other than zeros
    pub fn with_custom_padding(self, padding: StunPadding) -> Self {
        Self(EncoderContext {
            padding: Some(padding),
        })
    }

    /// The context
    pub fn build(self) -> EncoderContext {
        self.0
    }
}

/// Builds a [`MessageEncoder`]
#[derive(Debug, Default)]
pub struct MessageEncoderBuilder(MessageEncoder);

impl MessageEncoderBuilder {
    /// Options to encode with
    pub fn with_context(self, ctx: EncoderContext) -> Self {
        Self(MessageEncoder { ctx: Some(ctx) })
    }

    /// The encoder
    pub fn build(self) -> MessageEncoder {
        self.0
    }
}

// What an attribute encoder gets to see: the message written so far and
// the space for its value.
#[derive(Debug)]
pub(crate) struct AttributeEncoderContext<'a> {
    preceding: &'a [u8],
    value: &'a mut [u8],
}

impl<'a> AttributeEncoderContext<'a> {
    pub(crate) fn new(preceding: &'a [u8], value: &'a mut [u8]) -> Self {
        Self { preceding, value }
    }

    pub fn encoded_message(&self) -> &'a [u8] {
        self.preceding
    }

    pub fn raw_value(&self) -> &[u8] {
        self.value
    }

    pub fn raw_value_mut(&mut self) -> &mut [u8] {
        self.value
    }
}

/// Turns [`StunMessage`]s into bytes.
#[derive(Debug, Default, Clone)]
pub struct MessageEncoder {
    ctx: Option<EncoderContext>,
}

impl MessageEncoder {
    /// Writes `msg` at the start of `buffer` and returns its size.
    pub fn encode(&self, buffer: &mut [u8], msg: &StunMessage) -> Result<usize, StunEncodeError> {
        check_buffer_boundaries(buffer, MESSAGE_HEADER_SIZE).map_err(StunEncodeError::Message)?;
        MessageType::new(msg.method(), msg.class())
            .encode(buffer)
            .map_err(StunEncodeError::Message)?;
        buffer[2..4].fill(0);
        buffer[4..8].copy_from_slice(&MAGIC_COOKIE.as_u32().to_be_bytes());
        buffer[8..MESSAGE_HEADER_SIZE].copy_from_slice(msg.transaction_id().as_bytes());

        let pad_with = self
            .ctx
            .as_ref()
            .map_or(DEFAULT_PADDING_VALUE, EncoderContext::padding);
        let mut length = 0;
        for (position, attr) in msg.attributes().iter().enumerate() {
            let fail = |error| {
                StunEncodeError::Attribute(StunAttributeError {
                    attr_type: attr.attribute_type(),
                    position,
                    error,
                })
            };
            length += encode_attribute(buffer, length, attr, pad_with).map_err(fail)?;
        }

        Ok(MESSAGE_HEADER_SIZE + length)
    }

    /// Same as [`MessageEncoder::encode`], into a vector of the exact size.
    pub fn encode_to_vec(&self, msg: &StunMessage) -> Result<Vec<u8>, StunEncodeError> {
        let mut buffer = vec![0u8; MAX_MESSAGE_SIZE];
        let size = self.encode(&mut buffer, msg)?;
        buffer.truncate(size);
        buffer.shrink_to_fit();
        Ok(buffer)
    }
}

// Writes one attribute `length` bytes after the header, updates the header
// length and returns the bytes taken, padding included.
fn encode_attribute(
    buffer: &mut [u8],
    length: usize,
    attr: &StunAttribute,
    pad_with: u8,
) -> Result<usize, StunError> {
    let (written, rest) = buffer.split_at_mut(MESSAGE_HEADER_SIZE + length);
    check_buffer_boundaries(rest, ATTRIBUTE_HEADER_SIZE)?;
    let (attr_header, value) = rest.split_at_mut(ATTRIBUTE_HEADER_SIZE);

    let value_size = attr.encode(AttributeEncoderContext::new(written, value))?;
    let pad = padding(value_size);
    fill_padding_value(&mut value[value_size..], pad, pad_with)?;

    attr_header[..2].copy_from_slice(&attr.attribute_type().as_u16().to_be_bytes());
    attr_header[2..].copy_from_slice(&u16::try_from(value_size)?.to_be_bytes());

    let taken = ATTRIBUTE_HEADER_SIZE + value_size + pad;
    let msg_length = u16::try_from(length + taken).map_err(|_| {
        StunError::new(
            StunErrorType::ValueTooLong,
            format!("Message length {} does not fit in 16 bits", length + taken),
        )
    })?;
    written[2..4].copy_from_slice(&msg_length.to_be_bytes());

    // Integrity attributes cover the bytes before them, with the length
    // field already counting them.
    attr.post_encode(AttributeEncoderContext::new(written, &mut value[..value_size]))?;
    Ok(taken)
}
