// Zero copy view over a received message: the 20 byte header (two zero
// bits, 14 bits of type, length, cookie and transaction id) followed by
// type-length-value attributes padded to four bytes.

use crate::common::{check_buffer_boundaries, padding};
use crate::error::{StunError, StunErrorType};
use crate::types::{MAGIC_COOKIE, MAGIC_COOKIE_SIZE, TRANSACTION_ID_SIZE};
use crate::Decode;
use byteorder::{BigEndian, ByteOrder};
use fallible_iterator::{FallibleIterator, IntoFallibleIterator};
use std::convert::TryFrom;

/// Size of the fixed STUN message header
pub const MESSAGE_HEADER_SIZE: usize = 20;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;

fn invalid<S: Into<String>>(reason: S) -> StunError {
    StunError::new(StunErrorType::InvalidParam, reason)
}

#[derive(Debug, PartialEq, Eq)]
pub struct MessageHeader<'a> {
    pub bits: u8,
    pub msg_type: u16,
    pub msg_length: u16,
    pub cookie: &'a [u8; MAGIC_COOKIE_SIZE],
    pub transaction_id: &'a [u8; TRANSACTION_ID_SIZE],
}

impl<'a> Decode<'a> for MessageHeader<'a> {
    fn decode(buffer: &'a [u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(buffer, MESSAGE_HEADER_SIZE)?;
        let first = BigEndian::read_u16(&buffer[..2]);
        let header = Self {
            bits: (first >> 14) as u8,
            msg_type: first & 0x3FFF,
            msg_length: BigEndian::read_u16(&buffer[2..4]),
            cookie: <&[u8; MAGIC_COOKIE_SIZE]>::try_from(&buffer[4..8])?,
            transaction_id: <&[u8; TRANSACTION_ID_SIZE]>::try_from(
                &buffer[8..MESSAGE_HEADER_SIZE],
            )?,
        };
        Ok((header, MESSAGE_HEADER_SIZE))
    }
}

impl MessageHeader<'_> {
    /// Rejects headers that can not start a STUN message of `buffer_len`
    /// bytes.
    pub fn validate(&self, buffer_len: usize) -> Result<(), StunError> {
        let length = usize::from(self.msg_length);
        if self.bits != 0 {
            Err(invalid(format!("Leading bits {:#04b} are not zero", self.bits)))
        } else if MAGIC_COOKIE != self.cookie {
            Err(invalid(format!("Bad magic cookie {:02x?}", self.cookie)))
        } else if padding(length) != 0 {
            Err(invalid(format!("Length {} is not 4 byte aligned", length)))
        } else if MESSAGE_HEADER_SIZE + length != buffer_len {
            Err(invalid(format!(
                "Length {} but {} bytes follow the header",
                length,
                buffer_len.saturating_sub(MESSAGE_HEADER_SIZE)
            )))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
pub struct RawMessage<'a> {
    pub header: MessageHeader<'a>,
    pub attributes: &'a [u8],
}

impl<'a> Decode<'a> for RawMessage<'a> {
    fn decode(buffer: &'a [u8]) -> Result<(Self, usize), StunError> {
        let (header, start) = MessageHeader::decode(buffer)?;
        let end = start + usize::from(header.msg_length);
        check_buffer_boundaries(buffer, end)?;
        let attributes = &buffer[start..end];
        Ok((Self { header, attributes }, end))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RawAttribute<'a> {
    pub attr_type: u16,
    pub value: &'a [u8],
}

/// The attribute at `position` does not fit in the remaining bytes. The
/// type is known when at least its header could be read.
#[derive(Debug, PartialEq, Eq)]
pub struct TruncatedAttribute {
    pub attr_type: Option<u16>,
    pub position: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RawAttributes<'a>(&'a [u8]);

impl<'a> From<&'a [u8]> for RawAttributes<'a> {
    fn from(attributes: &'a [u8]) -> Self {
        Self(attributes)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RawAttributesIter<'a> {
    buffer: &'a [u8],
    pos: usize,
    index: usize,
}

impl RawAttributesIter<'_> {
    /// Offset of the next attribute, counted from the end of the header
    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl<'a> FallibleIterator for RawAttributesIter<'a> {
    type Item = RawAttribute<'a>;
    type Error = TruncatedAttribute;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        let rest = &self.buffer[self.pos..];
        if rest.is_empty() {
            return Ok(None);
        }

        let truncated = |attr_type| TruncatedAttribute {
            attr_type,
            position: self.index,
        };
        if rest.len() < ATTRIBUTE_HEADER_SIZE {
            return Err(truncated(None));
        }
        let attr_type = BigEndian::read_u16(&rest[..2]);
        let length = usize::from(BigEndian::read_u16(&rest[2..4]));
        let value = rest
            .get(ATTRIBUTE_HEADER_SIZE..ATTRIBUTE_HEADER_SIZE + length)
            .ok_or_else(|| truncated(Some(attr_type)))?;

        // The last attribute may come without its padding
        let consumed = ATTRIBUTE_HEADER_SIZE + length + padding(length);
        self.pos = self.buffer.len().min(self.pos + consumed);
        self.index += 1;
        Ok(Some(RawAttribute { attr_type, value }))
    }
}

impl<'a> IntoFallibleIterator for RawAttributes<'a> {
    type Item = RawAttribute<'a>;
    type Error = TruncatedAttribute;
    type IntoFallibleIter = RawAttributesIter<'a>;

    fn into_fallible_iter(self) -> Self::IntoFallibleIter {
        RawAttributesIter {
            buffer: self.0,
            pos: 0,
            index: 0,
        }
    }
}

/// Bytes covered by the integrity attribute found `offset` bytes after the
/// header: everything before it, with the header length rewritten to end
/// right after the `attr_size` bytes of that attribute.
pub(crate) fn get_input_text(
    buffer: &[u8],
    offset: usize,
    attr_size: usize,
) -> Result<Vec<u8>, StunError> {
    let end = MESSAGE_HEADER_SIZE + offset;
    check_buffer_boundaries(buffer, end)?;
    let length = u16::try_from(offset + attr_size)?;
    let mut text = buffer[..end].to_vec();
    text[2..4].copy_from_slice(&length.to_be_bytes());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(first: [u8; 4], attributes: &[u8]) -> Vec<u8> {
        let mut buffer = first.to_vec();
        buffer.extend_from_slice(&MAGIC_COOKIE.as_u32().to_be_bytes());
        buffer.extend_from_slice(&turn_vectors::TRANSACTION_ID);
        buffer.extend_from_slice(attributes);
        buffer
    }

    const DONT_FRAGMENT: [u8; 4] = [0x00, 0x1a, 0x00, 0x00];

    #[test]
    fn header_fields() {
        let buffer = message([0x80, 0x01, 0x00, 0x58], &[]);
        let (header, size) = MessageHeader::decode(&buffer).expect("Could not read header");
        assert_eq!(size, MESSAGE_HEADER_SIZE);
        assert_eq!((header.bits, header.msg_type, header.msg_length), (0x02, 0x01, 0x58));
        assert_eq!(MAGIC_COOKIE, header.cookie);
        assert_eq!(header.transaction_id, &turn_vectors::TRANSACTION_ID);
        assert!(header.validate(MESSAGE_HEADER_SIZE + 0x58).is_err());

        assert_eq!(
            MessageHeader::decode(&buffer[..19]).expect_err("Short header accepted"),
            StunErrorType::SmallBuffer
        );
    }

    #[test]
    fn header_validation() {
        let mut buffer = message([0x00, 0x01, 0x00, 0x04], &DONT_FRAGMENT);
        let (header, _) = MessageHeader::decode(&buffer).expect("Could not read header");
        assert!(header.validate(buffer.len()).is_ok());
        assert!(header.validate(buffer.len() + 4).is_err());

        buffer[4] = 0x22;
        let (header, _) = MessageHeader::decode(&buffer).expect("Could not read header");
        assert!(header.validate(buffer.len()).is_err());

        buffer[4] = 0x21;
        buffer[3] = 0x03;
        let (header, _) = MessageHeader::decode(&buffer).expect("Could not read header");
        assert!(header.validate(buffer.len()).is_err());
    }

    #[test]
    fn attribute_walk() {
        let mut buffer = vec![0x00, 0x13, 0x00, 0x03, b'a', b'b', b'c', 0x00];
        buffer.extend_from_slice(&DONT_FRAGMENT);
        let mut iter = RawAttributes::from(&buffer[..]).into_fallible_iter();

        let data = iter.next().expect("Truncated").expect("DATA expected");
        assert_eq!((data.attr_type, data.value), (0x0013, &b"abc"[..]));
        assert_eq!(iter.pos(), 8);

        let flag = iter.next().expect("Truncated").expect("DONT-FRAGMENT expected");
        assert_eq!(flag.attr_type, 0x001a);
        assert!(flag.value.is_empty());
        assert_eq!(iter.next(), Ok(None));
    }

    #[test]
    fn truncated_attributes() {
        let mut buffer = DONT_FRAGMENT.to_vec();
        buffer.extend_from_slice(&[0x00, 0x13, 0x00, 0x08, b'a', b'b', b'c', b'd']);
        let mut iter = RawAttributes::from(&buffer[..]).into_fallible_iter();
        assert!(iter.next().expect("Truncated").is_some());
        assert_eq!(
            iter.next(),
            Err(TruncatedAttribute {
                attr_type: Some(0x0013),
                position: 1
            })
        );

        let mut iter = RawAttributes::from(&[0x00, 0x13][..]).into_fallible_iter();
        assert_eq!(
            iter.next(),
            Err(TruncatedAttribute {
                attr_type: None,
                position: 0
            })
        );
    }

    #[test]
    fn integrity_input() {
        let mut attributes = DONT_FRAGMENT.to_vec();
        attributes.extend_from_slice(&[0x80, 0x28, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]);
        let buffer = message([0x00, 0x01, 0x00, 0x0c], &attributes);

        let text = get_input_text(&buffer, 4, 8).expect("Could not build input text");
        assert_eq!(text.len(), 24);
        assert_eq!(text[..4], [0x00, 0x01, 0x00, 0x0c]);
        assert_eq!(text[20..], DONT_FRAGMENT);
    }
}
