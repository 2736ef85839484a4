use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::common::check_buffer_boundaries;
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::{StunError, StunErrorType};
use crate::{Decode, Encode};

const FINGERPRINT: u16 = 0x8028;
const CRC_SIZE: usize = 4;
const CRC_MASK: u32 = 0x5354_554e;

fn crc32(input: &[u8]) -> u32 {
    const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    CRC.checksum(input)
}

/// CRC-32 of the preceding message bytes XOR'ed with `0x5354554e`. When
/// present it is the last attribute of the message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// Placeholder added to outgoing messages. The checksum is filled in
    /// once the rest of the message has been written.
    #[default]
    Encodable,
    /// Checksum read from a received message, already unmasked.
    Decodable(u32),
}

impl Fingerprint {
    /// Compares the received checksum with the CRC-32 of `input`, the
    /// message bytes before this attribute with the header length already
    /// covering it. Always false for [`Fingerprint::Encodable`].
    pub fn validate(&self, input: &[u8]) -> bool {
        matches!(self, Self::Decodable(received) if *received == crc32(input))
    }
}

impl EncodeAttributeValue for Fingerprint {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        if let Self::Decodable(_) = self {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                "Received fingerprints are not sent again",
            ));
        }
        0u32.encode(ctx.raw_value_mut())
    }

    fn post_encode(&self, mut ctx: AttributeEncoderContext) -> Result<(), StunError> {
        check_buffer_boundaries(ctx.raw_value(), CRC_SIZE)?;
        let checksum = crc32(ctx.encoded_message()) ^ CRC_MASK;
        checksum.encode(ctx.raw_value_mut()).map(|_| ())
    }
}

impl DecodeAttributeValue for Fingerprint {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (masked, size) = u32::decode(ctx.raw_value())?;
        Ok((Self::Decodable(masked ^ CRC_MASK), size))
    }
}

attribute_marker!(Fingerprint, FINGERPRINT);

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 5769 IPv4 response: FINGERPRINT value at 76..80
    const MESSAGE: &[u8] = &turn_vectors::SAMPLE_IPV4_RESPONSE;

    #[test]
    fn checksum_written_after_encoding() {
        let mut value = [0xff; 4];
        let fingerprint = Fingerprint::default();

        let ctx = AttributeEncoderContext::new(&MESSAGE[..72], &mut value);
        assert_eq!(fingerprint.encode(ctx), Ok(CRC_SIZE));
        assert_eq!(value, [0x00; 4]);

        let ctx = AttributeEncoderContext::new(&MESSAGE[..72], &mut value);
        fingerprint.post_encode(ctx).expect("Could not compute checksum");
        assert_eq!(value, MESSAGE[76..80]);
    }

    #[test]
    fn checksum_validation() {
        let ctx = AttributeDecoderContext::new(&MESSAGE[..72], &MESSAGE[76..80]);
        let (fingerprint, size) = Fingerprint::decode(ctx).expect("Could not decode Fingerprint");
        assert_eq!(size, CRC_SIZE);
        assert!(fingerprint.validate(&MESSAGE[..72]));
        assert!(!fingerprint.validate(&MESSAGE[..68]));
        assert!(!Fingerprint::Encodable.validate(&MESSAGE[..72]));

        let mut value = [0x00; 4];
        let ctx = AttributeEncoderContext::new(&[], &mut value);
        assert!(fingerprint.encode(ctx).is_err());
    }
}
