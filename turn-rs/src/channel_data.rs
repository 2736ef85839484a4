use crate::common::{check_buffer_boundaries, fill_padding_value, padding, DEFAULT_PADDING_VALUE};
use crate::error::{StunError, StunErrorType};
use byteorder::{BigEndian, ByteOrder};

// ChannelData message format:
//      0                   1                   2                   3
//      0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//     +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//     |         Channel Number        |            Length             |
//     +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//     |                                                               |
//     /                       Application Data                        /
//     /                                                               /
//     |                                                               |
//     |                               +-------------------------------+
//     |                               |
//     +-------------------------------+

/// Size of the ChannelData header
pub const CHANNEL_DATA_HEADER_SIZE: usize = 4;
/// Lowest channel number a client can bind
pub const MIN_CHANNEL_NUMBER: u16 = 0x4000;
/// Highest channel number a client can bind
pub const MAX_CHANNEL_NUMBER: u16 = 0x7FFF;

/// Kind of packet received on a TURN client transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// STUN message, the two most significant bits are `0b00`
    Stun,
    /// ChannelData message, the two most significant bits are `0b01`
    ChannelData,
}

/// Tells STUN messages and ChannelData messages apart by looking at the
/// first two bits of the buffer. Returns `None` for empty buffers and for
/// any other bit pattern.
/// # Examples
///```rust
/// # use turn_rs::{demultiplex, PacketKind};
/// assert_eq!(demultiplex(&[0x00, 0x01]), Some(PacketKind::Stun));
/// assert_eq!(demultiplex(&[0x40, 0x01]), Some(PacketKind::ChannelData));
/// assert_eq!(demultiplex(&[0x80, 0x01]), None);
/// assert_eq!(demultiplex(&[]), None);
///```
pub fn demultiplex(buffer: &[u8]) -> Option<PacketKind> {
    match buffer.first()? >> 6 {
        0b00 => Some(PacketKind::Stun),
        0b01 => Some(PacketKind::ChannelData),
        _ => None,
    }
}

fn check_channel(channel: u16) -> Result<(), StunError> {
    (MIN_CHANNEL_NUMBER..=MAX_CHANNEL_NUMBER)
        .contains(&channel)
        .then_some(())
        .ok_or_else(|| {
            StunError::new(
                StunErrorType::InvalidParam,
                format!("Channel number {:#06x} out of range", channel),
            )
        })
}

/// The ChannelData message carries application data between the client
/// and the server once a channel is bound to a peer. It only adds a four
/// bytes header to the payload.
///
/// # Examples
///```rust
/// # use turn_rs::ChannelData;
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let msg = ChannelData::new(0x4001, b"hello".to_vec())?;
/// let buffer = msg.encode_to_vec()?;
/// assert_eq!(buffer.len(), 12);
///
/// let (decoded, size) = ChannelData::decode(&buffer)?;
/// assert_eq!(size, 12);
/// assert_eq!(decoded.channel(), 0x4001);
/// assert_eq!(decoded.payload(), b"hello");
/// #   Ok(())
/// # }
///```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    channel: u16,
    payload: Vec<u8>,
}

impl ChannelData {
    /// Creates a ChannelData message. The `channel` must be in the range
    /// `0x4000..=0x7FFF` and the payload must fit in 16 bits length.
    pub fn new(channel: u16, payload: Vec<u8>) -> Result<Self, StunError> {
        check_channel(channel)?;
        u16::try_from(payload.len())?;
        Ok(Self { channel, payload })
    }

    /// Returns the channel number
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Returns the application data
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the message returning the application data
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Size required to encode this message, padding included.
    pub fn encoded_size(&self) -> usize {
        CHANNEL_DATA_HEADER_SIZE + self.payload.len() + padding(self.payload.len())
    }

    /// Encodes the message into `buffer`, padding the payload to a four bytes
    /// boundary. Returns the number of bytes written.
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, StunError> {
        let size = self.encoded_size();
        check_buffer_boundaries(buffer, size)?;

        let length = u16::try_from(self.payload.len())?;
        BigEndian::write_u16(&mut buffer[..2], self.channel);
        BigEndian::write_u16(&mut buffer[2..4], length);

        let end = CHANNEL_DATA_HEADER_SIZE + self.payload.len();
        buffer[CHANNEL_DATA_HEADER_SIZE..end].copy_from_slice(&self.payload);
        fill_padding_value(&mut buffer[end..], padding(self.payload.len()), DEFAULT_PADDING_VALUE)?;

        Ok(size)
    }

    /// Encodes the message into a new vector.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, StunError> {
        let mut buffer = vec![0u8; self.encoded_size()];
        self.encode(&mut buffer)?;
        Ok(buffer)
    }

    /// Decodes a ChannelData message. Padding after the payload is
    /// tolerated but not required. Returns the message and the number of
    /// bytes consumed, padding included when present.
    pub fn decode(buffer: &[u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(buffer, CHANNEL_DATA_HEADER_SIZE)?;

        let channel = BigEndian::read_u16(&buffer[..2]);
        check_channel(channel)?;

        let length = BigEndian::read_u16(&buffer[2..4]) as usize;
        let end = CHANNEL_DATA_HEADER_SIZE + length;
        check_buffer_boundaries(buffer, end)?;

        let payload = buffer[CHANNEL_DATA_HEADER_SIZE..end].to_vec();
        let size = std::cmp::min(end + padding(length), buffer.len());

        Ok((Self { channel, payload }, size))
    }
}
