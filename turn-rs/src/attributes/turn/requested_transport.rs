use crate::attributes::{attribute_marker, DecodeAttributeValue, EncodeAttributeValue};
use crate::common::check_buffer_boundaries;
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;

const REQUESTED_TRANSPORT: u16 = 0x0019;
const REQUESTED_TRANSPORT_SIZE: usize = 4;

/// IANA protocol number of UDP
pub const PROTOCOL_UDP: u8 = 17;

/// The REQUESTED-TRANSPORT attribute is used by the client to request a
/// specific transport protocol for the allocated transport address. The
/// protocol number is followed by three `RFFU` octets.
///
/// # Examples
///```rust
/// # use turn_rs::attributes::turn::RequestedTransport;
/// let attr = RequestedTransport::udp();
/// assert_eq!(attr.protocol(), 17);
///```
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct RequestedTransport(u8);

impl RequestedTransport {
    /// Creates the attribute for the IANA `protocol` number.
    pub fn new(protocol: u8) -> Self {
        Self(protocol)
    }

    /// Requests a UDP relayed transport address.
    pub fn udp() -> Self {
        Self(PROTOCOL_UDP)
    }

    /// Returns the protocol number
    pub fn protocol(&self) -> u8 {
        self.0
    }
}

impl DecodeAttributeValue for RequestedTransport {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        check_buffer_boundaries(raw_value, REQUESTED_TRANSPORT_SIZE)?;
        Ok((Self(raw_value[0]), REQUESTED_TRANSPORT_SIZE))
    }
}

impl EncodeAttributeValue for RequestedTransport {
    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, REQUESTED_TRANSPORT_SIZE)?;
        raw_value[0] = self.0;
        raw_value[1..REQUESTED_TRANSPORT_SIZE].fill(0);
        Ok(REQUESTED_TRANSPORT_SIZE)
    }
}

attribute_marker!(RequestedTransport, REQUESTED_TRANSPORT);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_transport_value() {
        let mut buffer = [0xff; 4];
        let ctx = AttributeEncoderContext::new(&[], &mut buffer);
        assert_eq!(RequestedTransport::udp().encode(ctx), Ok(4));
        assert_eq!(buffer, [0x11, 0x00, 0x00, 0x00]);

        let buffer = [0x06, 0x01, 0x02, 0x03];
        let ctx = AttributeDecoderContext::new(&[], &buffer);
        let (attr, size) = RequestedTransport::decode(ctx).expect("Can not decode RequestedTransport");
        assert_eq!(size, 4);
        assert_eq!(attr.protocol(), 6);
    }
}
