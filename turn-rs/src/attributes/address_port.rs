use crate::common::check_buffer_boundaries;
use crate::error::StunError;
use crate::types::AddressFamily;
use crate::{Decode, Encode};
use byteorder::{BigEndian, ByteOrder};
use std::convert::TryFrom;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

// Address values start with a zero byte, the family and the port, followed
// by four or sixteen address bytes.
const ADDRESS_HEADER: usize = 4;

fn address_len(family: AddressFamily) -> usize {
    match family {
        AddressFamily::IPv4 => 4,
        AddressFamily::IPv6 => 16,
    }
}

fn family_of(addr: &SocketAddr) -> AddressFamily {
    if addr.is_ipv4() {
        AddressFamily::IPv4
    } else {
        AddressFamily::IPv6
    }
}

impl Decode<'_> for SocketAddr {
    fn decode(buffer: &[u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(buffer, ADDRESS_HEADER)?;
        let family = AddressFamily::try_from(buffer[1])?;
        let port = BigEndian::read_u16(&buffer[2..ADDRESS_HEADER]);

        let size = ADDRESS_HEADER + address_len(family);
        check_buffer_boundaries(buffer, size)?;
        let octets = &buffer[ADDRESS_HEADER..size];
        let ip = match family {
            AddressFamily::IPv4 => IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(octets)?)),
            AddressFamily::IPv6 => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(octets)?)),
        };
        Ok((SocketAddr::new(ip, port), size))
    }
}

impl Encode for SocketAddr {
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, StunError> {
        let family = family_of(self);
        let size = ADDRESS_HEADER + address_len(family);
        check_buffer_boundaries(buffer, size)?;

        buffer[0] = 0;
        family.encode(&mut buffer[1..2])?;
        BigEndian::write_u16(&mut buffer[2..ADDRESS_HEADER], self.port());
        match self.ip() {
            IpAddr::V4(ip) => buffer[ADDRESS_HEADER..size].copy_from_slice(&ip.octets()),
            IpAddr::V6(ip) => buffer[ADDRESS_HEADER..size].copy_from_slice(&ip.octets()),
        }
        Ok(size)
    }
}

// Declares an attribute holding a transport address XOR'ed with the magic
// cookie and the transaction id of the message it travels in.
macro_rules! xor_socket_addr_attribute {
    (
        $(#[$meta:meta])*
        $name:ident,
        $attr_type:ident,
    ) => (
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(std::net::SocketAddr);

        impl $name {
            /// Address in clear, as seen by the server.
            pub fn socket_address(&self) -> &std::net::SocketAddr {
                &self.0
            }
        }

        impl From<std::net::SocketAddr> for $name {
            fn from(addr: std::net::SocketAddr) -> Self {
                Self(addr)
            }
        }

        impl AsRef<std::net::SocketAddr> for $name {
            fn as_ref(&self) -> &std::net::SocketAddr {
                self.socket_address()
            }
        }

        impl crate::attributes::DecodeAttributeValue for $name {
            fn decode(ctx: crate::context::AttributeDecoderContext) -> Result<(Self, usize), crate::StunError> {
                use crate::Decode;
                let id = crate::common::transaction_id_from_header(ctx.decoded_message())?;
                let (masked, size) = std::net::SocketAddr::decode(ctx.raw_value())?;
                Ok((Self(crate::common::socket_addr_xor(&masked, &id)), size))
            }
        }

        impl crate::attributes::EncodeAttributeValue for $name {
            fn encode(&self, mut ctx: crate::context::AttributeEncoderContext) -> Result<usize, crate::StunError> {
                use crate::Encode;
                let id = crate::common::transaction_id_from_header(ctx.encoded_message())?;
                let masked = crate::common::socket_addr_xor(&self.0, &id);
                masked.encode(ctx.raw_value_mut())
            }
        }

        crate::attributes::attribute_marker!($name, $attr_type);
    )
}
pub(crate) use xor_socket_addr_attribute;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StunErrorType;

    #[test]
    fn ipv4_from_wire() {
        let wire = [0x00, 0x01, 0x0f, 0xa0, 0x05, 0x06, 0x07, 0x08];
        let (addr, size) = SocketAddr::decode(&wire).expect("Could not decode address");
        assert_eq!(size, 8);
        assert_eq!(addr, "5.6.7.8:4000".parse().expect("Invalid address"));
    }

    #[test]
    fn bad_family_or_length() {
        let unknown_family = [0x00, 0x03, 0x0f, 0xa0, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(
            SocketAddr::decode(&unknown_family).expect_err("Family 3 accepted"),
            StunErrorType::InvalidParam
        );

        let short_ipv6 = [0x00, 0x02, 0x0f, 0xa0, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(
            SocketAddr::decode(&short_ipv6).expect_err("Short IPv6 accepted"),
            StunErrorType::SmallBuffer
        );
    }

    #[test]
    fn ipv6_to_wire() {
        let addr: SocketAddr = "[::1]:5000".parse().expect("Invalid address");
        let mut wire = [0xff; 20];
        assert_eq!(addr.encode(&mut wire), Ok(20));
        assert_eq!(wire[..4], [0x00, 0x02, 0x13, 0x88]);
        assert_eq!(wire[4..19], [0x00; 15]);
        assert_eq!(wire[19], 0x01);

        assert_eq!(
            addr.encode(&mut [0xff; 19]).expect_err("Short buffer accepted"),
            StunErrorType::SmallBuffer
        );
    }
}
