use crate::error::{StunError, StunErrorType};
use crate::raw::MESSAGE_HEADER_SIZE;
use crate::types::{MAGIC_COOKIE, TRANSACTION_ID_SIZE};
use crate::Encode;
use std::net::{IpAddr, SocketAddr};

pub const DEFAULT_PADDING_VALUE: u8 = 0x00;

pub fn check_buffer_boundaries(buffer: &[u8], required: usize) -> Result<(), StunError> {
    if buffer.len() < required {
        return Err(StunError::new(
            StunErrorType::SmallBuffer,
            format!("{} bytes needed, {} available", required, buffer.len()),
        ));
    }
    Ok(())
}

/// Bytes to add after a value of `size` bytes to reach the next multiple
/// of four.
pub fn padding(size: usize) -> usize {
    match size % 4 {
        0 => 0,
        rest => 4 - rest,
    }
}

pub fn fill_padding_value(buffer: &mut [u8], size: usize, value: u8) -> Result<(), StunError> {
    check_buffer_boundaries(buffer, size)?;
    buffer.iter_mut().take(size).for_each(|b| *b = value);
    Ok(())
}

// Network order integers
macro_rules! be_integer {
    ($int:ty) => {
        impl<'a> crate::Decode<'a> for $int {
            fn decode(raw_value: &[u8]) -> Result<(Self, usize), StunError> {
                const SIZE: usize = std::mem::size_of::<$int>();
                check_buffer_boundaries(raw_value, SIZE)?;
                let bytes: [u8; SIZE] = raw_value[..SIZE].try_into()?;
                Ok((<$int>::from_be_bytes(bytes), SIZE))
            }
        }

        impl Encode for $int {
            fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
                const SIZE: usize = std::mem::size_of::<$int>();
                check_buffer_boundaries(raw_value, SIZE)?;
                raw_value[..SIZE].copy_from_slice(&self.to_be_bytes());
                Ok(SIZE)
            }
        }
    };
}

be_integer!(u16);
be_integer!(u32);

impl Encode for &str {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
        let text = self.as_bytes();
        check_buffer_boundaries(raw_value, text.len())?;
        raw_value[..text.len()].copy_from_slice(text);
        Ok(text.len())
    }
}

/// Transaction id stored in bytes 8 to 20 of a message header.
pub fn transaction_id_from_header(buffer: &[u8]) -> Result<[u8; TRANSACTION_ID_SIZE], StunError> {
    check_buffer_boundaries(buffer, MESSAGE_HEADER_SIZE)?;
    Ok(buffer[MESSAGE_HEADER_SIZE - TRANSACTION_ID_SIZE..MESSAGE_HEADER_SIZE].try_into()?)
}

// The port is XOR'ed with the top half of the magic cookie. IPv4 addresses
// are XOR'ed with the cookie, IPv6 addresses with the cookie followed by
// the transaction id. Applying it twice gives back the original address.
pub fn socket_addr_xor(addr: &SocketAddr, transaction_id: &[u8; TRANSACTION_ID_SIZE]) -> SocketAddr {
    let cookie = MAGIC_COOKIE.as_u32().to_be_bytes();
    let port = addr.port() ^ u16::from_be_bytes([cookie[0], cookie[1]]);
    let mask = cookie.iter().chain(transaction_id.iter());
    let ip = match addr.ip() {
        IpAddr::V4(ip) => {
            let mut octets = ip.octets();
            octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
            IpAddr::from(octets)
        }
        IpAddr::V6(ip) => {
            let mut octets = ip.octets();
            octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
            IpAddr::from(octets)
        }
    };
    SocketAddr::new(ip, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decode;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn four_byte_alignment() {
        let expected = [0, 3, 2, 1, 0, 3, 2, 1];
        for (size, pad) in expected.iter().enumerate() {
            assert_eq!(padding(size), *pad, "padding of {} bytes", size);
        }
        assert_eq!(padding(11), 1);
    }

    #[test]
    fn small_buffers() {
        assert!(check_buffer_boundaries(&[], 0).is_ok());
        assert_eq!(
            check_buffer_boundaries(&[], 1).expect_err("Empty buffer accepted"),
            StunErrorType::SmallBuffer
        );
        assert!(check_buffer_boundaries(&[0], 1).is_ok());
        assert!(check_buffer_boundaries(&[0], 2).is_err());
    }

    #[test]
    fn network_order_integers() {
        let mut buffer = [0u8; 4];
        assert_eq!(0x0102_0304u32.encode(&mut buffer), Ok(4));
        assert_eq!(buffer, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(u16::decode(&buffer), Ok((0x0102, 2)));
        assert_eq!(u32::decode(&buffer[..3]).expect_err("Short buffer"), StunErrorType::SmallBuffer);

        let mut buffer = [0xffu8; 6];
        fill_padding_value(&mut buffer, 3, 0x00).expect("Could not pad");
        assert_eq!(buffer, [0x00, 0x00, 0x00, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn xor_ipv4_address() {
        let tid = [0x00; TRANSACTION_ID_SIZE];
        let addr: SocketAddr = "192.0.2.1:32853".parse().expect("Invalid address");
        let xor = socket_addr_xor(&addr, &tid);
        assert_eq!(xor.port(), 0xa147);
        assert_eq!(xor.ip(), IpAddr::V4(Ipv4Addr::new(0xe1, 0x12, 0xa6, 0x43)));
        assert_eq!(socket_addr_xor(&xor, &tid), addr);
    }

    #[test]
    fn xor_ipv6_address() {
        let tid = [
            0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae,
        ];
        let addr: SocketAddr = "[2001:db8:1234:5678:11:2233:4455:6677]:32853"
            .parse()
            .expect("Invalid address");
        let xor = socket_addr_xor(&addr, &tid);
        assert_eq!(xor.port(), 0xa147);
        assert_eq!(
            xor.ip(),
            IpAddr::V6(Ipv6Addr::from([
                0x01, 0x13, 0xa9, 0xfa, 0xa5, 0xd3, 0xf1, 0x79, 0xbc, 0x25, 0xf4, 0xb5, 0xbe,
                0xd2, 0xb9, 0xd9
            ]))
        );
        assert_eq!(socket_addr_xor(&xor, &tid), addr);
    }
}
