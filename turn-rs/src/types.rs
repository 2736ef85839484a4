use crate::common::check_buffer_boundaries;
use crate::error::{StunError, StunErrorType};
use crate::strings::opaque_enforce;
use crate::Encode;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

pub(crate) const MAGIC_COOKIE_SIZE: usize = 4;
pub(crate) const TRANSACTION_ID_SIZE: usize = 12;

/// Fixed value every STUN header carries right after the message length.
/// It tells STUN traffic apart from anything else multiplexed on the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cookie(u32);

impl Cookie {
    /// The cookie as a host order integer
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    fn matches(&self, wire: &[u8; MAGIC_COOKIE_SIZE]) -> bool {
        u32::from_be_bytes(*wire) == self.0
    }
}

impl PartialEq<u32> for Cookie {
    fn eq(&self, value: &u32) -> bool {
        *value == self.0
    }
}

impl PartialEq<[u8; MAGIC_COOKIE_SIZE]> for Cookie {
    fn eq(&self, wire: &[u8; MAGIC_COOKIE_SIZE]) -> bool {
        self.matches(wire)
    }
}

impl PartialEq<&[u8; MAGIC_COOKIE_SIZE]> for Cookie {
    fn eq(&self, wire: &&[u8; MAGIC_COOKIE_SIZE]) -> bool {
        self.matches(wire)
    }
}

/// `0x2112A442`
pub const MAGIC_COOKIE: Cookie = Cookie(0x2112_A442);

/// 96 bit identifier shared by a request and its response. Requests built
/// by the client get their identifier from its random source, this type
/// only carries the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Raw identifier bytes, as they travel in the header.
    pub fn as_bytes(&self) -> &[u8; TRANSACTION_ID_SIZE] {
        &self.0
    }

    fn hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TransactionId(0x{})", self.hex())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "transaction id (0x{})", self.hex())
    }
}

impl AsRef<[u8]> for TransactionId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<[u8; TRANSACTION_ID_SIZE]> for TransactionId {
    fn from(bytes: [u8; TRANSACTION_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<&[u8; TRANSACTION_ID_SIZE]> for TransactionId {
    fn from(bytes: &[u8; TRANSACTION_ID_SIZE]) -> Self {
        Self::from(*bytes)
    }
}

/// How an [`HMACKey`] was derived.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum CredentialMechanism {
    /// The password itself is the key.
    ShortTerm,
    /// MD5 digest of user name, realm and password.
    LongTerm,
}

impl CredentialMechanism {
    /// True for [`CredentialMechanism::ShortTerm`]
    pub fn is_short_term(&self) -> bool {
        *self == CredentialMechanism::ShortTerm
    }

    /// True for [`CredentialMechanism::LongTerm`]
    pub fn is_long_term(&self) -> bool {
        *self == CredentialMechanism::LongTerm
    }
}

/// Secret used to compute and verify MESSAGE-INTEGRITY. The bytes live
/// behind an [`Arc`], clones share them.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct HMACKey {
    mechanism: CredentialMechanism,
    bytes: Arc<[u8]>,
}

impl HMACKey {
    /// Short-term key: the password after `OpaqueString` preparation.
    pub fn new_short_term<S>(password: S) -> Result<Self, StunError>
    where
        S: AsRef<str>,
    {
        let prepared = opaque_enforce(password.as_ref())?;
        Ok(Self {
            mechanism: CredentialMechanism::ShortTerm,
            bytes: Arc::from(prepared.as_bytes()),
        })
    }

    /// Long-term key, the MD5 digest of
    /// `username ":" OpaqueString(realm) ":" OpaqueString(password)`.
    /// The user name is taken as it is.
    pub fn new_long_term<U, R, P>(username: U, realm: R, password: P) -> Result<Self, StunError>
    where
        U: AsRef<str>,
        R: AsRef<str>,
        P: AsRef<str>,
    {
        let input = format!(
            "{}:{}:{}",
            username.as_ref(),
            opaque_enforce(realm.as_ref())?,
            opaque_enforce(password.as_ref())?
        );
        let digest = md5::compute(input.as_bytes());
        Ok(Self {
            mechanism: CredentialMechanism::LongTerm,
            bytes: Arc::from(&digest.0[..]),
        })
    }

    /// Key material fed to HMAC-SHA1
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mechanism the key belongs to
    pub fn credential_mechanism(&self) -> CredentialMechanism {
        self.mechanism
    }
}

/// Family byte of the address attributes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressFamily {
    /// `0x01`
    IPv4,
    /// `0x02`
    IPv6,
}

impl TryFrom<u8> for AddressFamily {
    type Error = StunError;

    fn try_from(family: u8) -> Result<Self, Self::Error> {
        match family {
            0x01 => Ok(Self::IPv4),
            0x02 => Ok(Self::IPv6),
            other => Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Unknown address family {:#04x}", other),
            )),
        }
    }
}

impl From<AddressFamily> for u8 {
    fn from(family: AddressFamily) -> Self {
        match family {
            AddressFamily::IPv4 => 0x01,
            AddressFamily::IPv6 => 0x02,
        }
    }
}

impl Encode for AddressFamily {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
        check_buffer_boundaries(raw_value, 1)?;
        raw_value[0] = (*self).into();
        Ok(1)
    }
}

// Reason phrases hold at most 128 characters: 509 bytes when sent and up
// to 763 bytes accepted from the wire.
const REASON_SEND_LIMIT: usize = 509;
const REASON_RECV_LIMIT: usize = 763;
const ERROR_CODE_HEADER: usize = 4;

/// Numeric code and reason phrase reported by an error response.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ErrorCode {
    code: u16,
    reason: String,
}

impl ErrorCode {
    /// Fails with [`StunErrorType::InvalidParam`] unless `code` is in
    /// `300..=699`.
    pub fn new(code: u16, reason: &str) -> Result<Self, StunError> {
        match code {
            300..=699 => Ok(Self {
                code,
                reason: String::from(reason),
            }),
            _ => Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Error code {} outside of 300..=699", code),
            )),
        }
    }

    /// The code, e.g. `401`
    pub fn error_code(&self) -> u16 {
        self.code
    }

    /// Hundreds digit of the code
    pub fn class(&self) -> u8 {
        (self.code / 100) as u8
    }

    /// Code modulo 100
    pub fn number(&self) -> u8 {
        (self.code % 100) as u8
    }

    /// Reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

// Wire layout: 21 reserved bits, 3 bits of class, 8 bits of number, then
// the UTF-8 reason phrase.
impl<'a> crate::Decode<'a> for ErrorCode {
    fn decode(raw_value: &[u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(raw_value, ERROR_CODE_HEADER)?;

        let (class, number) = (raw_value[2] & 0x07, raw_value[3]);
        if !(3..=6).contains(&class) || number > 99 {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Bad error class {} or number {}", class, number),
            ));
        }

        let reason = std::str::from_utf8(&raw_value[ERROR_CODE_HEADER..])?;
        if reason.len() > REASON_RECV_LIMIT {
            return Err(StunError::new(
                StunErrorType::ValueTooLong,
                format!("{} byte reason phrase, limit is {}", reason.len(), REASON_RECV_LIMIT),
            ));
        }

        let code = u16::from(class) * 100 + u16::from(number);
        Ok((ErrorCode::new(code, reason)?, raw_value.len()))
    }
}

impl Encode for ErrorCode {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
        let phrase = self.reason.as_bytes();
        if phrase.len() > REASON_SEND_LIMIT {
            return Err(StunError::new(
                StunErrorType::ValueTooLong,
                format!("{} byte reason phrase, limit is {}", phrase.len(), REASON_SEND_LIMIT),
            ));
        }

        let size = ERROR_CODE_HEADER + phrase.len();
        check_buffer_boundaries(raw_value, size)?;
        raw_value[..ERROR_CODE_HEADER].copy_from_slice(&[0, 0, self.class(), self.number()]);
        raw_value[ERROR_CODE_HEADER..size].copy_from_slice(phrase);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decode;

    #[test]
    fn cookie_comparisons() {
        let wire = [0x21, 0x12, 0xa4, 0x42];
        assert_eq!(MAGIC_COOKIE, wire);
        assert_eq!(MAGIC_COOKIE, &wire);
        assert_eq!(MAGIC_COOKIE, 0x2112_A442);
        assert_eq!(MAGIC_COOKIE.as_u32(), 0x2112_A442);
        assert_ne!(MAGIC_COOKIE, [0x21, 0x12, 0xa4, 0x43]);
    }

    #[test]
    fn transaction_id_formatting() {
        let id = TransactionId::from(&[
            0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae,
        ]);
        assert_eq!(format!("{:?}", id), "TransactionId(0xB7E7A701BC34D686FA87DFAE)");
        assert_eq!(format!("{}", id), "transaction id (0xB7E7A701BC34D686FA87DFAE)");
        assert_eq!(id.as_ref().len(), 12);
    }

    #[test]
    fn long_term_key_digest() {
        let key = HMACKey::new_long_term("user", "realm", "pass").expect("Invalid credentials");
        assert!(key.credential_mechanism().is_long_term());
        assert_eq!(
            key.as_bytes(),
            [
                0x84, 0x93, 0xFB, 0xC5, 0x3B, 0xA5, 0x82, 0xFB, 0x4C, 0x04, 0x4C, 0x45, 0x6B,
                0xDC, 0x40, 0xEB
            ]
        );
        assert_eq!(key.clone(), key);
    }

    #[test]
    fn short_term_key_is_password() {
        let key = HMACKey::new_short_term("VOkJxbRl1RmTxUk/WvJxBt").expect("Invalid password");
        assert_eq!(key.credential_mechanism(), CredentialMechanism::ShortTerm);
        assert_eq!(key.as_bytes(), b"VOkJxbRl1RmTxUk/WvJxBt");
    }

    #[test]
    fn address_family_values() {
        assert_eq!(AddressFamily::try_from(0x01), Ok(AddressFamily::IPv4));
        assert_eq!(u8::from(AddressFamily::IPv6), 0x02);
        assert_eq!(
            AddressFamily::try_from(0x03).expect_err("Family 3 accepted"),
            StunErrorType::InvalidParam
        );
    }

    #[test]
    fn error_code_bounds() {
        for code in [299, 700] {
            assert!(ErrorCode::new(code, "Out of range").is_err());
        }
        assert!(ErrorCode::new(300, "Try Alternate").is_ok());
        assert!(ErrorCode::new(699, "Last one").is_ok());

        let quota = ErrorCode::new(486, "Allocation Quota Reached").expect("Valid code");
        assert_eq!((quota.class(), quota.number()), (4, 86));
    }

    #[test]
    fn error_code_from_wire() {
        let mut wire = vec![0x00, 0x00, 0x04, 0x01];
        wire.extend_from_slice(b"Unauthorized");
        let (error, size) = ErrorCode::decode(&wire).expect("Could not decode");
        assert_eq!(size, wire.len());
        assert_eq!(error.error_code(), 401);
        assert_eq!(error.reason(), "Unauthorized");

        assert_eq!(
            ErrorCode::decode(&[0x00, 0x00, 0x07, 0x01]).expect_err("Class 7 accepted"),
            StunErrorType::InvalidParam
        );
        assert_eq!(
            ErrorCode::decode(&[0x00, 0x00, 0x04, 0x64]).expect_err("Number 100 accepted"),
            StunErrorType::InvalidParam
        );
    }

    #[test]
    fn error_code_to_wire() {
        let stale = ErrorCode::new(438, "Stale Nonce").expect("Valid code");
        let mut buffer = [0xff; 15];
        assert_eq!(stale.encode(&mut buffer), Ok(15));
        assert_eq!(buffer[..4], [0x00, 0x00, 0x04, 0x26]);
        assert_eq!(&buffer[4..], b"Stale Nonce");

        assert_eq!(
            stale.encode(&mut [0x00; 10]).expect_err("Small buffer accepted"),
            StunErrorType::SmallBuffer
        );
    }
}
