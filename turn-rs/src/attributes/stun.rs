//! RFC 5389 attributes: credentials, integrity, error reporting and the
//! reflexive address.

mod error_code;
mod fingerprint;
mod message_integrity;
mod nonce;
mod realm;
mod software;
mod unknown_attributes;
mod user_name;
mod xor_mapped_address;

pub use self::{
    error_code::ErrorCode, fingerprint::Fingerprint, message_integrity::MessageIntegrity,
    nonce::Nonce, realm::Realm, software::Software, unknown_attributes::UnknownAttributes,
    user_name::UserName, xor_mapped_address::XorMappedAddress,
};
