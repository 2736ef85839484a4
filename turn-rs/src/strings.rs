// Text preparation shared by the credential attributes: PRECIS
// `OpaqueString` for user names, realms and passwords, and the SIP
// `quoted-string` grammar for REALM and NONCE.

use crate::error::{StunError, StunErrorType};
use precis_core::profile::PrecisFastInvocation;
use precis_profiles::OpaqueString;
use quoted_string_parser::{QuotedStringParseLevel, QuotedStringParser};

/// Values taken as they are.
pub fn plain_text(value: &str) -> Result<String, StunError> {
    Ok(value.to_owned())
}

/// `OpaqueString` preparation, used on values created locally.
pub fn opaque_prepare(value: &str) -> Result<String, StunError> {
    Ok(OpaqueString::prepare(value)?.into_owned())
}

/// `OpaqueString` enforcement, used on received values and key derivation.
pub fn opaque_enforce(value: &str) -> Result<String, StunError> {
    Ok(OpaqueString::enforce(value)?.into_owned())
}

fn is_quoted_string(value: &str) -> bool {
    [
        QuotedStringParseLevel::QuotedText,
        QuotedStringParseLevel::QuotedString,
    ]
    .into_iter()
    .any(|level| QuotedStringParser::validate(level, value))
}

/// Accepts `qdtext`/`quoted-pair` sequences, with or without the
/// surrounding quotes and white space, and returns the bare text.
pub fn quoted_text(value: &str) -> Result<String, StunError> {
    if !is_quoted_string(value) {
        return Err(StunError::new(
            StunErrorType::InvalidParam,
            format!("'{}' is not a quoted-string", value),
        ));
    }
    let bare = value.trim_matches(|c| matches!(c, '"' | ' ' | '\t' | '\r' | '\n'));
    Ok(bare.to_owned())
}

/// Received REALM and NONCE values travel without quotes.
pub fn quoted_text_strict(value: &str) -> Result<String, StunError> {
    let bare = quoted_text(value)?;
    if bare != value {
        return Err(StunError::new(
            StunErrorType::InvalidParam,
            "Quoted text must be sent without delimiters",
        ));
    }
    Ok(bare)
}

/// REALM values created locally: `OpaqueString` first, then quoting rules.
pub fn opaque_quoted_text(value: &str) -> Result<String, StunError> {
    quoted_text(&opaque_prepare(value)?)
}
