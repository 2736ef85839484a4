use crate::attributes::text_attr::text_attribute;

const NONCE: u16 = 0x0015;

text_attribute!(
    /// The NONCE attribute may be present in requests and responses. It
    /// contains a sequence of `qdtext` or `quoted-pair`, chosen by the
    /// server, that the client echoes in authenticated requests.
    Nonce,
    NONCE,
    max_bytes = 763,
    max_chars = 127,
    prepare = crate::strings::quoted_text,
    enforce = crate::strings::quoted_text_strict,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::DecodeAttributeValue;
    use crate::context::AttributeDecoderContext;
    use crate::StunErrorType;

    #[test]
    fn decode_nonce() {
        let ctx = AttributeDecoderContext::new(&[], b"f//499k954d6OL34oL9FSTvy64sA");
        let (nonce, size) = Nonce::decode(ctx).expect("Can not decode Nonce");
        assert_eq!(size, 28);
        assert_eq!(nonce, "f//499k954d6OL34oL9FSTvy64sA");

        let value = "x".repeat(128);
        let ctx = AttributeDecoderContext::new(&[], value.as_bytes());
        assert_eq!(
            Nonce::decode(ctx).expect_err("Error expected"),
            StunErrorType::ValueTooLong
        );
    }
}
