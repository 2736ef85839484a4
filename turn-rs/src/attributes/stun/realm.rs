use crate::attributes::text_attr::text_attribute;

const REALM: u16 = 0x0014;

text_attribute!(
    /// The REALM attribute may be present in requests and responses. It
    /// contains text that meets the grammar for "realm-value" as described
    /// in [`RFC3261`](https://datatracker.ietf.org/doc/html/rfc3261)
    /// but without the double quotes and their surrounding white space.
    /// Its presence in a request indicates that long-term credentials
    /// are being used for authentication.
    ///
    /// # Examples
    ///```rust
    /// # use turn_rs::attributes::stun::Realm;
    /// let attr = Realm::new("example.org").expect("Can not create Realm");
    /// assert_eq!(attr, "example.org");
    /// assert!(Realm::new("\u{fd}\u{80}").is_err());
    ///```
    Realm,
    REALM,
    max_bytes = 763,
    max_chars = 127,
    prepare = crate::strings::opaque_quoted_text,
    enforce = crate::strings::quoted_text_strict,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::DecodeAttributeValue;
    use crate::context::AttributeDecoderContext;
    use crate::StunErrorType;

    #[test]
    fn decode_realm() {
        let ctx = AttributeDecoderContext::new(&[], b"example.org");
        let (realm, size) = Realm::decode(ctx).expect("Can not decode Realm");
        assert_eq!(size, 11);
        assert_eq!(realm, "example.org");

        let ctx = AttributeDecoderContext::new(&[], b"\"example.org\"");
        assert_eq!(
            Realm::decode(ctx).expect_err("Error expected"),
            StunErrorType::InvalidParam
        );
    }
}
