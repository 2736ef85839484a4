use crate::attributes::text_attr::text_attribute;

const USER_NAME: u16 = 0x0006;

text_attribute!(
    /// The USERNAME attribute is used for message integrity. It identifies
    /// the username and password combination used in the message-integrity
    /// check. The value is processed with the `OpaqueString` profile
    /// [`RFC8265`](https://datatracker.ietf.org/doc/html/rfc8265) and must
    /// be shorter than 513 bytes.
    UserName,
    USER_NAME,
    max_bytes = 512,
    max_chars = usize::MAX,
    prepare = crate::strings::opaque_prepare,
    enforce = crate::strings::opaque_enforce,
);
