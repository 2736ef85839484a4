use crate::attributes::text_attr::text_attribute;

const SOFTWARE: u16 = 0x8022;

text_attribute!(
    /// The SOFTWARE attribute contains a textual description of the software
    /// being used by the agent sending the message. It is informational only.
    /// The value must be fewer than 128 characters.
    ///
    /// # Examples
    ///```rust
    /// # use turn_rs::attributes::stun::Software;
    /// let attr = Software::new("turn-rs v0.1").expect("Can not create Software attribute");
    /// assert_eq!(attr, "turn-rs v0.1");
    /// assert!(Software::new("x".repeat(128)).is_err());
    ///```
    Software,
    SOFTWARE,
    max_bytes = 763,
    max_chars = 127,
    prepare = crate::strings::plain_text,
    enforce = crate::strings::plain_text,
);
