//! STUN and TURN methods.
//! The method is a 12 bit value registered in the
//! [STUN methods registry](https://www.iana.org/assignments/stun-parameters/stun-parameters.xhtml#stun-parameters-2)

use crate::MessageMethod;

/// The binding method is used to discover the server reflexive address.
/// [`RFC5389`](https://datatracker.ietf.org/doc/html/rfc5389#section-18.1)
pub const BINDING: MessageMethod = MessageMethod(0x0001);

/// Creates a relayed transport address on the server.
/// [`RFC5766`](https://datatracker.ietf.org/doc/html/rfc5766#section-6)
pub const ALLOCATE: MessageMethod = MessageMethod(0x0003);

/// Refreshes the lifetime of an allocation, or deletes it with a zero
/// lifetime.
/// [`RFC5766`](https://datatracker.ietf.org/doc/html/rfc5766#section-7)
pub const REFRESH: MessageMethod = MessageMethod(0x0004);

/// Send indication, carries data from the client to a peer.
/// [`RFC5766`](https://datatracker.ietf.org/doc/html/rfc5766#section-10)
pub const SEND: MessageMethod = MessageMethod(0x0006);

/// Data indication, carries data from a peer to the client.
/// [`RFC5766`](https://datatracker.ietf.org/doc/html/rfc5766#section-10)
pub const DATA: MessageMethod = MessageMethod(0x0007);

/// Installs or refreshes permissions on the server.
/// [`RFC5766`](https://datatracker.ietf.org/doc/html/rfc5766#section-9)
pub const CREATE_PERMISSION: MessageMethod = MessageMethod(0x0008);

/// Binds a channel number to a peer transport address.
/// [`RFC5766`](https://datatracker.ietf.org/doc/html/rfc5766#section-11)
pub const CHANNEL_BIND: MessageMethod = MessageMethod(0x0009);
