//! Sans I/O implementation of a TURN client,
//! [`RFC5766`](https://datatracker.ietf.org/doc/html/rfc5766).
//!
//! The [`TurnClient`] does not own any socket nor timer. The caller hands
//! it the datagrams received from the server and tells it when the
//! scheduled timeout elapses, and in return it drains a list of
//! [`TurnClientEvent`]s with the datagrams to send, the next timeout to
//! arm and the notifications for the application.
//!
//! ```rust
//! # use turn_agent::{ClientState, TurnClientBuilder, TurnClientEvent};
//! # use std::error::Error;
//! # use std::time::Instant;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let mut client = TurnClientBuilder::new("user", "pass")?.build()?;
//! client.allocate(Instant::now())?;
//!
//! let events = client.events();
//! assert!(matches!(events[0], TurnClientEvent::OutputPacket(_)));
//! assert_eq!(events[1], TurnClientEvent::StateChanged(ClientState::Allocating));
//! assert!(matches!(events[2], TurnClientEvent::TimeoutScheduled(_)));
//! #   Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod random;
pub mod rtt;

mod lt_cred_mech;
mod timeout;
mod transaction;

pub use crate::client::{ClientState, TurnClient, TurnClientBuilder};
pub use crate::error::{StunAgentError, TurnError};
pub use crate::events::TurnClientEvent;
pub use crate::random::{RandomSource, StdRandom};
pub use crate::rtt::RttConfig;
