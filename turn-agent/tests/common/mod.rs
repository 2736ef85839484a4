#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use turn_agent::{ClientState, StdRandom, TurnClient, TurnClientBuilder, TurnClientEvent};
use turn_rs::attributes::stun::{
    ErrorCode, Fingerprint, MessageIntegrity, Nonce, Realm, Software, XorMappedAddress,
};
use turn_rs::attributes::turn::{LifeTime, XorRelayedAddress};
use turn_rs::methods::ALLOCATE;
use turn_rs::{
    DecoderContextBuilder, HMACKey, MessageClass, MessageDecoderBuilder, MessageEncoderBuilder,
    StunAttribute, StunMessage, StunMessageBuilder,
};

pub const USERNAME: &str = "test-username";
pub const PASSWORD: &str = "test-password";
pub const REALM: &str = "example.org";
pub const NONCE: &str = "f//499k954d6OL34oL9FSTvy64sA";
pub const LIFETIME: Duration = Duration::from_secs(600);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn relayed_address() -> SocketAddr {
    "198.51.100.7:49152".parse().expect("Invalid address")
}

pub fn mapped_address() -> SocketAddr {
    "203.0.113.4:40000".parse().expect("Invalid address")
}

pub fn long_term_key() -> HMACKey {
    HMACKey::new_long_term(USERNAME, REALM, PASSWORD).expect("Could not create HMACKey")
}

pub fn client_builder() -> TurnClientBuilder {
    TurnClientBuilder::new(USERNAME, PASSWORD)
        .expect("Could not create builder")
        .with_random(StdRandom::from_seed(1234))
}

/// Decodes a message sent by the client, checking its integrity when a key
/// is provided.
pub fn decode(buffer: &[u8], key: Option<&HMACKey>) -> StunMessage {
    let mut ctx = DecoderContextBuilder::default();
    if let Some(key) = key {
        ctx = ctx.with_key(key.clone()).with_validation();
    }
    let decoder = MessageDecoderBuilder::default()
        .with_context(ctx.build())
        .build();
    let (msg, _) = decoder.decode(buffer).expect("Could not decode message");
    msg
}

pub fn encode(msg: &StunMessage) -> Vec<u8> {
    MessageEncoderBuilder::default()
        .build()
        .encode_to_vec(msg)
        .expect("Could not encode message")
}

pub fn output_packets(events: &[TurnClientEvent]) -> Vec<Vec<u8>> {
    events
        .iter()
        .filter_map(|event| match event {
            TurnClientEvent::OutputPacket(buffer) => Some(buffer.clone()),
            _ => None,
        })
        .collect()
}

/// Returns the only datagram in `events`.
pub fn single_packet(events: &[TurnClientEvent]) -> Vec<u8> {
    let mut packets = output_packets(events);
    assert_eq!(packets.len(), 1, "Expected one datagram: {:?}", events);
    packets.remove(0)
}

pub fn last_timeout(events: &[TurnClientEvent]) -> Option<Duration> {
    events.iter().rev().find_map(|event| match event {
        TurnClientEvent::TimeoutScheduled(timeout) => Some(*timeout),
        _ => None,
    })
}

/// Events other than datagrams and timers.
pub fn notifications(events: Vec<TurnClientEvent>) -> Vec<TurnClientEvent> {
    events
        .into_iter()
        .filter(|event| {
            !matches!(
                event,
                TurnClientEvent::OutputPacket(_) | TurnClientEvent::TimeoutScheduled(_)
            )
        })
        .collect()
}

/// Builds the response of the scripted server to `request`.
pub fn response(
    request: &StunMessage,
    class: MessageClass,
    attributes: Vec<StunAttribute>,
    key: Option<&HMACKey>,
) -> Vec<u8> {
    let mut builder = StunMessageBuilder::new(request.method(), class, *request.transaction_id())
        .with_attribute(Software::new("test server").expect("Software"));
    for attr in attributes {
        builder = builder.with_attribute(attr);
    }
    if let Some(key) = key {
        builder = builder.with_attribute(MessageIntegrity::new(key.clone()));
    }
    encode(&builder.with_attribute(Fingerprint::default()).build())
}

pub fn error_attribute(code: u16, reason: &str) -> StunAttribute {
    ErrorCode::from(turn_rs::ErrorCode::new(code, reason).expect("ErrorCode")).into()
}

pub fn unauthorized(request: &StunMessage, nonce: &str) -> Vec<u8> {
    response(
        request,
        MessageClass::ErrorResponse,
        vec![
            error_attribute(401, "Unauthorized"),
            Realm::new(REALM).expect("Realm").into(),
            Nonce::new(nonce).expect("Nonce").into(),
        ],
        None,
    )
}

pub fn success(request: &StunMessage, attributes: Vec<StunAttribute>) -> Vec<u8> {
    response(
        request,
        MessageClass::SuccessResponse,
        attributes,
        Some(&long_term_key()),
    )
}

pub fn allocate_success(request: &StunMessage) -> Vec<u8> {
    success(
        request,
        vec![
            XorRelayedAddress::from(relayed_address()).into(),
            XorMappedAddress::from(mapped_address()).into(),
            LifeTime::new(LIFETIME.as_secs() as u32).into(),
        ],
    )
}

/// Runs the allocation with the authentication challenge and returns the
/// client in the allocated state with no pending events.
pub fn allocated_client(builder: TurnClientBuilder, now: Instant) -> TurnClient {
    let mut client = builder.build().expect("Could not build client");
    client.allocate(now).expect("Could not allocate");

    let request = decode(&single_packet(&client.events()), None);
    assert_eq!(request.method(), ALLOCATE);
    client
        .on_buffer_recv(&unauthorized(&request, NONCE), now)
        .expect("Unauthorized response rejected");

    let request = decode(&single_packet(&client.events()), Some(&long_term_key()));
    client
        .on_buffer_recv(&allocate_success(&request), now)
        .expect("Allocate response rejected");
    assert_eq!(client.state(), ClientState::Allocated);
    client.events();
    client
}

/// Makes the scripted server grant every request in `events`.
pub fn grant_requests(client: &mut TurnClient, events: &[TurnClientEvent], now: Instant) {
    for packet in output_packets(events) {
        let request = decode(&packet, Some(&long_term_key()));
        assert_eq!(request.class(), MessageClass::Request);
        client
            .on_buffer_recv(&success(&request, Vec::new()), now)
            .expect("Response rejected");
    }
}

/// Advances the clock through every scheduled timeout until `end`,
/// collecting the events produced on the way.
pub fn advance(client: &mut TurnClient, now: &mut Instant, end: Instant) -> Vec<TurnClientEvent> {
    let mut events = Vec::new();
    while let Some(timeout) = client.next_timeout(*now) {
        let deadline = *now + timeout;
        if deadline > end {
            break;
        }
        *now = deadline;
        client.on_timeout(*now);
        events.extend(client.events());
    }
    *now = end;
    events
}
