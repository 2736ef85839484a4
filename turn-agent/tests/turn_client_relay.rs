mod common;

use common::*;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use turn_agent::{ClientState, StunAgentError, TurnClientEvent, TurnError};
use turn_rs::attributes::stun::{MessageIntegrity, UserName};
use turn_rs::attributes::turn::{ChannelNumber, Data, XorPeerAddress};
use turn_rs::methods::{CHANNEL_BIND, CREATE_PERMISSION, SEND};
use turn_rs::MessageClass;

fn peer() -> SocketAddr {
    "5.6.7.8:4000".parse().expect("Invalid address")
}

fn other_peer() -> SocketAddr {
    "192.0.2.15:5000".parse().expect("Invalid address")
}

#[test]
fn bind_channel_and_send() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);

    client
        .bind_channel_number(0x4001, peer(), now)
        .expect("Could not bind channel");
    let events = client.events();
    let request = decode(&single_packet(&events), Some(&long_term_key()));
    assert_eq!(request.method(), CHANNEL_BIND);
    assert!(request.contains::<MessageIntegrity>());
    let channel = request.get::<ChannelNumber>().expect("ChannelNumber expected");
    assert_eq!(channel.as_channel_number().expect("ChannelNumber").number(), 0x4001);
    let address = request.get::<XorPeerAddress>().expect("XorPeerAddress expected");
    assert_eq!(
        address.as_xor_peer_address().expect("XorPeerAddress").socket_address(),
        &peer()
    );

    // Not usable until the server confirms the binding
    assert_eq!(client.channel(&peer(), now), None);
    assert_eq!(
        client.send_to(peer(), b"hello", now),
        Err(TurnError::NoPermission)
    );

    client
        .on_buffer_recv(&success(&request, Vec::new()), now)
        .expect("ChannelBind response rejected");
    let events = notifications(client.events());
    assert_eq!(
        events,
        vec![TurnClientEvent::ChannelBound {
            channel: 0x4001,
            peer: peer(),
        }]
    );
    assert_eq!(client.channel(&peer(), now), Some(0x4001));
    // The binding also installs a permission
    assert!(client.has_permission(peer().ip(), now));

    client
        .send_to(peer(), b"hello", now)
        .expect("Could not send data");
    let packet = single_packet(&client.events());
    assert_eq!(packet, turn_vectors::CHANNEL_DATA.to_vec());
}

#[test]
fn send_indication_with_permission() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);

    client
        .create_permission(peer().ip(), now)
        .expect("Could not create permission");
    let events = client.events();
    let request = decode(&single_packet(&events), Some(&long_term_key()));
    assert_eq!(request.method(), CREATE_PERMISSION);
    let address = request.get::<XorPeerAddress>().expect("XorPeerAddress expected");
    assert_eq!(
        address
            .as_xor_peer_address()
            .expect("XorPeerAddress")
            .socket_address()
            .ip(),
        peer().ip()
    );

    client
        .on_buffer_recv(&success(&request, Vec::new()), now)
        .expect("CreatePermission response rejected");
    assert_eq!(
        notifications(client.events()),
        vec![TurnClientEvent::PermissionCreated(peer().ip())]
    );

    // Any port of the permitted address can be reached
    let target = SocketAddr::new(peer().ip(), 9999);
    client
        .send_to(target, b"abc", now)
        .expect("Could not send data");
    let indication = decode(&single_packet(&client.events()), None);
    assert_eq!(indication.method(), SEND);
    assert_eq!(indication.class(), MessageClass::Indication);
    assert!(!indication.contains::<MessageIntegrity>());
    assert!(!indication.contains::<UserName>());
    let address = indication
        .get::<XorPeerAddress>()
        .expect("XorPeerAddress expected");
    assert_eq!(
        address.as_xor_peer_address().expect("XorPeerAddress").socket_address(),
        &target
    );
    let data = indication.get::<Data>().expect("Data expected");
    assert_eq!(data.as_data().expect("Data").as_bytes(), b"abc");
}

#[test]
fn send_without_permission() {
    init_logging();
    let now = Instant::now();
    let mut client = client_builder().build().expect("Could not build client");

    assert_eq!(
        client.send_to(peer(), b"abc", now),
        Err(TurnError::NotReady)
    );
    assert_eq!(
        client.create_permission(peer().ip(), now),
        Err(TurnError::NotReady)
    );

    let mut client = allocated_client(client_builder(), now);
    assert_eq!(
        client.send_to(peer(), b"abc", now),
        Err(TurnError::NoPermission)
    );
    assert!(client.events().is_empty());
}

#[test]
fn queued_data_flushed_once_permitted() {
    init_logging();
    let now = Instant::now();
    let mut client = client_builder()
        .with_send_queue(1)
        .build()
        .expect("Could not build client");

    client.allocate(now).expect("Could not allocate");
    let request = decode(&single_packet(&client.events()), None);
    client
        .send_to(peer(), b"abc", now)
        .expect("Could not queue data");
    assert_eq!(
        client.send_to(peer(), b"def", now),
        Err(TurnError::QueueFull)
    );

    client
        .on_buffer_recv(&unauthorized(&request, NONCE), now)
        .expect("Unauthorized response rejected");
    let request = decode(&single_packet(&client.events()), Some(&long_term_key()));
    client
        .on_buffer_recv(&allocate_success(&request), now)
        .expect("Allocate response rejected");
    // Queued data waits for the permission
    assert!(output_packets(&client.events()).is_empty());

    client
        .create_permission(peer().ip(), now)
        .expect("Could not create permission");
    let request = decode(&single_packet(&client.events()), Some(&long_term_key()));
    client
        .on_buffer_recv(&success(&request, Vec::new()), now)
        .expect("CreatePermission response rejected");

    let events = client.events();
    assert_eq!(
        notifications(events.clone()),
        vec![TurnClientEvent::PermissionCreated(peer().ip())]
    );
    let indication = decode(&single_packet(&events), None);
    assert_eq!(indication.method(), SEND);
    let data = indication.get::<Data>().expect("Data expected");
    assert_eq!(data.as_data().expect("Data").as_bytes(), b"abc");
}

#[test]
fn data_queued_while_channel_binds() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder().with_send_queue(4), now);

    client
        .bind_channel_number(0x4001, peer(), now)
        .expect("Could not bind channel");
    let request = decode(&single_packet(&client.events()), Some(&long_term_key()));
    client
        .send_to(peer(), b"hello", now)
        .expect("Could not queue data");
    // Peers without any authorization in progress are still rejected
    assert_eq!(
        client.send_to(other_peer(), b"hello", now),
        Err(TurnError::NoPermission)
    );
    assert!(output_packets(&client.events()).is_empty());

    client
        .on_buffer_recv(&success(&request, Vec::new()), now)
        .expect("ChannelBind response rejected");
    let packet = single_packet(&client.events());
    assert_eq!(packet, turn_vectors::CHANNEL_DATA.to_vec());
}

#[test]
fn receive_data() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);

    // No permission for the peer yet
    assert!(matches!(
        client.on_buffer_recv(&turn_vectors::DATA_INDICATION, now),
        Err(StunAgentError::Discarded)
    ));
    assert!(matches!(
        client.on_buffer_recv(&turn_vectors::CHANNEL_DATA, now),
        Err(StunAgentError::Discarded)
    ));
    assert!(notifications(client.events()).is_empty());

    client
        .bind_channel_number(0x4001, peer(), now)
        .expect("Could not bind channel");
    let events = client.events();
    grant_requests(&mut client, &events, now);
    client.events();

    client
        .on_buffer_recv(&turn_vectors::DATA_INDICATION, now)
        .expect("Data indication rejected");
    client
        .on_buffer_recv(&turn_vectors::CHANNEL_DATA, now)
        .expect("ChannelData rejected");
    assert_eq!(
        notifications(client.events()),
        vec![
            TurnClientEvent::DataReceived {
                peer: peer(),
                data: b"abc".to_vec(),
            },
            TurnClientEvent::DataReceived {
                peer: peer(),
                data: b"hello".to_vec(),
            },
        ]
    );

    // Garbage is dropped without changing the client
    assert!(client.on_buffer_recv(&[0xff, 0x00, 0x01], now).is_err());
    assert!(client.on_buffer_recv(&[0x00, 0x01, 0x00], now).is_err());
    assert_eq!(client.state(), ClientState::Allocated);
}

#[test]
fn channel_binding_conflicts() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);

    client
        .bind_channel_number(0x4001, peer(), now)
        .expect("Could not bind channel");
    assert_eq!(output_packets(&client.events()).len(), 1);

    assert_eq!(
        client.bind_channel_number(0x4001, other_peer(), now),
        Err(TurnError::BindingConflict)
    );
    assert_eq!(
        client.bind_channel_number(0x4002, peer(), now),
        Err(TurnError::BindingConflict)
    );
    assert_eq!(
        client.bind_channel_number(0x3FFF, other_peer(), now),
        Err(TurnError::InvalidChannel)
    );
    assert_eq!(
        client.bind_channel_number(0x8000, other_peer(), now),
        Err(TurnError::InvalidChannel)
    );
    // Same request while the first one is in progress
    client
        .bind_channel_number(0x4001, peer(), now)
        .expect("Could not bind channel");
    assert!(output_packets(&client.events()).is_empty());
}

#[test]
fn channel_numbers_assigned() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);

    assert_eq!(client.bind_channel(peer(), now), Ok(0x4000));
    assert_eq!(client.bind_channel(other_peer(), now), Ok(0x4001));
    assert_eq!(client.bind_channel(peer(), now), Ok(0x4000));
    assert_eq!(output_packets(&client.events()).len(), 2);
}

#[test]
fn permission_rejected() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);

    client
        .create_permission(peer().ip(), now)
        .expect("Could not create permission");
    let request = decode(&single_packet(&client.events()), Some(&long_term_key()));
    let response = response(
        &request,
        MessageClass::ErrorResponse,
        vec![error_attribute(403, "Forbidden")],
        Some(&long_term_key()),
    );
    client
        .on_buffer_recv(&response, now)
        .expect("Error response rejected");

    assert_eq!(
        notifications(client.events()),
        vec![TurnClientEvent::PermissionFailed(
            peer().ip(),
            TurnError::ServerError {
                code: 403,
                reason: String::from("Forbidden"),
            }
        )]
    );
    // Peer failures do not affect the allocation
    assert_eq!(client.state(), ClientState::Allocated);
    assert!(!client.has_permission(peer().ip(), now));
}

#[test]
fn channel_bind_timeout() {
    init_logging();
    let start = Instant::now();
    let mut now = start;
    let mut client = allocated_client(client_builder(), now);

    client
        .bind_channel_number(0x4001, peer(), now)
        .expect("Could not bind channel");
    client.events();

    let events = advance(&mut client, &mut now, start + Duration::from_secs(40));
    assert_eq!(
        notifications(events),
        vec![TurnClientEvent::ChannelBindFailed {
            channel: 0x4001,
            peer: peer(),
            error: TurnError::Timeout,
        }]
    );
    assert_eq!(client.state(), ClientState::Allocated);

    // The channel number is free again
    client
        .bind_channel_number(0x4001, other_peer(), now)
        .expect("Could not bind channel");
}

fn permission_requests(events: &[TurnClientEvent]) -> usize {
    output_packets(events)
        .iter()
        .map(|packet| decode(packet, None))
        .filter(|msg| msg.method() == CREATE_PERMISSION)
        .count()
}

#[test]
fn unused_permission_expires() {
    init_logging();
    let start = Instant::now();
    let mut now = start;
    let mut client = allocated_client(client_builder(), now);
    let ip: IpAddr = peer().ip();

    client
        .create_permission(ip, now)
        .expect("Could not create permission");
    let events = client.events();
    grant_requests(&mut client, &events, now);
    client.events();

    let events = advance(&mut client, &mut now, start + Duration::from_secs(301));
    assert_eq!(permission_requests(&events), 0);
    assert!(!client.has_permission(ip, now));
    assert_eq!(
        client.send_to(peer(), b"abc", now),
        Err(TurnError::NoPermission)
    );
}

#[test]
fn permission_in_use_refreshed() {
    init_logging();
    let start = Instant::now();
    let mut now = start;
    let mut client = allocated_client(client_builder(), now);
    let ip: IpAddr = peer().ip();

    client
        .create_permission(ip, now)
        .expect("Could not create permission");
    let events = client.events();
    grant_requests(&mut client, &events, now);
    client.events();

    now += Duration::from_secs(10);
    client
        .send_to(peer(), b"abc", now)
        .expect("Could not send data");
    client.events();

    // Renewed one minute before it expires
    let events = advance(&mut client, &mut now, start + Duration::from_secs(240));
    assert_eq!(permission_requests(&events), 1);
    let request = output_packets(&events)
        .iter()
        .map(|packet| decode(packet, Some(&long_term_key())))
        .find(|msg| msg.method() == CREATE_PERMISSION)
        .expect("CreatePermission expected");
    client
        .on_buffer_recv(&success(&request, Vec::new()), now)
        .expect("CreatePermission response rejected");
    assert!(client.has_permission(ip, start + Duration::from_secs(500)));
}

#[test]
fn indication_with_unknown_required_attribute() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);

    client
        .create_permission(peer().ip(), now)
        .expect("Could not create permission");
    let events = client.events();
    grant_requests(&mut client, &events, now);
    client.events();

    // Same Data indication, followed by attribute 0x0030 which the client
    // does not understand and can not ignore
    let mut buffer = turn_vectors::DATA_INDICATION.to_vec();
    buffer.extend_from_slice(&[0x00, 0x30, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04]);
    buffer[3] += 8;

    assert!(matches!(
        client.on_buffer_recv(&buffer, now),
        Err(StunAgentError::Discarded)
    ));
    assert!(notifications(client.events()).is_empty());
    assert_eq!(client.state(), ClientState::Allocated);

    // Optional unknown attributes are ignored
    let mut buffer = turn_vectors::DATA_INDICATION.to_vec();
    buffer.extend_from_slice(&[0x80, 0x30, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04]);
    buffer[3] += 8;
    client
        .on_buffer_recv(&buffer, now)
        .expect("Data indication rejected");
    assert_eq!(
        notifications(client.events()),
        vec![TurnClientEvent::DataReceived {
            peer: peer(),
            data: b"abc".to_vec(),
        }]
    );
}

fn channel_bind_requests(events: &[TurnClientEvent]) -> Vec<turn_rs::StunMessage> {
    output_packets(events)
        .iter()
        .map(|packet| decode(packet, None))
        .filter(|msg| msg.method() == CHANNEL_BIND)
        .collect()
}

fn bound_client(now: Instant) -> turn_agent::TurnClient {
    let mut client = allocated_client(client_builder(), now);
    client
        .bind_channel_number(0x4001, peer(), now)
        .expect("Could not bind channel");
    let events = client.events();
    grant_requests(&mut client, &events, now);
    client.events();
    assert_eq!(client.channel(&peer(), now), Some(0x4001));
    client
}

#[test]
fn channel_refresh_rejected() {
    init_logging();
    let start = Instant::now();
    let mut now = start;
    let mut client = bound_client(now);

    // Nothing is renewed before five minutes
    let events = advance(&mut client, &mut now, start + Duration::from_secs(299));
    assert!(channel_bind_requests(&events).is_empty());

    let events = advance(&mut client, &mut now, start + Duration::from_secs(301));
    let requests = channel_bind_requests(&events);
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    let channel = request.get::<ChannelNumber>().expect("ChannelNumber expected");
    assert_eq!(channel.as_channel_number().expect("ChannelNumber").number(), 0x4001);

    let response = response(
        request,
        MessageClass::ErrorResponse,
        vec![error_attribute(400, "Bad Request")],
        Some(&long_term_key()),
    );
    client
        .on_buffer_recv(&response, now)
        .expect("Error response rejected");
    assert_eq!(
        notifications(client.events()),
        vec![TurnClientEvent::ChannelBindFailed {
            channel: 0x4001,
            peer: peer(),
            error: TurnError::ServerError {
                code: 400,
                reason: String::from("Bad Request"),
            },
        }]
    );

    assert_eq!(client.channel(&peer(), now), None);
    assert_eq!(
        client.send_to(peer(), b"hello", now),
        Err(TurnError::NoPermission)
    );
    assert!(matches!(
        client.on_buffer_recv(&turn_vectors::CHANNEL_DATA, now),
        Err(StunAgentError::Discarded)
    ));
}

#[test]
fn channel_refresh_timeout() {
    init_logging();
    let start = Instant::now();
    let mut now = start;
    let mut client = bound_client(now);

    let events = advance(&mut client, &mut now, start + Duration::from_secs(320));
    assert_eq!(channel_bind_requests(&events).len(), 1);

    // Still bound while the renewal is in progress
    assert_eq!(client.channel(&peer(), now), Some(0x4001));
    client
        .send_to(peer(), b"hello", now)
        .expect("Could not send data");
    assert_eq!(
        single_packet(&client.events()),
        turn_vectors::CHANNEL_DATA.to_vec()
    );

    let events = advance(&mut client, &mut now, start + Duration::from_secs(341));
    assert!(notifications(events).contains(&TurnClientEvent::ChannelBindFailed {
        channel: 0x4001,
        peer: peer(),
        error: TurnError::Timeout,
    }));
    assert_eq!(client.channel(&peer(), now), None);
    assert!(matches!(
        client.on_buffer_recv(&turn_vectors::CHANNEL_DATA, now),
        Err(StunAgentError::Discarded)
    ));
}
