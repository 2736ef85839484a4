mod common;

use common::*;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use turn_agent::{ClientState, StunAgentError, TurnClientEvent, TurnError};
use turn_rs::attributes::stun::MessageIntegrity;
use turn_rs::attributes::turn::LifeTime;
use turn_rs::methods::REFRESH;

#[test]
fn close_before_allocation() {
    init_logging();
    let now = Instant::now();
    let mut client = client_builder().build().expect("Could not build client");

    client.close(now);
    assert_eq!(
        client.events(),
        vec![TurnClientEvent::StateChanged(ClientState::Terminated)]
    );
    assert_eq!(client.allocate(now), Err(TurnError::InvalidState));
}

#[test]
fn close_while_refreshing() {
    init_logging();
    let start = Instant::now();
    let mut now = start;
    let mut client = allocated_client(client_builder(), now);

    let events = advance(&mut client, &mut now, start + LIFETIME / 2);
    let pending = decode(&single_packet(&events), Some(&long_term_key()));
    assert_eq!(pending.method(), REFRESH);
    assert_eq!(client.state(), ClientState::Refreshing);

    client.close(now);
    let events = client.events();
    assert_eq!(events.len(), 2);
    let TurnClientEvent::OutputPacket(packet) = &events[0] else {
        panic!("Expected OutputPacket event");
    };
    assert_eq!(
        events[1],
        TurnClientEvent::StateChanged(ClientState::Terminated)
    );

    let request = decode(packet, Some(&long_term_key()));
    assert_eq!(request.method(), REFRESH);
    assert_ne!(request.transaction_id(), pending.transaction_id());
    assert!(request.contains::<MessageIntegrity>());
    let lifetime = request.get::<LifeTime>().expect("LifeTime expected");
    assert_eq!(lifetime.as_life_time().expect("LifeTime").as_u32(), 0);

    // The cancelled refresh is never reported
    assert_eq!(client.next_timeout(now), None);
    assert!(matches!(
        client.on_buffer_recv(&success(&pending, Vec::new()), now),
        Err(StunAgentError::Discarded)
    ));
    client.on_timeout(now + Duration::from_secs(60));
    assert!(client.events().is_empty());
    assert_eq!(client.state(), ClientState::Terminated);
    assert_eq!(client.relayed_address(), None);
}

#[test]
fn operations_after_close() {
    init_logging();
    let now = Instant::now();
    let mut client = allocated_client(client_builder(), now);
    let peer: SocketAddr = "5.6.7.8:4000".parse().expect("Invalid address");

    client.close(now);
    client.events();

    assert_eq!(
        client.send_to(peer, b"abc", now),
        Err(TurnError::InvalidState)
    );
    assert_eq!(
        client.create_permission(peer.ip(), now),
        Err(TurnError::InvalidState)
    );
    assert_eq!(
        client.bind_channel(peer, now),
        Err(TurnError::InvalidState)
    );

    // Closing twice does nothing
    client.close(now);
    assert!(client.events().is_empty());
}

#[test]
fn close_after_error() {
    init_logging();
    let now = Instant::now();
    let mut client = client_builder().build().expect("Could not build client");
    client.allocate(now).expect("Could not allocate");

    let request = decode(&single_packet(&client.events()), None);
    let response = response(
        &request,
        turn_rs::MessageClass::ErrorResponse,
        vec![error_attribute(437, "Allocation Mismatch")],
        None,
    );
    client
        .on_buffer_recv(&response, now)
        .expect("Error response rejected");
    assert_eq!(client.state(), ClientState::Error);
    client.events();

    // No allocation to release
    client.close(now);
    assert_eq!(
        client.events(),
        vec![TurnClientEvent::StateChanged(ClientState::Terminated)]
    );
}
