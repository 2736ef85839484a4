//! Tokio driver for the sans I/O [`TurnClient`].
//!
//! [`TurnClientAgent`] spawns an actor task that owns the client, the
//! [`Transport`] and the [`TurnObserver`]. The agent is a cheap handle that
//! talks to the actor over a channel, so it can be cloned and shared
//! between tasks. Every protocol event is processed by the actor, one at a
//! time.

use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use turn_agent::{ClientState, TurnClient, TurnClientBuilder, TurnClientEvent, TurnError};

mod transport;

pub use crate::transport::{TlsSession, Transport, UdpTransport};

// Enough for any datagram on the usual networks
const RECV_BUFFER_SIZE: usize = 65535;
const COMMAND_CHANNEL_SIZE: usize = 32;

/// Notifications of the TURN client. They are called from the actor task,
/// so they must not block.
pub trait TurnObserver: Send + 'static {
    /// The client moved to `state`
    fn on_state_change(&self, state: ClientState);
    /// A peer sent data through the relay
    fn on_data_received(&self, peer: SocketAddr, data: &[u8]);
    /// The client failed, it will not recover
    fn on_error(&self, error: &TurnError);
    /// A permission was installed or renewed
    fn on_permission_created(&self, _peer: IpAddr) {}
    /// A channel was bound or its binding renewed
    fn on_channel_bound(&self, _channel: u16, _peer: SocketAddr) {}
}

/// Errors returned by [`TurnClientAgent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The actor task is gone
    ClientDropped,
    /// The TURN client rejected the operation or the exchange failed
    Turn(TurnError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientError::ClientDropped => write!(f, "client dropped"),
            ClientError::Turn(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ClientError {}

impl From<TurnError> for ClientError {
    fn from(e: TurnError) -> Self {
        ClientError::Turn(e)
    }
}

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

enum TurnClientCommand {
    Allocate(Reply<SocketAddr>),
    SendTo {
        peer: SocketAddr,
        data: Vec<u8>,
        tx: Reply<()>,
    },
    CreatePermission {
        peer: IpAddr,
        tx: Reply<()>,
    },
    BindChannel {
        peer: SocketAddr,
        tx: Reply<u16>,
    },
    Close(Reply<()>),
}

fn reply<T>(tx: Reply<T>, result: Result<T, ClientError>) {
    if tx.send(result).is_err() {
        debug!("Caller went away before the reply");
    }
}

// Callers waiting for an exchange to complete
#[derive(Default)]
struct Waiters {
    allocate: Option<Reply<SocketAddr>>,
    permissions: HashMap<IpAddr, Vec<Reply<()>>>,
    channels: HashMap<u16, Vec<Reply<u16>>>,
}

impl Waiters {
    fn fail_all(&mut self, error: &TurnError) {
        if let Some(tx) = self.allocate.take() {
            reply(tx, Err(ClientError::Turn(error.clone())));
        }
        for tx in self.permissions.drain().flat_map(|(_, txs)| txs) {
            reply(tx, Err(ClientError::Turn(error.clone())));
        }
        for tx in self.channels.drain().flat_map(|(_, txs)| txs) {
            reply(tx, Err(ClientError::Turn(error.clone())));
        }
    }
}

struct TurnClientActor<T: Transport, O: TurnObserver> {
    client: TurnClient,
    transport: T,
    observer: O,
    rx: mpsc::Receiver<TurnClientCommand>,
    deadline: Option<Instant>,
    waiters: Waiters,
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<T: Transport, O: TurnObserver> TurnClientActor<T, O> {
    fn new(
        client: TurnClient,
        transport: T,
        observer: O,
        rx: mpsc::Receiver<TurnClientCommand>,
    ) -> Self {
        Self {
            client,
            transport,
            observer,
            rx,
            deadline: None,
            waiters: Waiters::default(),
        }
    }

    fn now() -> std::time::Instant {
        Instant::now().into_std()
    }

    async fn send_packet(&mut self, buffer: &[u8]) {
        if self.client.state() == ClientState::Error {
            trace!("Client failed, datagram not sent");
            return;
        }
        if let Err(e) = self.transport.send(buffer).await {
            warn!("Could not send datagram: {}", e);
            self.client.on_transport_error(e.to_string());
        }
    }

    fn on_state_change(&mut self, state: ClientState) {
        self.observer.on_state_change(state);
        match state {
            ClientState::Allocated => {
                if let Some(tx) = self.waiters.allocate.take() {
                    let result = self
                        .client
                        .relayed_address()
                        .ok_or(ClientError::Turn(TurnError::InvalidState));
                    reply(tx, result);
                }
            }
            ClientState::Terminated => self.waiters.fail_all(&TurnError::InvalidState),
            _ => {}
        }
    }

    async fn process_events(&mut self) {
        loop {
            let events = self.client.events();
            if events.is_empty() {
                break;
            }

            for event in events {
                match event {
                    TurnClientEvent::OutputPacket(buffer) => self.send_packet(&buffer).await,
                    TurnClientEvent::TimeoutScheduled(timeout) => {
                        trace!("Timeout scheduled in {:?}", timeout)
                    }
                    TurnClientEvent::StateChanged(state) => self.on_state_change(state),
                    TurnClientEvent::DataReceived { peer, data } => {
                        self.observer.on_data_received(peer, &data)
                    }
                    TurnClientEvent::PermissionCreated(peer) => {
                        self.observer.on_permission_created(peer);
                        for tx in self.waiters.permissions.remove(&peer).unwrap_or_default() {
                            reply(tx, Ok(()));
                        }
                    }
                    TurnClientEvent::PermissionFailed(peer, error) => {
                        for tx in self.waiters.permissions.remove(&peer).unwrap_or_default() {
                            reply(tx, Err(ClientError::Turn(error.clone())));
                        }
                    }
                    TurnClientEvent::ChannelBound { channel, peer } => {
                        self.observer.on_channel_bound(channel, peer);
                        for tx in self.waiters.channels.remove(&channel).unwrap_or_default() {
                            reply(tx, Ok(channel));
                        }
                    }
                    TurnClientEvent::ChannelBindFailed { channel, error, .. } => {
                        for tx in self.waiters.channels.remove(&channel).unwrap_or_default() {
                            reply(tx, Err(ClientError::Turn(error.clone())));
                        }
                    }
                    TurnClientEvent::Error(error) => {
                        self.observer.on_error(&error);
                        self.waiters.fail_all(&error);
                    }
                }
            }
        }

        // Always recomputed, rejected operations produce no events
        let now = Instant::now();
        self.deadline = self
            .client
            .next_timeout(now.into_std())
            .map(|timeout| now + timeout);
    }

    fn process_command(&mut self, command: TurnClientCommand) {
        let now = Self::now();
        match command {
            TurnClientCommand::Allocate(tx) => match self.client.allocate(now) {
                Ok(()) => self.waiters.allocate = Some(tx),
                Err(e) => reply(tx, Err(e.into())),
            },
            TurnClientCommand::SendTo { peer, data, tx } => {
                let result = self.client.send_to(peer, &data, now);
                reply(tx, result.map_err(ClientError::from));
            }
            TurnClientCommand::CreatePermission { peer, tx } => {
                match self.client.create_permission(peer, now) {
                    Ok(()) => self.waiters.permissions.entry(peer).or_default().push(tx),
                    Err(e) => reply(tx, Err(e.into())),
                }
            }
            TurnClientCommand::BindChannel { peer, tx } => {
                if let Some(channel) = self.client.channel(&peer, now) {
                    reply(tx, Ok(channel));
                    return;
                }
                match self.client.bind_channel(peer, now) {
                    Ok(channel) => self.waiters.channels.entry(channel).or_default().push(tx),
                    Err(e) => reply(tx, Err(e.into())),
                }
            }
            TurnClientCommand::Close(tx) => {
                self.client.close(now);
                reply(tx, Ok(()));
            }
        }
    }

    async fn main_loop(&mut self) {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let deadline = self.deadline;
            let receiving = self.client.state() != ClientState::Error;

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.process_command(command),
                    None => {
                        debug!("Every agent handle dropped, closing client");
                        self.client.close(Self::now());
                    }
                },
                result = self.transport.recv(&mut buffer), if receiving => match result {
                    Ok(size) => {
                        if let Err(e) = self.client.on_buffer_recv(&buffer[..size], Self::now()) {
                            debug!("Datagram of {} bytes dropped: {}", size, e);
                        }
                    }
                    Err(e) => {
                        warn!("Could not receive datagram: {}", e);
                        self.client.on_transport_error(e.to_string());
                    }
                },
                _ = wait_deadline(deadline) => self.client.on_timeout(Self::now()),
            }

            self.process_events().await;
            if self.client.state() == ClientState::Terminated {
                break;
            }
        }

        info!("TURN client actor finished");
    }
}

fn spawn_turn_client_actor<T: Transport, O: TurnObserver>(
    client: TurnClient,
    transport: T,
    observer: O,
    rx: mpsc::Receiver<TurnClientCommand>,
) -> JoinHandle<()> {
    let mut actor = TurnClientActor::new(client, transport, observer, rx);

    tokio::spawn(async move {
        actor.main_loop().await;
    })
}

/// Handle to a TURN client running in its own task.
///
/// When every handle is dropped the allocation is released and the task
/// ends.
#[derive(Clone)]
pub struct TurnClientAgent {
    handle: Arc<JoinHandle<()>>,
    tx: mpsc::Sender<TurnClientCommand>,
    session: Option<TlsSession>,
}

impl TurnClientAgent {
    /// Builds the client and spawns the actor task. Requests are not
    /// retransmitted when the transport reports itself reliable. Must be
    /// called from a tokio runtime.
    pub fn new<T: Transport, O: TurnObserver>(
        builder: TurnClientBuilder,
        transport: T,
        observer: O,
    ) -> Result<Self, ClientError> {
        let builder = if transport.is_reliable() {
            debug!("Reliable transport, requests are sent once");
            builder.reliable()
        } else {
            builder
        };
        let client = builder.build()?;
        let session = transport.session();

        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let handle = spawn_turn_client_actor(client, transport, observer, rx);
        Ok(Self {
            handle: Arc::new(handle),
            tx,
            session,
        })
    }

    /// Session exported by a TLS transport, to resume it when connecting
    /// again.
    pub fn tls_session(&self) -> Option<&TlsSession> {
        self.session.as_ref()
    }

    async fn command<R>(
        &self,
        command: impl FnOnce(Reply<R>) -> TurnClientCommand,
    ) -> Result<R, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(command(tx))
            .await
            .map_err(|_| ClientError::ClientDropped)?;
        rx.await.map_err(|_| ClientError::ClientDropped)?
    }

    /// Creates the allocation and returns the relayed transport address.
    pub async fn allocate(&self) -> Result<SocketAddr, ClientError> {
        self.command(TurnClientCommand::Allocate).await
    }

    /// Sends `data` to `peer` through the relay. Returns once the datagram
    /// is handed to the transport, or queued.
    pub async fn send_to(&self, peer: SocketAddr, data: &[u8]) -> Result<(), ClientError> {
        let data = data.to_vec();
        self.command(|tx| TurnClientCommand::SendTo { peer, data, tx })
            .await
    }

    /// Installs a permission for `peer` and waits for the server to
    /// confirm it.
    pub async fn create_permission(&self, peer: IpAddr) -> Result<(), ClientError> {
        self.command(|tx| TurnClientCommand::CreatePermission { peer, tx })
            .await
    }

    /// Binds a channel to `peer` and returns its number once the server
    /// confirms it.
    pub async fn bind_channel(&self, peer: SocketAddr) -> Result<u16, ClientError> {
        self.command(|tx| TurnClientCommand::BindChannel { peer, tx })
            .await
    }

    /// Releases the allocation and stops the client.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.command(TurnClientCommand::Close).await
    }

    /// Returns true once the actor task has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_client_error() {
        assert_eq!(ClientError::ClientDropped.to_string(), "client dropped");
        assert_eq!(
            ClientError::from(TurnError::NotReady).to_string(),
            "allocation not ready"
        );
    }

    #[tokio::test]
    async fn wait_without_deadline() {
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(10), wait_deadline(None)).await;
        assert!(result.is_err());
        wait_deadline(Some(Instant::now())).await;
    }
}
