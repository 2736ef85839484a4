use crate::error::{StunAgentError, TurnError};
use crate::events::TurnClientEvent;
use crate::lt_cred_mech::{LongTermCredentialClient, RetryCause};
use crate::random::{RandomSource, StdRandom};
use crate::rtt::RttConfig;
use crate::timeout::TimeoutQueue;
use crate::transaction::{TransactionEngine, TransactionError, TransactionEvent};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use turn_rs::attributes::stun::{Fingerprint, Software, UserName, XorMappedAddress};
use turn_rs::attributes::turn::{
    ChannelNumber, Data, DontFragment, LifeTime, RequestedTransport, XorPeerAddress,
    XorRelayedAddress,
};
use turn_rs::methods::{ALLOCATE, CHANNEL_BIND, CREATE_PERMISSION, DATA, REFRESH, SEND};
use turn_rs::{
    demultiplex, ChannelData, MessageClass, MessageDecoder, MessageEncoder, MessageMethod,
    PacketKind, StunAttribute, StunError, StunMessage, StunMessageBuilder, TransactionId,
    MAX_CHANNEL_NUMBER, MIN_CHANNEL_NUMBER,
};

/// Lifetime of a permission installed on the server
pub const PERMISSION_LIFETIME: Duration = Duration::from_secs(300);
/// Permissions in use are renewed this long before they expire
pub const PERMISSION_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Lifetime of a channel binding installed on the server
pub const CHANNEL_LIFETIME: Duration = Duration::from_secs(600);
/// Channel bindings are renewed after this time
pub const CHANNEL_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
/// Default allocation lifetime used when the server does not send one
pub const DEFAULT_ALLOCATION_LIFETIME: Duration = Duration::from_secs(600);
/// Default number of consecutive Allocate or Refresh timeouts tolerated
pub const DEFAULT_MAX_EXCHANGE_FAILURES: u32 = 3;

const EXCHANGE_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// State of the TURN client. An allocation exists only in the
/// [`ClientState::Allocated`] and [`ClientState::Refreshing`] states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Nothing was requested yet
    None,
    /// First Allocate request sent, without credentials
    Allocating,
    /// Allocate request sent again with credentials
    Authenticating,
    /// The allocation is ready
    Allocated,
    /// A Refresh request is in progress
    Refreshing,
    /// The client failed, it can only be closed
    Error,
    /// The client was closed, nothing else happens
    Terminated,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ClientState::None => "none",
            ClientState::Allocating => "allocating",
            ClientState::Authenticating => "authenticating",
            ClientState::Allocated => "allocated",
            ClientState::Refreshing => "refreshing",
            ClientState::Error => "error",
            ClientState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

struct TurnClientParameters {
    user_name: UserName,
    password: String,
    software: Option<Software>,
    lifetime: Option<u32>,
    rtt: RttConfig,
    reliable: bool,
    max_exchange_failures: u32,
    send_queue_capacity: usize,
    fingerprint: bool,
    dont_fragment: bool,
    random: Option<Box<dyn RandomSource + Send>>,
}

/// Builds a [`TurnClient`].
/// # Examples
///```rust
/// # use turn_agent::client::{ClientState, TurnClientBuilder};
/// # use turn_agent::random::StdRandom;
/// # use std::error::Error;
/// # use std::time::Duration;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let client = TurnClientBuilder::new("user", "pass")?
///     .with_lifetime(Duration::from_secs(1200))
///     .with_send_queue(16)
///     .with_random(StdRandom::from_seed(1))
///     .build()?;
/// assert_eq!(client.state(), ClientState::None);
/// #   Ok(())
/// # }
///```
pub struct TurnClientBuilder(TurnClientParameters);

impl TurnClientBuilder {
    /// Creates a builder with the long-term credentials of the user.
    pub fn new<U, P>(user_name: U, password: P) -> Result<TurnClientBuilder, StunError>
    where
        U: AsRef<str>,
        P: AsRef<str>,
    {
        Ok(Self(TurnClientParameters {
            user_name: UserName::new(user_name.as_ref())?,
            password: password.as_ref().to_string(),
            software: None,
            lifetime: None,
            rtt: RttConfig::default(),
            reliable: false,
            max_exchange_failures: DEFAULT_MAX_EXCHANGE_FAILURES,
            send_queue_capacity: 0,
            fingerprint: true,
            dont_fragment: false,
            random: None,
        }))
    }

    /// SOFTWARE attribute added to every request.
    pub fn with_software(mut self, software: Software) -> Self {
        self.0.software = Some(software);
        self
    }

    /// Lifetime requested in Allocate and Refresh requests. The server
    /// picks its default when none is requested.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        let seconds = u32::try_from(lifetime.as_secs()).unwrap_or(u32::MAX);
        self.0.lifetime = Some(seconds);
        self
    }

    /// Retransmission parameters.
    pub fn with_rtt(mut self, rtt: RttConfig) -> Self {
        self.0.rtt = rtt;
        self
    }

    /// The transport is reliable (TCP or TLS), requests are not retransmitted.
    pub fn reliable(mut self) -> Self {
        self.0.reliable = true;
        self
    }

    /// Consecutive Allocate or Refresh timeouts tolerated before failing.
    pub fn with_max_exchange_failures(mut self, failures: u32) -> Self {
        self.0.max_exchange_failures = failures;
        self
    }

    /// Capacity of the queue holding data sent before the peer is
    /// authorized. With zero capacity such data is rejected.
    pub fn with_send_queue(mut self, capacity: usize) -> Self {
        self.0.send_queue_capacity = capacity;
        self
    }

    /// Do not add FINGERPRINT to outgoing messages.
    pub fn without_fingerprint(mut self) -> Self {
        self.0.fingerprint = false;
        self
    }

    /// Add DONT-FRAGMENT to Allocate requests.
    pub fn with_dont_fragment(mut self) -> Self {
        self.0.dont_fragment = true;
        self
    }

    /// Random source used for transaction ids. Defaults to a generator
    /// seeded from the operating system.
    pub fn with_random<R>(mut self, random: R) -> Self
    where
        R: RandomSource + Send + 'static,
    {
        self.0.random = Some(Box::new(random));
        self
    }

    /// Creates the client.
    pub fn build(self) -> Result<TurnClient, TurnError> {
        self.0.rtt.validate().map_err(TurnError::InvalidConfig)?;
        if self.0.max_exchange_failures == 0 {
            return Err(TurnError::InvalidConfig(String::from(
                "Max. exchange failures must be greater than zero",
            )));
        }
        Ok(TurnClient::new(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    Allocate,
    Refresh,
    CreatePermission(IpAddr),
    ChannelBind(u16, SocketAddr),
}

#[derive(Debug, Clone, Copy)]
struct PendingExchange {
    exchange: Exchange,
    auth_retried: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientTimer {
    RetryAllocate,
    AllocationRefresh,
    AllocationExpired,
    PermissionRefresh(IpAddr),
    PermissionExpired(IpAddr),
    ChannelRefresh(u16),
}

#[derive(Debug, Clone)]
struct Allocation {
    relayed: SocketAddr,
    mapped: Option<SocketAddr>,
    lifetime: Duration,
}

#[derive(Debug, Default)]
struct Permission {
    // None until the server confirms the permission
    expires: Option<Instant>,
    pending: bool,
    in_use: bool,
}

impl Permission {
    fn is_valid(&self, instant: Instant) -> bool {
        self.expires.is_some_and(|expires| expires > instant)
    }
}

#[derive(Debug)]
struct ChannelBinding {
    peer: SocketAddr,
    expires: Option<Instant>,
    pending: bool,
}

impl ChannelBinding {
    fn is_valid(&self, instant: Instant) -> bool {
        self.expires.is_some_and(|expires| expires > instant)
    }
}

/// Sans I/O TURN client. It owns the allocation, the permissions and the
/// channel bindings of one session, and produces [`TurnClientEvent`]s the
/// caller must act on: datagrams to send, timers to arm and notifications.
///
/// The caller feeds the client with received datagrams through
/// [`TurnClient::on_buffer_recv`] and with expired timers through
/// [`TurnClient::on_timeout`]. Every method takes the current instant, the
/// client never reads the clock.
pub struct TurnClient {
    state: ClientState,
    credentials: LongTermCredentialClient,
    software: Option<Software>,
    requested_lifetime: Option<u32>,
    fingerprint: bool,
    dont_fragment: bool,
    max_exchange_failures: u32,
    queue_capacity: usize,
    random: Box<dyn RandomSource + Send>,
    encoder: MessageEncoder,
    decoder: MessageDecoder,
    transactions: TransactionEngine,
    pending: HashMap<TransactionId, PendingExchange>,
    timers: TimeoutQueue<ClientTimer>,
    allocation: Option<Allocation>,
    permissions: HashMap<IpAddr, Permission>,
    channels: HashMap<u16, ChannelBinding>,
    peer_channels: HashMap<SocketAddr, u16>,
    next_channel: u16,
    queue: VecDeque<(SocketAddr, Vec<u8>)>,
    exchange_failures: u32,
    events: Vec<TurnClientEvent>,
}

impl TurnClient {
    fn new(params: TurnClientParameters) -> Self {
        let random = match params.random {
            Some(random) => random,
            None => Box::new(StdRandom::from_os_rng()),
        };

        Self {
            state: ClientState::None,
            credentials: LongTermCredentialClient::new(params.user_name, params.password),
            software: params.software,
            requested_lifetime: params.lifetime,
            fingerprint: params.fingerprint,
            dont_fragment: params.dont_fragment,
            max_exchange_failures: params.max_exchange_failures,
            queue_capacity: params.send_queue_capacity,
            random,
            encoder: Default::default(),
            decoder: Default::default(),
            transactions: TransactionEngine::new(params.rtt, params.reliable),
            pending: HashMap::new(),
            timers: TimeoutQueue::default(),
            allocation: None,
            permissions: HashMap::new(),
            channels: HashMap::new(),
            peer_channels: HashMap::new(),
            next_channel: MIN_CHANNEL_NUMBER,
            queue: VecDeque::new(),
            exchange_failures: 0,
            events: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Relayed transport address, once allocated
    pub fn relayed_address(&self) -> Option<SocketAddr> {
        self.allocation.as_ref().map(|allocation| allocation.relayed)
    }

    /// Server reflexive address reported in the Allocate response
    pub fn mapped_address(&self) -> Option<SocketAddr> {
        self.allocation.as_ref().and_then(|allocation| allocation.mapped)
    }

    /// Lifetime granted by the server for the allocation
    pub fn lifetime(&self) -> Option<Duration> {
        self.allocation.as_ref().map(|allocation| allocation.lifetime)
    }

    /// Returns true if a permission for `peer` is installed and not expired.
    pub fn has_permission(&self, peer: IpAddr, instant: Instant) -> bool {
        self.permissions
            .get(&peer)
            .is_some_and(|permission| permission.is_valid(instant))
    }

    /// Channel bound to `peer`, if the binding is installed and not expired.
    pub fn channel(&self, peer: &SocketAddr, instant: Instant) -> Option<u16> {
        let channel = self.peer_channels.get(peer)?;
        self.channels
            .get(channel)
            .filter(|binding| binding.is_valid(instant))
            .map(|_| *channel)
    }

    /// Time left until [`TurnClient::on_timeout`] must be called.
    pub fn next_timeout(&self, instant: Instant) -> Option<Duration> {
        let deadline = match (self.transactions.next_deadline(), self.timers.next_deadline()) {
            (Some(a), Some(b)) => Some(std::cmp::min(a, b)),
            (a, b) => a.or(b),
        };
        deadline.map(|deadline| deadline.saturating_duration_since(instant))
    }

    /// Drains the events produced so far.
    pub fn events(&mut self) -> Vec<TurnClientEvent> {
        self.events.drain(..).collect()
    }

    fn change_state(&mut self, state: ClientState) {
        if self.state != state {
            info!("Changing TURN client state from {} to {}", self.state, state);
            self.state = state;
            self.events.push(TurnClientEvent::StateChanged(state));
        }
    }

    fn is_allocated(&self) -> bool {
        matches!(self.state, ClientState::Allocated | ClientState::Refreshing)
    }

    fn check_allocated(&self) -> Result<(), TurnError> {
        match self.state {
            ClientState::Allocated | ClientState::Refreshing => Ok(()),
            ClientState::Error | ClientState::Terminated => Err(TurnError::InvalidState),
            _ => Err(TurnError::NotReady),
        }
    }

    fn add_timeout_event(&mut self, instant: Instant) {
        if let Some(timeout) = self.next_timeout(instant) {
            self.events.push(TurnClientEvent::TimeoutScheduled(timeout));
        }
    }

    fn new_transaction_id(&mut self) -> TransactionId {
        loop {
            let transaction_id = self.random.transaction_id();
            if !self.transactions.contains(&transaction_id) {
                return transaction_id;
            }
        }
    }

    fn create_message(
        &self,
        method: MessageMethod,
        class: MessageClass,
        transaction_id: TransactionId,
        attributes: Vec<StunAttribute>,
    ) -> StunMessage {
        let mut builder = StunMessageBuilder::new(method, class, transaction_id);
        for attr in attributes {
            builder = builder.with_attribute(attr);
        }

        // Indications can not be authenticated
        if class == MessageClass::Request {
            if let Some(software) = &self.software {
                builder = builder.with_attribute(software.clone());
            }
            for attr in self.credentials.request_attributes() {
                builder = builder.with_attribute(attr);
            }
        }

        if self.fingerprint {
            builder = builder.with_attribute(Fingerprint::default());
        }

        builder.build()
    }

    fn send_request(
        &mut self,
        method: MessageMethod,
        attributes: Vec<StunAttribute>,
        exchange: Exchange,
        auth_retried: bool,
        instant: Instant,
    ) -> Result<TransactionId, TurnError> {
        let transaction_id = self.new_transaction_id();
        let msg = self.create_message(method, MessageClass::Request, transaction_id, attributes);
        let buffer = self.encoder.encode_to_vec(&msg)?;

        let key = self.credentials.key().cloned();
        if let Err(e) = self
            .transactions
            .start(transaction_id, method, buffer.clone(), key, instant)
        {
            warn!("Can not start transaction: {}", e);
            return Err(TurnError::InvalidState);
        }

        debug!("[{}] {} request sent", transaction_id, method);
        self.pending.insert(
            transaction_id,
            PendingExchange {
                exchange,
                auth_retried,
            },
        );
        self.events.push(TurnClientEvent::OutputPacket(buffer));
        Ok(transaction_id)
    }

    fn lifetime_attributes(&self, attributes: &mut Vec<StunAttribute>) {
        if let Some(lifetime) = self.requested_lifetime {
            attributes.push(LifeTime::new(lifetime).into());
        }
    }

    fn send_allocate(&mut self, auth_retried: bool, instant: Instant) -> Result<(), TurnError> {
        let mut attributes = vec![RequestedTransport::udp().into()];
        self.lifetime_attributes(&mut attributes);
        if self.dont_fragment {
            attributes.push(DontFragment.into());
        }
        self.send_request(
            ALLOCATE,
            attributes,
            Exchange::Allocate,
            auth_retried,
            instant,
        )?;
        Ok(())
    }

    fn send_refresh(&mut self, auth_retried: bool, instant: Instant) -> Result<(), TurnError> {
        let mut attributes = Vec::new();
        self.lifetime_attributes(&mut attributes);
        self.send_request(
            REFRESH,
            attributes,
            Exchange::Refresh,
            auth_retried,
            instant,
        )?;
        Ok(())
    }

    fn send_create_permission(
        &mut self,
        peer: IpAddr,
        auth_retried: bool,
        instant: Instant,
    ) -> Result<(), TurnError> {
        let attributes = vec![XorPeerAddress::from(SocketAddr::new(peer, 0)).into()];
        self.send_request(
            CREATE_PERMISSION,
            attributes,
            Exchange::CreatePermission(peer),
            auth_retried,
            instant,
        )?;
        self.permissions.entry(peer).or_default().pending = true;
        Ok(())
    }

    fn send_channel_bind(
        &mut self,
        channel: u16,
        peer: SocketAddr,
        auth_retried: bool,
        instant: Instant,
    ) -> Result<(), TurnError> {
        let attributes = vec![
            ChannelNumber::new(channel).into(),
            XorPeerAddress::from(peer).into(),
        ];
        self.send_request(
            CHANNEL_BIND,
            attributes,
            Exchange::ChannelBind(channel, peer),
            auth_retried,
            instant,
        )?;

        let binding = self.channels.entry(channel).or_insert(ChannelBinding {
            peer,
            expires: None,
            pending: false,
        });
        binding.pending = true;
        self.peer_channels.insert(peer, channel);
        Ok(())
    }

    /// Starts the allocation. Only allowed from [`ClientState::None`].
    pub fn allocate(&mut self, instant: Instant) -> Result<(), TurnError> {
        if self.state != ClientState::None {
            return Err(TurnError::InvalidState);
        }

        self.send_allocate(false, instant)?;
        self.change_state(ClientState::Allocating);
        self.add_timeout_event(instant);
        Ok(())
    }

    /// Installs or renews a permission for `peer`. The result is notified
    /// with [`TurnClientEvent::PermissionCreated`] or
    /// [`TurnClientEvent::PermissionFailed`].
    pub fn create_permission(&mut self, peer: IpAddr, instant: Instant) -> Result<(), TurnError> {
        self.check_allocated()?;

        if self
            .permissions
            .get(&peer)
            .is_some_and(|permission| permission.pending)
        {
            debug!("Permission request for {} already in progress", peer);
            return Ok(());
        }

        self.send_create_permission(peer, false, instant)?;
        self.add_timeout_event(instant);
        Ok(())
    }

    /// Binds `peer` to the first free channel number, or returns the channel
    /// already bound to it.
    pub fn bind_channel(&mut self, peer: SocketAddr, instant: Instant) -> Result<u16, TurnError> {
        self.check_allocated()?;

        if let Some(channel) = self.peer_channels.get(&peer) {
            return Ok(*channel);
        }

        let range = usize::from(MAX_CHANNEL_NUMBER - MIN_CHANNEL_NUMBER) + 1;
        let channel = (MIN_CHANNEL_NUMBER..=MAX_CHANNEL_NUMBER)
            .cycle()
            .skip(usize::from(self.next_channel - MIN_CHANNEL_NUMBER))
            .take(range)
            .find(|channel| !self.channels.contains_key(channel))
            .ok_or(TurnError::InvalidChannel)?;

        self.bind_channel_number(channel, peer, instant)?;
        self.next_channel = if channel == MAX_CHANNEL_NUMBER {
            MIN_CHANNEL_NUMBER
        } else {
            channel + 1
        };
        Ok(channel)
    }

    /// Binds `channel` to `peer`, or renews the binding. A channel can only
    /// be bound to one peer and a peer to one channel.
    pub fn bind_channel_number(
        &mut self,
        channel: u16,
        peer: SocketAddr,
        instant: Instant,
    ) -> Result<(), TurnError> {
        self.check_allocated()?;

        if !(MIN_CHANNEL_NUMBER..=MAX_CHANNEL_NUMBER).contains(&channel) {
            return Err(TurnError::InvalidChannel);
        }

        if let Some(binding) = self.channels.get(&channel) {
            if binding.peer != peer {
                return Err(TurnError::BindingConflict);
            }
            if binding.pending {
                debug!("Channel bind request for {:#06x} already in progress", channel);
                return Ok(());
            }
        }
        if self
            .peer_channels
            .get(&peer)
            .is_some_and(|bound| *bound != channel)
        {
            return Err(TurnError::BindingConflict);
        }

        self.send_channel_bind(channel, peer, false, instant)?;
        self.add_timeout_event(instant);
        Ok(())
    }

    fn enqueue(&mut self, peer: SocketAddr, data: &[u8], error: TurnError) -> Result<(), TurnError> {
        if self.queue_capacity == 0 {
            return Err(error);
        }
        if self.queue.len() >= self.queue_capacity {
            return Err(TurnError::QueueFull);
        }
        debug!("Queueing {} bytes for {}", data.len(), peer);
        self.queue.push_back((peer, data.to_vec()));
        Ok(())
    }

    fn send_channel_data(&mut self, channel: u16, data: &[u8]) -> Result<(), TurnError> {
        let buffer = ChannelData::new(channel, data.to_vec())?.encode_to_vec()?;
        self.events.push(TurnClientEvent::OutputPacket(buffer));
        Ok(())
    }

    fn send_indication(&mut self, peer: SocketAddr, data: &[u8]) -> Result<(), TurnError> {
        let attributes = vec![XorPeerAddress::from(peer).into(), Data::new(data).into()];
        let transaction_id = self.random.transaction_id();
        let msg = self.create_message(SEND, MessageClass::Indication, transaction_id, attributes);
        let buffer = self.encoder.encode_to_vec(&msg)?;
        self.events.push(TurnClientEvent::OutputPacket(buffer));
        Ok(())
    }

    // Returns false if the peer is not authorized yet
    fn relay(&mut self, peer: SocketAddr, data: &[u8], instant: Instant) -> Result<bool, TurnError> {
        let channel = self.channel(&peer, instant);
        let permitted = self.has_permission(peer.ip(), instant);
        if channel.is_none() && !permitted {
            return Ok(false);
        }

        if let Some(permission) = self.permissions.get_mut(&peer.ip()) {
            permission.in_use = true;
        }

        match channel {
            Some(channel) => self.send_channel_data(channel, data)?,
            None => self.send_indication(peer, data)?,
        }
        Ok(true)
    }

    fn authorization_pending(&self, peer: &SocketAddr) -> bool {
        let permission = self
            .permissions
            .get(&peer.ip())
            .is_some_and(|permission| permission.pending);
        let channel = self
            .peer_channels
            .get(peer)
            .and_then(|channel| self.channels.get(channel))
            .is_some_and(|binding| binding.pending);
        permission || channel
    }

    /// Sends data to `peer` through the relay. ChannelData framing is used
    /// when a channel is bound to the peer, a Send indication otherwise.
    /// Data sent before the allocation is ready, or while the peer
    /// authorization is in progress, is queued if a queue was configured.
    pub fn send_to(&mut self, peer: SocketAddr, data: &[u8], instant: Instant) -> Result<(), TurnError> {
        match self.state {
            ClientState::Error | ClientState::Terminated => Err(TurnError::InvalidState),
            ClientState::None | ClientState::Allocating | ClientState::Authenticating => {
                self.enqueue(peer, data, TurnError::NotReady)
            }
            ClientState::Allocated | ClientState::Refreshing => {
                if self.relay(peer, data, instant)? {
                    return Ok(());
                }
                if self.authorization_pending(&peer) {
                    return self.enqueue(peer, data, TurnError::NoPermission);
                }
                Err(TurnError::NoPermission)
            }
        }
    }

    fn flush_queue(&mut self, peer: IpAddr, instant: Instant) {
        let (ready, waiting) = self
            .queue
            .drain(..)
            .partition::<VecDeque<_>, _>(|(addr, _)| addr.ip() == peer);
        self.queue = waiting;

        for (addr, data) in ready {
            match self.relay(addr, &data, instant) {
                Ok(true) => {}
                Ok(false) => debug!("Dropping queued data for {}, not authorized", addr),
                Err(e) => warn!("Dropping queued data for {}: {}", addr, e),
            }
        }
    }

    /// Moves the client to [`ClientState::Error`], dropping every pending
    /// operation.
    fn fail(&mut self, error: TurnError) {
        if matches!(self.state, ClientState::Error | ClientState::Terminated) {
            return;
        }

        warn!("TURN client failed: {}", error);
        self.reset();
        self.events.push(TurnClientEvent::Error(error));
        self.change_state(ClientState::Error);
    }

    fn reset(&mut self) {
        self.transactions.cancel_all();
        self.pending.clear();
        self.timers.clear();
        self.allocation = None;
        self.permissions.clear();
        self.channels.clear();
        self.peer_channels.clear();
        if !self.queue.is_empty() {
            debug!("Dropping {} queued datagrams", self.queue.len());
            self.queue.clear();
        }
    }

    /// Closes the client. Pending transactions and timers are cancelled
    /// without notification and, if an allocation exists, a Refresh with a
    /// zero lifetime is sent to release it. The client ends in
    /// [`ClientState::Terminated`] whatever the server answers.
    pub fn close(&mut self, _instant: Instant) {
        if self.state == ClientState::Terminated {
            return;
        }

        let allocated = self.allocation.is_some();
        self.transactions.cancel_all();
        self.pending.clear();
        self.timers.clear();

        if allocated {
            let transaction_id = self.random.transaction_id();
            let attributes = vec![LifeTime::new(0).into()];
            let msg =
                self.create_message(REFRESH, MessageClass::Request, transaction_id, attributes);
            match self.encoder.encode_to_vec(&msg) {
                Ok(buffer) => self.events.push(TurnClientEvent::OutputPacket(buffer)),
                Err(e) => warn!("Can not encode deallocation request: {}", e),
            }
        }

        self.reset();
        self.change_state(ClientState::Terminated);
    }

    /// Processes a datagram received from the server. Datagrams that can not
    /// be decoded, or that nobody is waiting for, are dropped and reported
    /// as an error without altering the client.
    pub fn on_buffer_recv(&mut self, buffer: &[u8], instant: Instant) -> Result<(), StunAgentError> {
        if self.state == ClientState::Terminated {
            debug!("Client terminated. Discarding.");
            return Err(StunAgentError::Discarded);
        }

        let result = match demultiplex(buffer) {
            Some(PacketKind::ChannelData) => self.on_channel_data(buffer, instant),
            Some(PacketKind::Stun) => self.on_stun_message(buffer, instant),
            None => {
                debug!("Neither STUN nor ChannelData. Discarding.");
                Err(StunAgentError::Discarded)
            }
        };

        self.add_timeout_event(instant);
        result
    }

    fn on_channel_data(&mut self, buffer: &[u8], instant: Instant) -> Result<(), StunAgentError> {
        let (msg, _) = ChannelData::decode(buffer).map_err(|e| {
            debug!("Invalid ChannelData message: {}", e);
            StunAgentError::Discarded
        })?;

        let peer = self
            .channels
            .get(&msg.channel())
            .filter(|binding| binding.is_valid(instant))
            .map(|binding| binding.peer)
            .ok_or_else(|| {
                debug!("No channel {:#06x} bound. Discarding.", msg.channel());
                StunAgentError::Discarded
            })?;

        if let Some(permission) = self.permissions.get_mut(&peer.ip()) {
            permission.in_use = true;
        }
        self.events.push(TurnClientEvent::DataReceived {
            peer,
            data: msg.into_payload(),
        });
        Ok(())
    }

    fn on_stun_message(&mut self, buffer: &[u8], instant: Instant) -> Result<(), StunAgentError> {
        let (msg, size) = self.decoder.decode(buffer)?;

        match msg.class() {
            MessageClass::Request => {
                debug!("TURN client received a request message. Discarding.");
                Err(StunAgentError::Discarded)
            }
            MessageClass::Indication => self.on_indication(msg, instant),
            MessageClass::SuccessResponse | MessageClass::ErrorResponse => {
                let (transaction_id, result) = self
                    .transactions
                    .on_response(&buffer[..size], msg)
                    .ok_or(StunAgentError::Discarded)?;
                let pending = self
                    .pending
                    .remove(&transaction_id)
                    .ok_or(StunAgentError::Discarded)?;
                self.on_transaction_result(pending, result, instant);
                Ok(())
            }
        }
    }

    fn on_indication(&mut self, msg: StunMessage, instant: Instant) -> Result<(), StunAgentError> {
        if msg.method() != DATA || !self.is_allocated() {
            debug!("Unexpected {} indication. Discarding.", msg.method());
            return Err(StunAgentError::Discarded);
        }

        if msg
            .attributes()
            .iter()
            .any(|attr| attr.is_unknown_comprehension_required())
        {
            debug!("Data indication with unknown comprehension-required attributes. Discarding.");
            return Err(StunAgentError::Discarded);
        }

        let peer = msg
            .get::<XorPeerAddress>()
            .and_then(|attr| attr.as_xor_peer_address().ok())
            .map(|attr| *attr.socket_address());
        let data = msg
            .get::<Data>()
            .and_then(|attr| attr.as_data().ok())
            .map(|attr| attr.as_bytes().to_vec());
        let (Some(peer), Some(data)) = (peer, data) else {
            debug!("Data indication without XOR-PEER-ADDRESS or DATA. Discarding.");
            return Err(StunAgentError::Discarded);
        };

        let Some(permission) = self
            .permissions
            .get_mut(&peer.ip())
            .filter(|permission| permission.is_valid(instant))
        else {
            debug!("No permission for {}. Discarding.", peer);
            return Err(StunAgentError::Discarded);
        };

        permission.in_use = true;
        self.events.push(TurnClientEvent::DataReceived { peer, data });
        Ok(())
    }

    fn on_transaction_result(
        &mut self,
        pending: PendingExchange,
        result: Result<StunMessage, TransactionError>,
        instant: Instant,
    ) {
        let exchange = pending.exchange;
        match result {
            Ok(msg) => {
                let unknown: Vec<u16> = msg
                    .attributes()
                    .iter()
                    .filter(|attr| attr.is_unknown_comprehension_required())
                    .map(|attr| attr.attribute_type().as_u16())
                    .collect();
                if !unknown.is_empty() {
                    self.on_exchange_failed(exchange, TurnError::UnknownAttributes(unknown), instant);
                    return;
                }

                match exchange {
                    Exchange::Allocate => self.on_allocate_success(&msg, instant),
                    Exchange::Refresh => self.on_refresh_success(&msg, instant),
                    Exchange::CreatePermission(peer) => {
                        self.install_permission(peer, instant);
                        self.events.push(TurnClientEvent::PermissionCreated(peer));
                        self.flush_queue(peer, instant);
                    }
                    Exchange::ChannelBind(channel, peer) => {
                        self.on_channel_bind_success(channel, peer, instant)
                    }
                }
            }
            Err(TransactionError::ServerError {
                code,
                reason,
                response,
            }) => {
                if !pending.auth_retried {
                    if let Some(cause) = self.credentials.process_error_response(code, &response)
                    {
                        self.retry_exchange(exchange, cause, instant);
                        return;
                    }
                }
                self.on_exchange_failed(exchange, TurnError::ServerError { code, reason }, instant);
            }
            Err(TransactionError::TimedOut) => self.on_exchange_timeout(exchange, instant),
            Err(TransactionError::ProtectionViolated) => {
                self.on_exchange_failed(exchange, TurnError::ProtectionViolated, instant)
            }
        }
    }

    fn retry_exchange(&mut self, exchange: Exchange, cause: RetryCause, instant: Instant) {
        debug!("Retrying {:?} with credentials, cause {:?}", exchange, cause);
        let result = match exchange {
            Exchange::Allocate => {
                let result = self.send_allocate(true, instant);
                if result.is_ok() && self.state == ClientState::Allocating {
                    self.change_state(ClientState::Authenticating);
                }
                result
            }
            Exchange::Refresh => self.send_refresh(true, instant),
            Exchange::CreatePermission(peer) => self.send_create_permission(peer, true, instant),
            Exchange::ChannelBind(channel, peer) => {
                self.send_channel_bind(channel, peer, true, instant)
            }
        };

        if let Err(e) = result {
            self.on_exchange_failed(exchange, e, instant);
        }
    }

    fn on_exchange_failed(&mut self, exchange: Exchange, error: TurnError, instant: Instant) {
        match exchange {
            Exchange::Allocate | Exchange::Refresh => self.fail(error),
            Exchange::CreatePermission(peer) => {
                info!("Permission for {} failed: {}", peer, error);
                self.permissions.remove(&peer);
                self.timers.remove(&ClientTimer::PermissionRefresh(peer));
                self.timers.remove(&ClientTimer::PermissionExpired(peer));
                self.drop_unauthorized(instant);
                self.events
                    .push(TurnClientEvent::PermissionFailed(peer, error));
            }
            Exchange::ChannelBind(channel, peer) => {
                info!("Channel bind {:#06x} for {} failed: {}", channel, peer, error);
                self.channels.remove(&channel);
                self.peer_channels.remove(&peer);
                self.timers.remove(&ClientTimer::ChannelRefresh(channel));
                self.drop_unauthorized(instant);
                self.events.push(TurnClientEvent::ChannelBindFailed {
                    channel,
                    peer,
                    error,
                });
            }
        }
    }

    // Queued data waits for an authorization in progress, anything else is
    // dropped.
    fn drop_unauthorized(&mut self, instant: Instant) {
        let queue = std::mem::take(&mut self.queue);
        self.queue = queue
            .into_iter()
            .filter(|(peer, _)| {
                let keep = self.authorization_pending(peer)
                    || self.has_permission(peer.ip(), instant)
                    || self.channel(peer, instant).is_some();
                if !keep {
                    debug!("Dropping queued data for {}", peer);
                }
                keep
            })
            .collect();
    }

    fn on_exchange_timeout(&mut self, exchange: Exchange, instant: Instant) {
        let timer = match exchange {
            Exchange::Allocate => ClientTimer::RetryAllocate,
            Exchange::Refresh => ClientTimer::AllocationRefresh,
            _ => {
                self.on_exchange_failed(exchange, TurnError::Timeout, instant);
                return;
            }
        };

        self.exchange_failures += 1;
        if self.exchange_failures >= self.max_exchange_failures {
            self.fail(TurnError::Timeout);
            return;
        }

        let backoff = EXCHANGE_RETRY_BACKOFF.saturating_mul(1 << (self.exchange_failures - 1).min(16));
        info!(
            "{:?} timed out ({} of {}), retrying in {:?}",
            exchange, self.exchange_failures, self.max_exchange_failures, backoff
        );
        self.timers.remove(&timer);
        self.timers.add(instant + backoff, timer);
    }

    fn arm_allocation_timers(&mut self, lifetime: Duration, instant: Instant) {
        self.timers.remove(&ClientTimer::RetryAllocate);
        self.timers.remove(&ClientTimer::AllocationRefresh);
        self.timers.remove(&ClientTimer::AllocationExpired);
        self.timers
            .add(instant + lifetime / 2, ClientTimer::AllocationRefresh);
        self.timers
            .add(instant + lifetime, ClientTimer::AllocationExpired);
    }

    fn on_allocate_success(&mut self, msg: &StunMessage, instant: Instant) {
        let Some(relayed) = msg
            .get::<XorRelayedAddress>()
            .and_then(|attr| attr.as_xor_relayed_address().ok())
            .map(|attr| *attr.socket_address())
        else {
            self.fail(TurnError::MalformedResponse(String::from(
                "XOR-RELAYED-ADDRESS missing in Allocate response",
            )));
            return;
        };
        let mapped = msg
            .get::<XorMappedAddress>()
            .and_then(|attr| attr.as_xor_mapped_address().ok())
            .map(|attr| *attr.socket_address());
        let lifetime = msg
            .get::<LifeTime>()
            .and_then(|attr| attr.as_life_time().ok())
            .map(|attr| attr.as_duration())
            .unwrap_or(DEFAULT_ALLOCATION_LIFETIME);

        info!(
            "Allocated relayed address {}, lifetime {:?}",
            relayed, lifetime
        );
        self.exchange_failures = 0;
        self.allocation = Some(Allocation {
            relayed,
            mapped,
            lifetime,
        });
        self.arm_allocation_timers(lifetime, instant);
        self.change_state(ClientState::Allocated);
    }

    fn on_refresh_success(&mut self, msg: &StunMessage, instant: Instant) {
        let Some(allocation) = self.allocation.as_mut() else {
            return;
        };

        if let Some(lifetime) = msg
            .get::<LifeTime>()
            .and_then(|attr| attr.as_life_time().ok())
        {
            allocation.lifetime = lifetime.as_duration();
        }
        let lifetime = allocation.lifetime;
        debug!("Allocation refreshed, lifetime {:?}", lifetime);

        self.exchange_failures = 0;
        self.arm_allocation_timers(lifetime, instant);
        self.change_state(ClientState::Allocated);
    }

    fn install_permission(&mut self, peer: IpAddr, instant: Instant) {
        let permission = self.permissions.entry(peer).or_default();
        let expires = instant + PERMISSION_LIFETIME;
        permission.expires = Some(expires);
        permission.pending = false;
        permission.in_use = false;

        self.timers.remove(&ClientTimer::PermissionRefresh(peer));
        self.timers.remove(&ClientTimer::PermissionExpired(peer));
        self.timers.add(
            expires - PERMISSION_REFRESH_MARGIN,
            ClientTimer::PermissionRefresh(peer),
        );
    }

    fn on_channel_bind_success(&mut self, channel: u16, peer: SocketAddr, instant: Instant) {
        let binding = self.channels.entry(channel).or_insert(ChannelBinding {
            peer,
            expires: None,
            pending: false,
        });
        binding.expires = Some(instant + CHANNEL_LIFETIME);
        binding.pending = false;
        self.peer_channels.insert(peer, channel);

        self.timers.remove(&ClientTimer::ChannelRefresh(channel));
        self.timers.add(
            instant + CHANNEL_REFRESH_INTERVAL,
            ClientTimer::ChannelRefresh(channel),
        );

        // A channel binding also installs a permission for the peer address
        let in_use = self
            .permissions
            .get(&peer.ip())
            .is_some_and(|permission| permission.in_use);
        self.install_permission(peer.ip(), instant);
        if let Some(permission) = self.permissions.get_mut(&peer.ip()) {
            permission.in_use = in_use;
        }

        debug!("Channel {:#06x} bound to {}", channel, peer);
        self.events
            .push(TurnClientEvent::ChannelBound { channel, peer });
        self.flush_queue(peer.ip(), instant);
    }

    fn on_timer(&mut self, timer: ClientTimer, instant: Instant) {
        match timer {
            ClientTimer::RetryAllocate => {
                if matches!(
                    self.state,
                    ClientState::Allocating | ClientState::Authenticating
                ) {
                    if let Err(e) = self.send_allocate(false, instant) {
                        self.fail(e);
                    }
                }
            }
            ClientTimer::AllocationRefresh => {
                let refreshing = self
                    .pending
                    .values()
                    .any(|pending| pending.exchange == Exchange::Refresh);
                if self.is_allocated() && !refreshing {
                    match self.send_refresh(false, instant) {
                        Ok(()) => self.change_state(ClientState::Refreshing),
                        Err(e) => self.fail(e),
                    }
                }
            }
            ClientTimer::AllocationExpired => self.fail(TurnError::AllocationExpired),
            ClientTimer::PermissionRefresh(peer) => {
                let Some(permission) = self.permissions.get(&peer) else {
                    return;
                };
                if permission.pending {
                    return;
                }
                if permission.in_use {
                    debug!("Refreshing permission for {}", peer);
                    if let Err(e) = self.send_create_permission(peer, false, instant) {
                        self.on_exchange_failed(Exchange::CreatePermission(peer), e, instant);
                    }
                } else if let Some(expires) = permission.expires {
                    debug!("Permission for {} not in use, letting it expire", peer);
                    self.timers.add(expires, ClientTimer::PermissionExpired(peer));
                }
            }
            ClientTimer::PermissionExpired(peer) => {
                let expired = self
                    .permissions
                    .get(&peer)
                    .is_some_and(|permission| !permission.pending && !permission.is_valid(instant));
                if expired {
                    debug!("Permission for {} expired", peer);
                    self.permissions.remove(&peer);
                }
            }
            ClientTimer::ChannelRefresh(channel) => {
                let Some(binding) = self.channels.get(&channel) else {
                    return;
                };
                if binding.pending {
                    return;
                }
                let peer = binding.peer;
                debug!("Refreshing channel {:#06x} bound to {}", channel, peer);
                if let Err(e) = self.send_channel_bind(channel, peer, false, instant) {
                    self.on_exchange_failed(Exchange::ChannelBind(channel, peer), e, instant);
                }
            }
        }
    }

    /// Reports that the transport can not send or receive anymore. The
    /// client moves to [`ClientState::Error`].
    pub fn on_transport_error<S>(&mut self, reason: S)
    where
        S: Into<String>,
    {
        self.fail(TurnError::Transport(reason.into()));
    }

    /// Handles every expired retransmission and protocol timer.
    pub fn on_timeout(&mut self, instant: Instant) {
        if matches!(self.state, ClientState::Error | ClientState::Terminated) {
            return;
        }

        for event in self.transactions.on_timeout(instant) {
            if self.state == ClientState::Error {
                break;
            }
            match event {
                TransactionEvent::Retransmit(buffer) => {
                    self.events.push(TurnClientEvent::OutputPacket(buffer))
                }
                TransactionEvent::Failed(transaction_id, error) => {
                    if let Some(pending) = self.pending.remove(&transaction_id) {
                        self.on_transaction_result(pending, Err(error), instant);
                    }
                }
            }
        }

        for timer in self.timers.check(instant) {
            if self.state == ClientState::Error {
                break;
            }
            self.on_timer(timer, instant);
        }

        self.add_timeout_event(instant);
    }
}
