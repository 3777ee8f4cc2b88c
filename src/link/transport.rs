//! Transport abstraction: the ordered radio queue and the link seam.
//!
//! The host owns the physical connection. The engine never writes to it
//! directly; it batches operations into a [`Transaction`] and submits it
//! through [`RadioPort`]. The host executes operations strictly in order,
//! one transaction after another, which is what keeps handshake writes
//! behind their notification subscriptions.
//!
//! Concrete links:
//! - [`StreamLink`](super::stream::StreamLink): serial-port stream
//! - [`GattLink`](super::gatt::GattLink): four GATT characteristics

use crate::app::commands::Command;
use crate::error::LinkError;

use super::codec::PayloadCipher;

/// Where a write goes or a notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The serial-port byte stream.
    Stream,
    /// A GATT characteristic, by UUID.
    Resource(u128),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Initializing,
    Initialized,
    WaitingForReconnect,
}

/// One queued radio operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Write { endpoint: Endpoint, data: Vec<u8> },
    Subscribe(Endpoint),
    RequestMtu(u16),
    SetState(ConnectionState),
    /// Progress notification, ordered with the surrounding traffic.
    Progress { message: String, percent: u8 },
}

/// Ordered batch of radio operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub name: String,
    pub ops: Vec<Op>,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    pub fn write(&mut self, endpoint: Endpoint, data: Vec<u8>) -> &mut Self {
        self.ops.push(Op::Write { endpoint, data });
        self
    }

    pub fn subscribe(&mut self, endpoint: Endpoint) -> &mut Self {
        self.ops.push(Op::Subscribe(endpoint));
        self
    }

    pub fn request_mtu(&mut self, mtu: u16) -> &mut Self {
        self.ops.push(Op::RequestMtu(mtu));
        self
    }

    pub fn set_state(&mut self, state: ConnectionState) -> &mut Self {
        self.ops.push(Op::SetState(state));
        self
    }

    pub fn progress(&mut self, message: impl Into<String>, percent: u8) -> &mut Self {
        self.ops.push(Op::Progress {
            message: message.into(),
            percent,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The host's ordered operation queue.
pub trait RadioPort {
    fn submit(&mut self, tx: Transaction) -> Result<(), LinkError>;
}

/// Discovered GATT layout, as reported by the host after service discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub services: Vec<DiscoveredService>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: u128,
    pub characteristics: Vec<u128>,
}

impl Discovery {
    pub fn service(&self, uuid: u128) -> Option<&DiscoveredService> {
        self.services.iter().find(|s| s.uuid == uuid)
    }
}

/// Which handshake the bound resources call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMode {
    Encrypted,
    ClearText,
}

/// Payload recovered from the radio, already decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Command bytes for the dispatcher.
    Command(Vec<u8>),
    /// Fitness / activity data for the bulk sink.
    Activity(Vec<u8>),
    /// Upload acknowledgement from the bulk channel.
    UploadAck(Vec<u8>),
}

/// A physical link variant. Owns framing and the per-connection counters.
pub trait Link {
    /// Log prefix, e.g. `"SPP"`.
    fn tag(&self) -> &'static str;

    /// Bind to the discovered resources.
    fn bind(&mut self, discovery: &Discovery) -> Result<HandshakeMode, LinkError>;

    /// Operations that must precede the first handshake write.
    fn startup(&self, tx: &mut Transaction);

    /// Turn received bytes into payloads. Framing and decryption errors are
    /// logged and dropped here.
    fn receive(
        &mut self,
        endpoint: Endpoint,
        data: &[u8],
        cipher: Option<&dyn PayloadCipher>,
    ) -> Vec<Inbound>;

    /// Encode `cmd` and append the write to `tx`. Serial and counter
    /// advance only if encoding succeeds.
    fn write_command(
        &mut self,
        tx: &mut Transaction,
        cmd: &Command,
        cipher: Option<&dyn PayloadCipher>,
    ) -> Result<(), LinkError>;

    /// Append one upload part to `tx` on the bulk channel.
    fn write_bulk(
        &mut self,
        tx: &mut Transaction,
        part: Vec<u8>,
        cipher: Option<&dyn PayloadCipher>,
    ) -> Result<(), LinkError>;

    /// Largest upload part the link carries in one write.
    fn max_bulk_payload(&self) -> usize;

    fn set_mtu(&mut self, _mtu: usize) {}

    /// Zero every frame-serial and encryption counter.
    fn reset_counters(&mut self);

    /// Drop partial input after bytes were lost in delivery.
    fn resync(&mut self) {}

    /// Drop partial input and counters on disconnect.
    fn teardown(&mut self);
}
