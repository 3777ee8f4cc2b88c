//! Host doubles and a scripted watch for integration tests.
//!
//! [`Host`] bundles the port adapters a session is driven with. [`Watch`]
//! plays the device end of the link: it answers the handshake with the
//! same key schedule and frames its replies the way real firmware does.

use wearlink::adapters::prefs::MemoryPreferences;
use wearlink::adapters::radio::QueuedRadio;
use wearlink::app::commands::{AuthBody, Body, Command};
use wearlink::app::events::DeviceEvent;
use wearlink::app::ports::{LocalTime, TimeSource, VecEventSink};
use wearlink::app::session::HostPorts;
use wearlink::config::LinkConfig;
use wearlink::link::auth::{AUTH_COMMAND_TYPE, CMD_AUTH, CMD_NONCE};
use wearlink::link::cipher::{Nonce16, SessionCipher, SessionKeys};
use wearlink::link::codec::{
    seal_with_counter, Channel, DataType, Frame, NoCipher, OPCODE_SEND, PayloadCipher,
};
use wearlink::link::gatt::{bt_uuid, GattLink, TEMPLATES};
use wearlink::link::stream::StreamLink;
use wearlink::link::transport::{DiscoveredService, Discovery, Endpoint, Op};
use wearlink::Session;

pub const AUTH_KEY: &str = "00112233445566778899aabbccddeeff";
pub const SECRET: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

pub fn config() -> LinkConfig {
    LinkConfig {
        auth_key: AUTH_KEY.into(),
        user_id: "1234567890".into(),
        ..LinkConfig::default()
    }
}

/// Firmware image with a valid header, `size` bytes long.
pub fn firmware_bytes(size: usize) -> Vec<u8> {
    let mut bytes = vec![0u8, 0, 0, 0x20, 0x99, 0x12, 0x01, 0x08];
    bytes.resize(size, 0x5A);
    bytes
}

// ── Clock ─────────────────────────────────────────────────────

pub struct FixedClock;

impl TimeSource for FixedClock {
    fn now(&self) -> LocalTime {
        LocalTime {
            year: 2024,
            month: 6,
            day: 1,
            hour: 9,
            minute: 30,
            second: 0,
            millisecond: 0,
            zone_offset_secs: 3600,
            dst_offset_secs: 3600,
            zone_name: "Europe/Berlin".into(),
        }
    }
}

// ── Host ──────────────────────────────────────────────────────

pub struct Host {
    pub radio: QueuedRadio,
    pub events: VecEventSink,
    pub prefs: MemoryPreferences,
    pub clock: FixedClock,
}

#[allow(dead_code)]
impl Host {
    pub fn new() -> Self {
        Self {
            radio: QueuedRadio::new(),
            events: VecEventSink::default(),
            prefs: MemoryPreferences::new(),
            clock: FixedClock,
        }
    }

    pub fn ports(&mut self) -> HostPorts<'_> {
        HostPorts {
            radio: &mut self.radio,
            events: &mut self.events,
            prefs: &self.prefs,
            clock: &self.clock,
        }
    }

    /// Drain the radio queue, flattened in execution order.
    pub fn take_ops(&mut self) -> Vec<Op> {
        let mut ops = Vec::new();
        while let Some(tx) = self.radio.pop() {
            ops.extend(tx.ops);
        }
        ops
    }

    /// Drain the radio queue, keeping only writes.
    pub fn take_writes(&mut self) -> Vec<(Endpoint, Vec<u8>)> {
        self.take_ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write { endpoint, data } => Some((endpoint, data)),
                _ => None,
            })
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events.events)
    }
}

// ── Discovery ─────────────────────────────────────────────────

/// Discovery result exposing GATT template `index` in full.
pub fn gatt_discovery(index: usize) -> Discovery {
    let t = &TEMPLATES[index];
    Discovery {
        services: vec![
            DiscoveredService {
                uuid: bt_uuid(0x1800),
                characteristics: vec![bt_uuid(0x2A00)],
            },
            DiscoveredService {
                uuid: t.service,
                characteristics: vec![t.command_read, t.command_write, t.activity_data, t.data_upload],
            },
        ],
    }
}

// ── Scripted watch ────────────────────────────────────────────

pub struct Watch {
    secret: [u8; 16],
    nonce: Nonce16,
    pending: Option<SessionKeys>,
    cipher: Option<SessionCipher>,
    /// Watch → phone encryption counter.
    counter: u16,
    serial: u8,
}

#[allow(dead_code)]
impl Watch {
    pub fn new(secret: [u8; 16]) -> Self {
        Self {
            secret,
            nonce: core::array::from_fn(|i| 0xA0 + i as u8),
            pending: None,
            cipher: None,
            counter: 0,
            serial: 0,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn cipher(&self) -> &dyn PayloadCipher {
        match &self.cipher {
            Some(c) => c as &dyn PayloadCipher,
            None => &NoCipher,
        }
    }

    // --- Handshake ---

    /// Answer the phone's nonce with ours and a proof over both.
    pub fn answer_nonce(&mut self, hello: &Command) -> Command {
        let Body::Auth(AuthBody::PhoneNonce { nonce: phone }) = hello.body else {
            panic!("expected phone nonce, got {hello:?}");
        };
        let keys = SessionKeys::derive(&self.secret, &phone, &self.nonce);
        let proof = keys.watch_proof(&phone, &self.nonce);
        self.pending = Some(keys);
        Command::new(
            AUTH_COMMAND_TYPE,
            CMD_NONCE,
            Body::Auth(AuthBody::WatchNonce {
                nonce: self.nonce,
                proof,
            }),
        )
    }

    /// Check the phone's proof and sealed info. Returns the auth status to
    /// send; call [`Watch::activate`] once it is on the wire.
    pub fn accept_proof(&mut self, cmd: &Command, hello: &Command) -> Command {
        let Body::Auth(AuthBody::PhoneProof { proof, sealed_info }) = &cmd.body else {
            panic!("expected phone proof, got {cmd:?}");
        };
        let Body::Auth(AuthBody::PhoneNonce { nonce: phone }) = hello.body else {
            panic!("expected phone nonce, got {hello:?}");
        };
        let keys = self.pending.as_ref().expect("nonce answered first");
        assert_eq!(*proof, keys.phone_proof(&phone, &self.nonce));

        let mut framed = vec![0, 0];
        framed.extend_from_slice(sealed_info);
        let info = SessionCipher::new(keys.reversed())
            .open(&framed)
            .expect("phone info opens with counter 0");
        assert!(!info.is_empty());

        Command::new(AUTH_COMMAND_TYPE, CMD_AUTH, Body::Status(0))
    }

    /// Switch to the session cipher.
    pub fn activate(&mut self) {
        let keys = self.pending.take().expect("proof accepted first");
        self.cipher = Some(SessionCipher::new(keys.reversed()));
        self.counter = 0;
    }

    // --- Stream framing ---

    /// Decode the command carried by one phone-written stream frame.
    pub fn read_stream(&self, bytes: &[u8]) -> Command {
        let frame = Frame::decode(bytes).expect("phone wrote a whole frame");
        assert_eq!(frame.channel, Channel::ProtoTx);
        let payload = match frame.data_type {
            DataType::Encrypted => self.cipher().open(&frame.payload).expect("phone frame opens"),
            _ => frame.payload,
        };
        Command::from_bytes(&payload).expect("phone frame carries a command")
    }

    pub fn stream_frame(&mut self, channel: Channel, data_type: DataType, payload: Vec<u8>) -> Vec<u8> {
        let frame = Frame {
            channel,
            flag: true,
            needs_response: false,
            opcode: OPCODE_SEND,
            serial: self.serial,
            data_type,
            payload,
        };
        self.serial = self.serial.wrapping_add(1);
        let mut counter = self.counter;
        let bytes = frame.encode(&mut counter, self.cipher()).expect("watch frame encodes");
        self.counter = counter;
        bytes
    }

    pub fn stream_command(&mut self, cmd: &Command) -> Vec<u8> {
        let data_type = if cmd.kind == AUTH_COMMAND_TYPE {
            DataType::Auth
        } else if self.is_encrypted() {
            DataType::Encrypted
        } else {
            DataType::Plain
        };
        let payload = cmd.to_bytes().expect("command encodes");
        self.stream_frame(Channel::ProtoRx, data_type, payload)
    }

    /// Part acknowledgement on the mass-storage channel.
    pub fn stream_part_ack(&mut self, status: u8, index: u16) -> Vec<u8> {
        let [lo, hi] = index.to_le_bytes();
        self.stream_frame(Channel::MassStorage, DataType::Plain, vec![status, lo, hi])
    }

    // --- GATT values ---

    /// Decode a command value the phone wrote.
    pub fn read_value(&self, value: &[u8]) -> Command {
        let plain = match &self.cipher {
            Some(c) => c.open(value).expect("phone value opens"),
            None => value.to_vec(),
        };
        Command::from_bytes(&plain).expect("phone value carries a command")
    }

    pub fn value_command(&mut self, cmd: &Command) -> Vec<u8> {
        let plain = cmd.to_bytes().expect("command encodes");
        match &self.cipher {
            Some(c) => seal_with_counter(c, &mut self.counter, &plain).expect("watch value seals"),
            None => plain,
        }
    }
}

// ── Canned handshakes ─────────────────────────────────────────

/// Connect a stream session and run the encrypted handshake to the end.
pub fn connect_stream(session: &mut Session<StreamLink>, host: &mut Host, watch: &mut Watch) {
    session
        .connect(&Discovery::default(), &mut host.ports())
        .expect("stream link binds");
    let writes = host.take_writes();
    let hello = watch.read_stream(&writes[0].1);

    let reply = watch.answer_nonce(&hello);
    let bytes = watch.stream_command(&reply);
    session.on_receive(Endpoint::Stream, &bytes, &mut host.ports());

    let writes = host.take_writes();
    let proof = watch.read_stream(&writes[0].1);
    let status = watch.accept_proof(&proof, &hello);
    let bytes = watch.stream_command(&status);
    watch.activate();
    session.on_receive(Endpoint::Stream, &bytes, &mut host.ports());
}

/// Connect over the encrypted GATT service and run the handshake.
pub fn connect_gatt(session: &mut Session<GattLink>, host: &mut Host, watch: &mut Watch) {
    let t = &TEMPLATES[0];
    session
        .connect(&gatt_discovery(0), &mut host.ports())
        .expect("encrypted service binds");
    let writes = host.take_writes();
    let hello = watch.read_value(&writes[0].1);

    let reply = watch.answer_nonce(&hello);
    let value = watch.value_command(&reply);
    session.on_receive(Endpoint::Resource(t.command_read), &value, &mut host.ports());

    let writes = host.take_writes();
    let proof = watch.read_value(&writes[0].1);
    let status = watch.accept_proof(&proof, &hello);
    let value = watch.value_command(&status);
    watch.activate();
    session.on_receive(Endpoint::Resource(t.command_read), &value, &mut host.ports());
}
