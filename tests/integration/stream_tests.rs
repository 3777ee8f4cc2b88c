//! Session tests over the serial-port stream link.

use wearlink::app::commands::{Body, Command, DeviceState, SystemBody};
use wearlink::app::events::DeviceEvent;
use wearlink::app::system::{
    CMD_BATTERY, CMD_CLOCK, CMD_DEVICE_INFO, CMD_DEVICE_STATE, CMD_DEVICE_STATE_GET,
    CMD_DISPLAY_ITEMS_GET, CMD_PASSWORD_GET, CMD_VIBRATION_PATTERNS_GET, PREF_TIMEFORMAT,
    PREF_TIMEFORMAT_12H, SYSTEM_COMMAND_TYPE, WearingState,
};
use wearlink::config::Capabilities;
use wearlink::error::LinkError;
use wearlink::link::auth::{AUTH_COMMAND_TYPE, CMD_NONCE};
use wearlink::link::channels::CHUNK_CAPACITY;
use wearlink::link::codec::{Channel, DataType, Frame};
use wearlink::link::dispatch::{Service, ServiceContext};
use wearlink::link::stream::StreamLink;
use wearlink::link::transport::{ConnectionState, Discovery, Endpoint, Op};
use wearlink::Session;

use crate::mocks::{config, connect_stream, Host, Watch, SECRET};

fn session() -> Session<StreamLink> {
    Session::new(StreamLink::default(), &config(), Capabilities::default()).unwrap()
}

// ── Handshake ─────────────────────────────────────────────────

#[test]
fn connect_that_cannot_send_the_nonce_ends_not_connected() {
    let mut host = Host::new();
    let mut s = session();
    host.radio.set_offline(true);

    assert_eq!(
        s.connect(&Discovery::default(), &mut host.ports()),
        Err(LinkError::Radio)
    );
    assert_eq!(s.state(), ConnectionState::NotConnected);
    assert_eq!(
        host.take_events().last(),
        Some(&DeviceEvent::ConnectionState(ConnectionState::NotConnected))
    );
    assert_eq!(s.link().encryption_counter(), 0);

    host.radio.set_offline(false);
    s.connect(&Discovery::default(), &mut host.ports()).unwrap();
    assert_eq!(s.state(), ConnectionState::Initializing);
}

#[test]
fn connect_queues_state_then_nonce() {
    let mut host = Host::new();
    let mut s = session();

    s.connect(&Discovery::default(), &mut host.ports()).unwrap();

    let ops = host.take_ops();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0], Op::SetState(ConnectionState::Initializing));
    let Op::Write { endpoint, data } = &ops[1] else {
        panic!("expected nonce write, got {:?}", ops[1]);
    };
    assert_eq!(*endpoint, Endpoint::Stream);

    let frame = Frame::decode(data).unwrap();
    assert_eq!(frame.data_type, DataType::Auth);
    assert_eq!(frame.serial, 0);
    let hello = Command::from_bytes(&frame.payload).unwrap();
    assert_eq!((hello.kind, hello.subtype), (AUTH_COMMAND_TYPE, CMD_NONCE));

    assert_eq!(s.state(), ConnectionState::Initializing);
    assert_eq!(
        host.take_events(),
        [
            DeviceEvent::ConnectionState(ConnectionState::Connecting),
            DeviceEvent::ConnectionState(ConnectionState::Initializing),
        ]
    );
}

#[test]
fn handshake_reaches_initialized_and_requests_status() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();

    connect_stream(&mut s, &mut host, &mut watch);

    assert_eq!(s.state(), ConnectionState::Initialized);
    assert!(s.handshake().is_authenticated());
    assert!(
        host.events
            .events
            .contains(&DeviceEvent::ConnectionState(ConnectionState::Initialized))
    );

    let ops = host.take_ops();
    assert_eq!(ops[0], Op::SetState(ConnectionState::Initialized));

    let requested: Vec<u8> = ops[1..]
        .iter()
        .map(|op| match op {
            Op::Write { data, .. } => {
                let cmd = watch.read_stream(data);
                assert_eq!(cmd.kind, SYSTEM_COMMAND_TYPE);
                cmd.subtype
            }
            other => panic!("unexpected op {other:?}"),
        })
        .collect();
    assert_eq!(
        requested,
        [
            CMD_DEVICE_INFO,
            CMD_DEVICE_STATE_GET,
            CMD_BATTERY,
            CMD_PASSWORD_GET,
            CMD_DISPLAY_ITEMS_GET,
            CMD_VIBRATION_PATTERNS_GET,
        ]
    );

    // Counters restart at authentication, then one step per request.
    assert_eq!(s.link().frame_serial(), 6);
    assert_eq!(s.link().encryption_counter(), 6);
}

#[test]
fn post_auth_frames_are_encrypted_with_rising_counters() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);

    let counters: Vec<u16> = host
        .take_writes()
        .iter()
        .map(|(_, data)| {
            let frame = Frame::decode(data).unwrap();
            assert_eq!(frame.data_type, DataType::Encrypted);
            u16::from_le_bytes([frame.payload[0], frame.payload[1]])
        })
        .collect();
    assert_eq!(counters, [1, 2, 3, 4, 5, 6]);
}

#[test]
fn wrong_key_fails_authentication() {
    let mut host = Host::new();
    let mut watch = Watch::new([0x42; 16]);
    let mut s = session();

    s.connect(&Discovery::default(), &mut host.ports()).unwrap();
    let writes = host.take_writes();
    let hello = watch.read_stream(&writes[0].1);
    let reply = watch.answer_nonce(&hello);
    let bytes = watch.stream_command(&reply);
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());

    assert_eq!(s.state(), ConnectionState::NotConnected);
    assert!(!s.handshake().is_authenticated());
    assert!(host.take_writes().is_empty(), "no proof after a bad watch proof");
    let events = host.take_events();
    assert!(events.contains(&DeviceEvent::AuthenticationFailed));
    assert_eq!(
        events.last(),
        Some(&DeviceEvent::ConnectionState(ConnectionState::NotConnected))
    );
}

#[test]
fn rejected_auth_status_fails_authentication() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();

    s.connect(&Discovery::default(), &mut host.ports()).unwrap();
    let writes = host.take_writes();
    let hello = watch.read_stream(&writes[0].1);
    let reply = watch.answer_nonce(&hello);
    let bytes = watch.stream_command(&reply);
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());
    host.take_writes();

    let refusal = Command::new(AUTH_COMMAND_TYPE, 27, Body::Status(1));
    let bytes = watch.stream_command(&refusal);
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());

    assert_eq!(s.state(), ConnectionState::NotConnected);
    assert!(host.take_events().contains(&DeviceEvent::AuthenticationFailed));
}

#[test]
fn host_operations_need_a_session() {
    let mut host = Host::new();
    let mut s = session();

    assert_eq!(s.set_current_time(&mut host.ports()), Err(LinkError::NotConnected));
    assert_eq!(s.find_watch(true, &mut host.ports()), Err(LinkError::NotConnected));
    assert!(!s.send_configuration(PREF_TIMEFORMAT, &mut host.ports()));
    assert!(host.radio.is_empty());
}

// ── Inbound traffic ───────────────────────────────────────────

#[test]
fn device_state_push_reports_only_changes() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();
    host.take_ops();

    let push = |wearing| {
        Command::new(
            SYSTEM_COMMAND_TYPE,
            CMD_DEVICE_STATE,
            Body::System(SystemBody::DeviceState(DeviceState {
                wearing: Some(wearing),
                charging: None,
                sleep: None,
            })),
        )
    };

    // Unknown → worn is the first observation, not a change.
    let bytes = watch.stream_command(&push(1));
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());
    assert!(!host.take_events().iter().any(|e| matches!(e, DeviceEvent::Wearing(_))));

    let bytes = watch.stream_command(&push(2));
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());
    assert!(host.take_events().contains(&DeviceEvent::Wearing(WearingState::NotWorn)));
    assert_eq!(s.system().wearing_state(), WearingState::NotWorn);
}

#[test]
fn fitness_channel_is_forwarded_as_activity_data() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();

    let bytes = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![9, 8, 7]);
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());

    assert_eq!(host.take_events(), [DeviceEvent::ActivityData(vec![9, 8, 7])]);
}

#[test]
fn frames_split_across_reads_are_reassembled() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();

    let bytes = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![1; 40]);
    let (head, tail) = bytes.split_at(7);
    s.on_receive(Endpoint::Stream, head, &mut host.ports());
    assert!(host.events.events.is_empty());
    s.on_receive(Endpoint::Stream, tail, &mut host.ports());

    assert_eq!(host.take_events(), [DeviceEvent::ActivityData(vec![1; 40])]);
}

#[test]
fn unknown_command_is_dropped() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();
    host.take_ops();

    let bytes = watch.stream_command(&Command::request(9, 1));
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());

    assert!(host.take_events().is_empty());
    assert!(host.radio.is_empty());
    assert_eq!(s.state(), ConnectionState::Initialized);
}

#[test]
fn frames_that_fail_to_decrypt_are_dropped() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();

    let mut bytes = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![1, 2, 3]);
    let last_payload_byte = bytes.len() - 2;
    bytes[last_payload_byte] ^= 0xFF;
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());

    assert!(host.take_events().is_empty());
    assert_eq!(s.state(), ConnectionState::Initialized);
}

#[test]
fn delivery_from_another_thread() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();

    let bytes = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![4, 4]);
    let queue = s.queue();
    std::thread::spawn(move || assert!(queue.deliver(Endpoint::Stream, &bytes)))
        .join()
        .unwrap();

    assert!(host.events.events.is_empty());
    s.process_pending(&mut host.ports());
    assert_eq!(host.take_events(), [DeviceEvent::ActivityData(vec![4, 4])]);
}

#[test]
fn frame_larger_than_the_queue_is_received_whole() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();

    let big: Vec<u8> = (0..20_000u32).map(|i| i as u8).collect();
    let bytes = watch.stream_frame(Channel::Fitness, DataType::Encrypted, big.clone());
    assert!(bytes.len() > CHUNK_CAPACITY * 32);
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());
    assert_eq!(host.take_events(), [DeviceEvent::ActivityData(big)]);

    let bytes = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![1, 2, 3]);
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());
    assert_eq!(host.take_events(), [DeviceEvent::ActivityData(vec![1, 2, 3])]);
    assert_eq!(s.link().reassembler().buffered(), 0);
}

#[test]
fn dropped_read_does_not_poison_later_frames() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();

    // Half a frame gets through, the rest of it is lost with an overflowing read.
    let cut = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![5; 64]);
    assert!(s.deliver(Endpoint::Stream, &cut[..20]));
    let lost = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![6; 20_000]);
    assert!(!s.deliver(Endpoint::Stream, &lost));

    let next = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![7, 7]);
    assert!(s.deliver(Endpoint::Stream, &next));
    s.process_pending(&mut host.ports());

    assert_eq!(host.take_events(), [DeviceEvent::ActivityData(vec![7, 7])]);
    assert_eq!(s.link().reassembler().buffered(), 0);
}

#[test]
fn read_lost_from_the_queue_resyncs_direct_input() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_events();

    let cut = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![5; 64]);
    s.on_receive(Endpoint::Stream, &cut[..20], &mut host.ports());
    assert!(!s.deliver(Endpoint::Stream, &vec![0; CHUNK_CAPACITY * 40]));

    let next = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![8]);
    s.on_receive(Endpoint::Stream, &next, &mut host.ports());
    assert_eq!(host.take_events(), [DeviceEvent::ActivityData(vec![8])]);
}

// ── Outbound operations ───────────────────────────────────────

#[test]
fn time_sync_carries_zone_and_hour_format() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_ops();

    host.prefs.set(PREF_TIMEFORMAT, PREF_TIMEFORMAT_12H);
    assert!(s.send_configuration(PREF_TIMEFORMAT, &mut host.ports()));

    let writes = host.take_writes();
    assert_eq!(writes.len(), 1);
    let cmd = watch.read_stream(&writes[0].1);
    assert_eq!(cmd.subtype, CMD_CLOCK);
    let Body::System(SystemBody::Clock(clock)) = cmd.body else {
        panic!("expected clock body, got {:?}", cmd.body);
    };
    assert_eq!((clock.year, clock.month, clock.day, clock.hour), (2024, 6, 1, 9));
    assert_eq!(clock.zone_offset, 4);
    assert_eq!(clock.dst_offset, 4);
    assert_eq!(clock.zone_name, "Europe/Berlin");
    assert!(clock.is_not_24_hour);
}

// ── Host services ─────────────────────────────────────────────

struct Echo {
    seen: std::rc::Rc<std::cell::Cell<usize>>,
}

impl Service for Echo {
    fn command_type(&self) -> u8 {
        9
    }

    fn handle_command(&mut self, cmd: &Command, ctx: &mut ServiceContext<'_>) -> Result<(), LinkError> {
        self.seen.set(self.seen.get() + 1);
        ctx.out.send("echo", Command::new(9, cmd.subtype, cmd.body.clone()));
        Ok(())
    }
}

#[test]
fn registered_service_receives_its_category() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    let seen = std::rc::Rc::new(std::cell::Cell::new(0));
    s.register_service(Box::new(Echo { seen: seen.clone() })).unwrap();
    connect_stream(&mut s, &mut host, &mut watch);
    host.take_ops();

    let ping = Command::new(9, 3, Body::Raw(vec![1, 2]));
    let bytes = watch.stream_command(&ping);
    s.on_receive(Endpoint::Stream, &bytes, &mut host.ports());

    assert_eq!(seen.get(), 1);
    let writes = host.take_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(watch.read_stream(&writes[0].1), ping);
}

#[test]
fn builtin_categories_cannot_be_taken_over() {
    struct Impostor;
    impl Service for Impostor {
        fn command_type(&self) -> u8 {
            SYSTEM_COMMAND_TYPE
        }
        fn handle_command(&mut self, _: &Command, _: &mut ServiceContext<'_>) -> Result<(), LinkError> {
            Ok(())
        }
    }

    let mut s = session();
    assert_eq!(s.register_service(Box::new(Impostor)), Err(LinkError::Unsupported));
}

// ── Teardown ──────────────────────────────────────────────────

#[test]
fn disconnect_resets_connection_state() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);

    // Half a frame left in the reassembler.
    let bytes = watch.stream_frame(Channel::Fitness, DataType::Encrypted, vec![0; 16]);
    s.on_receive(Endpoint::Stream, &bytes[..9], &mut host.ports());
    assert!(s.link().reassembler().buffered() > 0);

    s.disconnect(&mut host.ports());

    assert_eq!(s.state(), ConnectionState::NotConnected);
    assert!(!s.handshake().is_authenticated());
    assert_eq!(s.link().frame_serial(), 0);
    assert_eq!(s.link().encryption_counter(), 0);
    assert_eq!(s.link().reassembler().buffered(), 0);
    assert_eq!(s.system().wearing_state(), WearingState::Unknown);
}

#[test]
fn reconnect_runs_a_fresh_handshake() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_stream(&mut s, &mut host, &mut watch);
    s.disconnect(&mut host.ports());
    host.take_ops();

    let mut watch = Watch::new(SECRET);
    connect_stream(&mut s, &mut host, &mut watch);
    assert_eq!(s.state(), ConnectionState::Initialized);
}
