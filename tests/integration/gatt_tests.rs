//! Session tests over the GATT link.

use wearlink::app::commands::{AuthBody, Body, Command};
use wearlink::app::events::DeviceEvent;
use wearlink::app::system::SYSTEM_COMMAND_TYPE;
use wearlink::config::Capabilities;
use wearlink::error::LinkError;
use wearlink::link::auth::{AUTH_COMMAND_TYPE, CMD_SEND_USERID};
use wearlink::link::channels::CHUNK_CAPACITY;
use wearlink::link::gatt::{bt_uuid, GattLink, MTU_REQUEST, TEMPLATES};
use wearlink::link::transport::{ConnectionState, DiscoveredService, Discovery, Endpoint, Op};
use wearlink::Session;

use crate::mocks::{config, connect_gatt, gatt_discovery, Host, Watch, SECRET};

fn session() -> Session<GattLink> {
    Session::new(GattLink::default(), &config(), Capabilities::default()).unwrap()
}

#[test]
fn startup_orders_mtu_and_subscriptions_before_handshake() {
    let t = &TEMPLATES[0];
    let mut host = Host::new();
    let mut s = session();

    s.connect(&gatt_discovery(0), &mut host.ports()).unwrap();

    let ops = host.take_ops();
    assert_eq!(ops[0], Op::RequestMtu(MTU_REQUEST));
    assert_eq!(ops[1], Op::SetState(ConnectionState::Initializing));
    assert_eq!(
        ops[2..6],
        [
            Op::Subscribe(Endpoint::Resource(t.command_write)),
            Op::Subscribe(Endpoint::Resource(t.command_read)),
            Op::Subscribe(Endpoint::Resource(t.activity_data)),
            Op::Subscribe(Endpoint::Resource(t.data_upload)),
        ]
    );
    let Op::Write { endpoint, .. } = &ops[6] else {
        panic!("expected handshake write, got {:?}", ops[6]);
    };
    assert_eq!(*endpoint, Endpoint::Resource(t.command_write));
    assert_eq!(ops.len(), 7);
}

#[test]
fn partial_layout_waits_for_reconnect() {
    let t = &TEMPLATES[0];
    let mut host = Host::new();
    let mut s = session();
    let discovery = Discovery {
        services: vec![DiscoveredService {
            uuid: t.service,
            characteristics: vec![t.command_read, t.command_write],
        }],
    };

    assert_eq!(
        s.connect(&discovery, &mut host.ports()),
        Err(LinkError::ResourceIncomplete)
    );
    assert_eq!(s.state(), ConnectionState::WaitingForReconnect);
    assert!(host.radio.is_empty());
}

#[test]
fn unknown_layout_is_refused() {
    let mut host = Host::new();
    let mut s = session();
    let discovery = Discovery {
        services: vec![DiscoveredService {
            uuid: bt_uuid(0x180F),
            characteristics: vec![bt_uuid(0x2A19)],
        }],
    };

    assert_eq!(s.connect(&discovery, &mut host.ports()), Err(LinkError::UnknownService));
    assert_eq!(s.state(), ConnectionState::NotConnected);
}

#[test]
fn encrypted_service_handshake_and_counters() {
    let t = &TEMPLATES[0];
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();

    connect_gatt(&mut s, &mut host, &mut watch);
    assert_eq!(s.state(), ConnectionState::Initialized);

    let writes = host.take_writes();
    assert_eq!(writes.len(), 6);
    for (i, (endpoint, value)) in writes.iter().enumerate() {
        assert_eq!(*endpoint, Endpoint::Resource(t.command_write));
        assert_eq!(u16::from_le_bytes([value[0], value[1]]), i as u16 + 1);
        assert_eq!(watch.read_value(value).kind, SYSTEM_COMMAND_TYPE);
    }
    let bound = s.link().bound().unwrap();
    assert_eq!(bound.command_write.counter(), 6);
    assert_eq!(bound.data_upload.counter(), 0);
}

#[test]
fn clear_text_service_sends_user_id() {
    let t = &TEMPLATES[1];
    let mut host = Host::new();
    let mut s = session();

    s.connect(&gatt_discovery(1), &mut host.ports()).unwrap();
    let writes = host.take_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, Endpoint::Resource(t.command_write));
    let hello = Command::from_bytes(&writes[0].1).unwrap();
    assert_eq!((hello.kind, hello.subtype), (AUTH_COMMAND_TYPE, CMD_SEND_USERID));
    assert_eq!(hello.body, Body::Auth(AuthBody::UserId("1234567890".into())));

    let ack = Command::new(AUTH_COMMAND_TYPE, CMD_SEND_USERID, Body::Status(0));
    s.on_receive(
        Endpoint::Resource(t.command_read),
        &ack.to_bytes().unwrap(),
        &mut host.ports(),
    );

    assert_eq!(s.state(), ConnectionState::Initialized);
    assert!(s.handshake().cipher().is_none());
    let writes = host.take_writes();
    assert_eq!(writes.len(), 6);
    for (_, value) in &writes {
        // Plain postcard, no counter prefix.
        assert_eq!(Command::from_bytes(value).unwrap().kind, SYSTEM_COMMAND_TYPE);
    }
}

#[test]
fn activity_characteristic_feeds_activity_data() {
    let t = &TEMPLATES[0];
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_gatt(&mut s, &mut host, &mut watch);
    host.take_events();

    let ping = Command::new(0, 0, Body::Raw(vec![3, 1, 4]));
    let value = watch.value_command(&ping);
    s.on_receive(Endpoint::Resource(t.activity_data), &value, &mut host.ports());

    assert_eq!(
        host.take_events(),
        [DeviceEvent::ActivityData(ping.to_bytes().unwrap())]
    );
}

#[test]
fn oversized_notification_is_refused() {
    let t = &TEMPLATES[0];
    let s = session();
    let value = vec![0u8; CHUNK_CAPACITY + 1];
    assert!(!s.deliver(Endpoint::Resource(t.command_read), &value));
    assert!(s.deliver(Endpoint::Stream, &value));
}

#[test]
fn disconnect_unbinds_resources() {
    let mut host = Host::new();
    let mut watch = Watch::new(SECRET);
    let mut s = session();
    connect_gatt(&mut s, &mut host, &mut watch);

    s.disconnect(&mut host.ports());

    assert!(s.link().bound().is_none());
    assert_eq!(s.state(), ConnectionState::NotConnected);
    assert_eq!(s.find_phone_stop(&mut host.ports()), Err(LinkError::NotConnected));
}
