//! End-to-end tests for the device gateway over real TCP connections.
//!
//! Each test binds the gateway on an ephemeral port, connects a fake
//! device through the real codec, and drives the full path: login and
//! registration, acknowledgement serials, operator command dispatch and
//! disconnect cleanup.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracklock_core::constants::DEFAULT_CRC_SECRET;
use tracklock_core::Imei;
use tracklock_gateway::{
    CommandDispatcher, DeviceRegistry, DeviceServer, DispatchError, EventSink, GatewayConfig,
};
use tracklock_protocol::{
    DeviceCommand, DeviceStatus, Frame, HeartbeatData, Hemisphere, Language, LoginData, Payload,
    ProtocolType, SignalStrength, StartMarker, TimezoneLanguage, TrackerCodec,
};

type Device = Framed<TcpStream, TrackerCodec>;

async fn start_gateway() -> (std::net::SocketAddr, DeviceRegistry, CommandDispatcher) {
    let registry = DeviceRegistry::new();
    // Collector endpoint points at a closed port; delivery failures are
    // logged and must not affect protocol behavior.
    let config = GatewayConfig::from_lookup(|key| match key {
        "ENDPOINT" => Some("http://127.0.0.1:9/events".to_string()),
        _ => None,
    })
    .unwrap();
    let sink = EventSink::new(&config).unwrap();

    let server = DeviceServer::bind("127.0.0.1:0", registry.clone(), sink, DEFAULT_CRC_SECRET)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    (addr, registry.clone(), CommandDispatcher::new(registry))
}

async fn connect(addr: std::net::SocketAddr) -> Device {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, TrackerCodec::new())
}

fn login_frame(serial: u16) -> Frame {
    Frame {
        start: StartMarker::Short,
        protocol: ProtocolType::Login,
        payload: Payload::Login(LoginData {
            imei: Imei::from_wire(&[0x00, 0x00, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78]),
            model: 0x0001,
            timezone: TimezoneLanguage {
                offset: 0x1E0,
                hemisphere: Hemisphere::Eastern,
                language: 2,
            },
        }),
        serial,
    }
}

fn heartbeat_frame(serial: u16) -> Frame {
    Frame {
        start: StartMarker::Short,
        protocol: ProtocolType::Heartbeat,
        payload: Payload::Heartbeat(HeartbeatData {
            status: DeviceStatus::default(),
            voltage: 402,
            signal: SignalStrength::Good,
            external_port: 0,
            language: Language::English,
        }),
        serial,
    }
}

async fn recv(device: &mut Device) -> Frame {
    tokio::time::timeout(Duration::from_secs(5), device.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed")
        .expect("decode error")
}

async fn wait_for_registration(registry: &DeviceRegistry, imei: &Imei) {
    for _ in 0..100 {
        if registry.lookup(imei).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("device {imei} was never registered");
}

fn imei() -> Imei {
    Imei::new("12345678").unwrap()
}

#[tokio::test]
async fn test_login_is_acked_and_registered() {
    let (addr, registry, _dispatcher) = start_gateway().await;
    let mut device = connect(addr).await;

    device.send(login_frame(1)).await.unwrap();

    let ack = recv(&mut device).await;
    assert_eq!(ack.protocol, ProtocolType::Login);
    assert_eq!(ack.start, StartMarker::Short);
    assert_eq!(ack.serial, 1);

    wait_for_registration(&registry, &imei()).await;
    assert_eq!(registry.identities(), vec![imei()]);
}

#[tokio::test]
async fn test_ack_serials_increase_per_reply() {
    let (addr, _registry, _dispatcher) = start_gateway().await;
    let mut device = connect(addr).await;

    device.send(login_frame(1)).await.unwrap();
    assert_eq!(recv(&mut device).await.serial, 1);

    device.send(heartbeat_frame(2)).await.unwrap();
    let ack = recv(&mut device).await;
    assert_eq!(ack.protocol, ProtocolType::Heartbeat);
    assert_eq!(ack.serial, 2);

    device.send(heartbeat_frame(3)).await.unwrap();
    assert_eq!(recv(&mut device).await.serial, 3);
}

#[tokio::test]
async fn test_unlock_dispatch_reaches_device() {
    let (addr, registry, dispatcher) = start_gateway().await;
    let mut device = connect(addr).await;

    device.send(login_frame(1)).await.unwrap();
    recv(&mut device).await;
    wait_for_registration(&registry, &imei()).await;

    dispatcher.dispatch(&imei(), DeviceCommand::Unlock).unwrap();

    let frame = recv(&mut device).await;
    assert_eq!(frame.protocol, ProtocolType::Command);
    assert_eq!(frame.start, StartMarker::Long);
    assert_eq!(frame.serial, 2);
    match frame.payload {
        Payload::Command(cmd) => {
            assert_eq!(cmd.server_flag, 0);
            assert_eq!(cmd.content.as_ref(), b"UNLOCK#");
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    // Exactly one frame was produced.
    let extra = tokio::time::timeout(Duration::from_millis(200), device.next()).await;
    assert!(extra.is_err(), "unexpected extra frame: {extra:?}");
}

#[tokio::test]
async fn test_dispatch_to_unknown_identity() {
    let (addr, registry, dispatcher) = start_gateway().await;
    let mut device = connect(addr).await;

    device.send(login_frame(1)).await.unwrap();
    recv(&mut device).await;
    wait_for_registration(&registry, &imei()).await;

    let unknown = Imei::new("deadbeef").unwrap();
    let result = dispatcher.dispatch(&unknown, DeviceCommand::Unlock);
    assert!(matches!(result, Err(DispatchError::NotFound(_))));

    // The registered device saw no frame.
    let extra = tokio::time::timeout(Duration::from_millis(200), device.next()).await;
    assert!(extra.is_err(), "unexpected frame: {extra:?}");
}

#[tokio::test]
async fn test_disconnect_unregisters() {
    let (addr, registry, _dispatcher) = start_gateway().await;
    let mut device = connect(addr).await;

    device.send(login_frame(1)).await.unwrap();
    recv(&mut device).await;
    wait_for_registration(&registry, &imei()).await;

    drop(device);

    for _ in 0..100 {
        if registry.lookup(&imei()).is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("device was never unregistered after disconnect");
}

#[tokio::test]
async fn test_relogin_supersedes_and_routes_to_new_connection() {
    let (addr, registry, dispatcher) = start_gateway().await;

    let mut first = connect(addr).await;
    first.send(login_frame(1)).await.unwrap();
    recv(&mut first).await;
    wait_for_registration(&registry, &imei()).await;
    let first_conn = registry.lookup(&imei()).unwrap().conn_id();

    let mut second = connect(addr).await;
    second.send(login_frame(1)).await.unwrap();
    recv(&mut second).await;
    for _ in 0..100 {
        if registry.lookup(&imei()).unwrap().conn_id() != first_conn {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    dispatcher.dispatch(&imei(), DeviceCommand::Ring).unwrap();

    // The new connection receives the command...
    let frame = recv(&mut second).await;
    assert_eq!(frame.protocol, ProtocolType::Command);

    // ...the superseded one stays open but silent.
    let extra = tokio::time::timeout(Duration::from_millis(200), first.next()).await;
    assert!(extra.is_err(), "superseded connection got a frame: {extra:?}");

    // The superseded connection closing must not evict the registration.
    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.lookup(&imei()).is_some());
}

#[tokio::test]
async fn test_corrupt_frame_keeps_connection_alive() {
    let (addr, _registry, _dispatcher) = start_gateway().await;
    let mut device = connect(addr).await;

    // Hand-corrupt an encoded login frame before sending the real one.
    let mut corrupted = login_frame(1).encode().unwrap();
    corrupted[5] ^= 0x01;
    use tokio::io::AsyncWriteExt;
    device.get_mut().write_all(&corrupted).await.unwrap();

    device.send(login_frame(2)).await.unwrap();
    let ack = recv(&mut device).await;
    assert_eq!(ack.protocol, ProtocolType::Login);
}
