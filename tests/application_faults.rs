//! Application faults driven through the registry, the way a test driver
//! selects and runs them

use realtime_faults::faults::catalog::{application, ALL_FAULTS};
use realtime_faults::protocol::{JsonCodec, PresenceAction, ProtocolAction, ProtocolCodec};
use realtime_faults::{
    Action, ApplicationProxy, ConnectionParams, FaultRegistry, FaultSimulation, Frame,
    FrameDirection, HarnessConfig, Message, ProxyHandle,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const APPLICATION_FAULTS: &[&str] = &[
    application::NULL,
    application::ATTACH_UNRESPONSIVE,
    application::DETACH_UNRESPONSIVE,
    application::ENTER_UNRESPONSIVE,
    application::DISCONNECT_WITH_FAILED_RESUME,
    application::ENTER_FAILED_WITH_NONFATAL_NACK,
    application::UPDATE_FAILED_WITH_NONFATAL_NACK,
    application::REENTER_ON_RESUME_FAILED,
];

fn encode(msg: &Message) -> Frame {
    Frame::Binary(JsonCodec.encode(msg).unwrap())
}

fn decode(frame: &Frame) -> Message {
    JsonCodec.decode(frame.binary_payload().unwrap()).unwrap()
}

fn presence(action: PresenceAction, serial: i64) -> Frame {
    encode(
        &Message::with_action(ProtocolAction::Presence)
            .with_field("channel", "room")
            .with_field("msgSerial", serial)
            .with_field("presence", json!([{ "action": action.code(), "clientId": "alice" }])),
    )
}

fn ack(serial: i64) -> Frame {
    encode(
        &Message::with_action(ProtocolAction::Ack)
            .with_field("msgSerial", serial)
            .with_field("count", 1),
    )
}

/// Simulate `name` and return it with its started Layer 7 proxy
fn armed(registry: &FaultRegistry, name: &str) -> (Box<dyn FaultSimulation>, Arc<dyn ApplicationProxy>) {
    let simulation = registry.simulate(name, "it").unwrap();
    let proxy = match simulation.proxy() {
        ProxyHandle::Application(proxy) => proxy,
        ProxyHandle::Transport(_) => panic!("{} is not an application-layer fault", name),
    };
    proxy.start().unwrap();
    simulation.enable().unwrap();
    (simulation, proxy)
}

/// A mixed stream of frames a client session might produce
fn traffic() -> Vec<(FrameDirection, Frame)> {
    use FrameDirection::*;
    vec![
        (ClientToServer, encode(&Message::with_action(ProtocolAction::Attach))),
        (ServerToClient, encode(&Message::with_action(ProtocolAction::Attached))),
        (ClientToServer, presence(PresenceAction::Enter, 0)),
        (ServerToClient, ack(0)),
        (ServerToClient, encode(&Message::with_action(ProtocolAction::Sync).with_field("presence", json!([{ "action": 1 }])))),
        (ClientToServer, presence(PresenceAction::Update, 1)),
        (ClientToServer, encode(&Message::with_action(ProtocolAction::Detach))),
        (ServerToClient, Frame::Text("{\"action\":0}".into())),
        (ClientToServer, Frame::binary(vec![0xff, 0x00, 0x13])),
        (ServerToClient, Frame::Close),
    ]
}

#[test]
fn test_reenter_on_resume_failed_end_to_end() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    let (simulation, proxy) = armed(&registry, application::REENTER_ON_RESUME_FAILED);
    let slot = proxy.interceptor();
    use FrameDirection::*;

    slot.intercept_connection(ConnectionParams::new().with_param("key", "k"));
    let attach = encode(&Message::with_action(ProtocolAction::Attach));
    assert_eq!(slot.intercept_frame(ClientToServer, attach.clone()), Action::pass(ClientToServer, attach));

    // State 1: the first PRESENCE goes out, followed by a forced close
    let actions = slot.intercept_frame(ClientToServer, presence(PresenceAction::Enter, 0));
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].direction, ClientToServer);
    assert!(actions[1].send_and_close);
    assert_eq!(actions[1].direction, ServerToClient);

    // The client resumes; its parameters are untouched
    let resume = ConnectionParams::new().with_resume("abc!conn123-xyz");
    assert_eq!(slot.intercept_connection(resume.clone()), resume);

    // State 2: the server's SYNC loses its members
    let sync = encode(
        &Message::with_action(ProtocolAction::Sync)
            .with_field("channel", "room")
            .with_field("presence", json!([{ "action": 1, "clientId": "alice" }])),
    );
    let actions = slot.intercept_frame(ServerToClient, sync);
    assert_eq!(actions.len(), 1);
    let rewritten = decode(&actions[0].frame);
    assert!(rewritten.is_action(ProtocolAction::Sync));
    assert_eq!(rewritten.get("presence"), Some(&json!([])));

    // State 3: re-entry passes through and its serial is remembered
    let reenter = presence(PresenceAction::Enter, 7);
    assert_eq!(slot.intercept_frame(ClientToServer, reenter.clone()), Action::pass(ClientToServer, reenter));

    // State 4: an unrelated ACK passes, the matching one becomes a NACK
    let other = ack(5);
    assert_eq!(slot.intercept_frame(ServerToClient, other.clone()), Action::pass(ServerToClient, other));
    let actions = slot.intercept_frame(ServerToClient, ack(7));
    assert_eq!(actions.len(), 1);
    let nack = decode(&actions[0].frame);
    assert!(nack.is_action(ProtocolAction::Nack));
    assert_eq!(nack.msg_serial(), Some(7));
    assert_eq!(nack.get("error").unwrap()["statusCode"], json!(500));

    // State 5: everything passes
    for (direction, frame) in traffic() {
        assert_eq!(slot.intercept_frame(direction, frame.clone()), Action::pass(direction, frame));
    }

    simulation.clean_up();
    assert!(!proxy.is_running());
}

#[test]
fn test_presence_nack_limit_from_config() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default().with_nack_limit(2));
    let (simulation, proxy) = armed(&registry, application::ENTER_FAILED_WITH_NONFATAL_NACK);
    let slot = proxy.interceptor();

    for serial in 0..2 {
        let actions = slot.intercept_frame(FrameDirection::ClientToServer, presence(PresenceAction::Enter, serial));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].direction, FrameDirection::ServerToClient);
        assert_eq!(decode(&actions[0].frame).msg_serial(), Some(serial));
    }
    let third = presence(PresenceAction::Enter, 2);
    assert_eq!(
        slot.intercept_frame(FrameDirection::ClientToServer, third.clone()),
        Action::pass(FrameDirection::ClientToServer, third)
    );
    simulation.clean_up();
}

#[test]
fn test_failed_resume_through_registry() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    let (simulation, proxy) = armed(&registry, application::DISCONNECT_WITH_FAILED_RESUME);
    let slot = proxy.interceptor();

    slot.intercept_connection(ConnectionParams::from_query("key=k"));
    let closes: usize = traffic()
        .into_iter()
        .map(|(direction, frame)| slot.intercept_frame(direction, frame))
        .map(|actions| actions.iter().filter(|a| a.send_and_close).count())
        .sum();
    assert_eq!(closes, 1);

    let params = slot.intercept_connection(ConnectionParams::from_query("key=k&resume=abc%21conn123-xyz"));
    assert_eq!(params.resume.as_deref(), Some("abc!FakeFakeFakeFake-xyz"));
    simulation.clean_up();
}

#[test]
fn test_resolve_restores_pass_through_for_every_fault() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    for name in APPLICATION_FAULTS {
        let (simulation, proxy) = armed(&registry, name);
        let slot = proxy.interceptor();

        // Drive the fault part-way into its cycle
        slot.intercept_connection(ConnectionParams::new());
        for (direction, frame) in traffic().into_iter().take(3) {
            slot.intercept_frame(direction, frame);
        }

        simulation.resolve().unwrap();

        let params = ConnectionParams::new().with_resume("abc!conn123-xyz").with_param("key", "k");
        assert_eq!(slot.intercept_connection(params.clone()), params, "{}", name);
        for (direction, frame) in traffic() {
            assert_eq!(
                slot.intercept_frame(direction, frame.clone()),
                Action::pass(direction, frame),
                "{} still interfering after resolve",
                name
            );
        }
        simulation.clean_up();
    }
}

#[test]
fn test_clean_up_without_enable_is_safe() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    for name in ALL_FAULTS {
        let simulation = registry.simulate(name, "never-enabled").unwrap();
        simulation.clean_up();
        simulation.clean_up();
        assert!(!simulation.proxy().is_running(), "{}", name);
    }
}

#[test]
fn test_fresh_simulations_do_not_share_state() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    let (first, first_proxy) = armed(&registry, application::ATTACH_UNRESPONSIVE);
    let (second, second_proxy) = armed(&registry, application::ATTACH_UNRESPONSIVE);

    let attach = || encode(&Message::with_action(ProtocolAction::Attach));
    assert!(first_proxy.interceptor().intercept_frame(FrameDirection::ClientToServer, attach()).is_empty());
    assert!(second_proxy.interceptor().intercept_frame(FrameDirection::ClientToServer, attach()).is_empty());

    first.clean_up();
    second.clean_up();
}

#[test]
fn test_concurrent_presence_nacks_respect_limit() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default().with_nack_limit(3));
    let (simulation, proxy) = armed(&registry, application::ENTER_FAILED_WITH_NONFATAL_NACK);
    let nacks = AtomicUsize::new(0);

    thread::scope(|scope| {
        for worker in 0..8i64 {
            let slot = proxy.interceptor();
            let nacks = &nacks;
            scope.spawn(move || {
                for n in 0..4 {
                    let actions = slot.intercept_frame(
                        FrameDirection::ClientToServer,
                        presence(PresenceAction::Enter, worker * 10 + n),
                    );
                    assert_eq!(actions.len(), 1);
                    if actions[0].direction == FrameDirection::ServerToClient {
                        nacks.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(nacks.load(Ordering::SeqCst), 3);
    simulation.clean_up();
}

#[test]
fn test_concurrent_drops_respect_limit() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    let (simulation, proxy) = armed(&registry, application::ATTACH_UNRESPONSIVE);
    proxy.interceptor().intercept_connection(ConnectionParams::new());
    let dropped = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..4 {
            let slot = proxy.interceptor();
            let dropped = &dropped;
            scope.spawn(move || {
                for _ in 0..8 {
                    let attach = encode(&Message::with_action(ProtocolAction::Attach));
                    if slot.intercept_frame(FrameDirection::ClientToServer, attach).is_empty() {
                        dropped.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    // One ATTACH is swallowed no matter how many threads race for it
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    simulation.clean_up();
}

#[test]
fn test_resolve_racing_traffic_leaves_pass_through() {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    for name in APPLICATION_FAULTS {
        let (simulation, proxy) = armed(&registry, name);

        thread::scope(|scope| {
            for _ in 0..3 {
                let slot = proxy.interceptor();
                scope.spawn(move || {
                    for _ in 0..20 {
                        slot.intercept_connection(ConnectionParams::new());
                        for (direction, frame) in traffic() {
                            slot.intercept_frame(direction, frame);
                        }
                    }
                });
            }
            scope.spawn(|| simulation.resolve().unwrap());
        });

        let slot = proxy.interceptor();
        for (direction, frame) in traffic() {
            assert_eq!(
                slot.intercept_frame(direction, frame.clone()),
                Action::pass(direction, frame),
                "{} interfering after a racing resolve",
                name
            );
        }
        simulation.clean_up();
    }
}
