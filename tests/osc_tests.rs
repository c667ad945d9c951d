use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};

use pigpen::config::Settings;
use pigpen::driver::MockBackend;
use pigpen::osc::commands::{command_names, dispatch};
use pigpen::osc::{CommandError, OscServer, Responder};
use pigpen::{Engine, SharedBackend};

fn tokens(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn test_engine(settings: Settings) -> Engine {
    let driver: SharedBackend = Arc::new(Mutex::new(MockBackend::new()));
    Engine::new(settings, driver)
}

#[test]
fn test_dispatch_unknown_command() {
    let engine = test_engine(Settings::default());
    let err = dispatch(&engine, "squeal", &tokens(&[])).unwrap_err();
    assert!(matches!(err, CommandError::UnknownCommand(_)));
}

#[test]
fn test_dispatch_argument_validation() {
    let engine = test_engine(Settings::default());
    let err = dispatch(&engine, "new-operator", &tokens(&[])).unwrap_err();
    assert!(matches!(err, CommandError::ArgCount { expected: 1, got: 0 }));

    let err = dispatch(&engine, "connect", &tokens(&["nope", "nada"])).unwrap_err();
    assert!(matches!(err, CommandError::Graph(_)));
}

#[test]
fn test_q_commands_lists_table() {
    let engine = test_engine(Settings::default());
    let listed = dispatch(&engine, "q-commands", &tokens(&[])).unwrap();
    for name in ["ping", "new-operator", "connect", "panic", "batch"] {
        assert!(listed.contains(&name.to_string()), "missing {}", name);
    }
    assert_eq!(listed.len(), command_names().len());
}

#[test]
fn test_q_midi_ports_reach_driver() {
    let engine = test_engine(Settings::default());
    let inputs = dispatch(&engine, "q-midi-inputs", &tokens(&[])).unwrap();
    assert_eq!(inputs, vec!["Mock Input A", "Mock Input B"]);
    let outputs = dispatch(&engine, "q-midi-outputs", &tokens(&[])).unwrap();
    assert_eq!(outputs, vec!["Mock Output A", "Mock Output B"]);
}

#[test]
fn test_batch_script_runs_and_reports_failures() {
    let engine = test_engine(Settings::default());
    let path = std::env::temp_dir().join(format!("pigpen-batch-{}.txt", std::process::id()));
    std::fs::write(
        &path,
        "# build a little graph\nnew-operator Monitor mon\nnew-operator Distributor dist\nconnect dist mon\nconnect dist ghost\n",
    )
    .unwrap();

    let report = dispatch(&engine, "batch", &tokens(&[&path.to_string_lossy()])).unwrap();
    assert_eq!(report.len(), 4);
    assert!(report[3].contains("failed"));

    let listed = dispatch(&engine, "q-operators", &tokens(&[])).unwrap();
    assert_eq!(listed.len(), 2);

    std::fs::remove_file(path).ok();
}

fn send_command(socket: &UdpSocket, server: &str, addr: &str, args: Vec<OscType>) {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    let bytes = encoder::encode(&packet).unwrap();
    socket.send_to(&bytes, server).unwrap();
}

fn recv_reply(socket: &UdpSocket) -> OscMessage {
    let mut buf = [0u8; decoder::MTU];
    let (len, _) = socket.recv_from(&mut buf).expect("no reply before timeout");
    match decoder::decode_udp(&buf[..len]).unwrap().1 {
        OscPacket::Message(msg) => msg,
        other => panic!("unexpected packet {:?}", other),
    }
}

fn reply_strings(msg: &OscMessage) -> Vec<String> {
    msg.args
        .iter()
        .filter_map(|a| match a {
            OscType::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_udp_round_trip() {
    // Fixed ports for the round trip; out of the default range so a running
    // engine does not interfere.
    let mut settings = Settings::default();
    settings.server_port = 17820;
    settings.client_port = 17821;

    let client = UdpSocket::bind("127.0.0.1:17821").unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();

    let engine = test_engine(settings.clone());
    let responder = Responder::new(&settings).unwrap();
    let server = OscServer::spawn(engine.clone(), responder).unwrap();
    let server_addr = settings.server_addr();

    send_command(
        &client,
        &server_addr,
        "/pig/new-operator",
        vec![
            OscType::String("Monitor".to_string()),
            OscType::String("foo".to_string()),
        ],
    );
    let reply = recv_reply(&client);
    assert_eq!(reply.addr, "/pig-client/ACK");
    let strings = reply_strings(&reply);
    assert_eq!(strings[0], "/pig/new-operator");
    assert_eq!(strings[1], "foo");

    send_command(&client, &server_addr, "/pig/q-operators", vec![]);
    let reply = recv_reply(&client);
    assert_eq!(reply.addr, "/pig-client/ACK");
    assert!(reply_strings(&reply).contains(&"Monitor, foo".to_string()));

    // A bad command produces a paired ERROR with the failure text.
    send_command(
        &client,
        &server_addr,
        "/pig/delete-operator",
        vec![OscType::String("ghost".to_string())],
    );
    let reply = recv_reply(&client);
    assert_eq!(reply.addr, "/pig-client/ERROR");
    let strings = reply_strings(&reply);
    assert_eq!(strings[0], "/pig/delete-operator");
    assert!(strings[1].contains("ghost"));

    // Channel validation rejects 0 and 17 at the wire.
    send_command(
        &client,
        &server_addr,
        "/pig/new-operator",
        vec![
            OscType::String("Distributor".to_string()),
            OscType::String("dist".to_string()),
        ],
    );
    recv_reply(&client);
    for channel in ["0", "17"] {
        send_command(
            &client,
            &server_addr,
            "/pig/op",
            vec![
                OscType::String("dist".to_string()),
                OscType::String("select-channel".to_string()),
                OscType::String(channel.to_string()),
            ],
        );
        let reply = recv_reply(&client);
        assert_eq!(reply.addr, "/pig-client/ERROR");
    }

    send_command(&client, &server_addr, "/pig/exit", vec![]);
    let reply = recv_reply(&client);
    assert_eq!(reply.addr, "/pig-client/ACK");
    server.join().unwrap();
    assert!(engine.shutdown_requested());
}
