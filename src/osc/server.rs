//! UDP receive loop and address-prefixed dispatch.

use std::io;
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use rosc::{decoder, OscPacket, OscType};

use crate::osc::commands;
use crate::osc::Responder;
use crate::Engine;

pub struct OscServer;

impl OscServer {
    /// Bind the configured server endpoint and run the receive loop on its
    /// own thread. The loop wakes periodically to observe shutdown.
    pub fn spawn(engine: Engine, responder: Responder) -> io::Result<thread::JoinHandle<()>> {
        let addr = engine.settings.server_addr();
        let socket = UdpSocket::bind(&addr)?;
        socket.set_read_timeout(Some(Duration::from_millis(250)))?;
        info!("OSC server listening on {}", addr);
        Ok(thread::spawn(move || run_server(engine, responder, socket)))
    }
}

fn run_server(engine: Engine, responder: Responder, socket: UdpSocket) {
    let prefix = format!("/{}/", engine.settings.server_root);
    let mut buf = [0u8; decoder::MTU];
    loop {
        if engine.shutdown_requested() {
            break;
        }
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _peer)) => len,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                error!("OSC receive failed: {}", e);
                break;
            }
        };
        match decoder::decode_udp(&buf[..len]) {
            Ok((_, packet)) => handle_packet(&engine, &responder, &prefix, packet),
            Err(e) => warn!("undecodable OSC packet: {}", e),
        }
    }
    info!("OSC server stopped");
}

fn handle_packet(engine: &Engine, responder: &Responder, prefix: &str, packet: OscPacket) {
    match packet {
        OscPacket::Message(msg) => {
            let Some(command) = msg.addr.strip_prefix(prefix) else {
                warn!("ignoring message outside /{}: {}", engine.settings.server_root, msg.addr);
                return;
            };
            let tokens: Vec<String> = msg.args.iter().map(token).collect();
            let result = commands::dispatch(engine, command, &tokens);
            if let Err(e) = &result {
                warn!("{} failed: {}", msg.addr, e);
            }
            responder.respond(&msg.addr, &result);
        }
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                handle_packet(engine, responder, prefix, inner);
            }
        }
    }
}

/// Flatten a typed OSC argument to the dialect's token form; the validator
/// re-types it against the command template.
fn token(arg: &OscType) -> String {
    match arg {
        OscType::String(s) => s.clone(),
        OscType::Int(v) => v.to_string(),
        OscType::Long(v) => v.to_string(),
        OscType::Float(v) => v.to_string(),
        OscType::Double(v) => v.to_string(),
        OscType::Bool(v) => v.to_string(),
        other => format!("{:?}", other),
    }
}
