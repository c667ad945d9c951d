//! ACK/ERROR replies.
//!
//! Every handled command produces exactly one reply to the configured
//! client endpoint: `/<client-root>/ACK <source> <payload...>` on success,
//! `/<client-root>/ERROR <source> <text> <payload...>` on failure. The same
//! payload is mirrored to the local terminal, and, when configured, the
//! most recent reply overwrites a response file.

use std::fs;
use std::io;
use std::net::UdpSocket;
use std::path::PathBuf;

use console::style;
use log::{debug, warn};
use rosc::{encoder, OscMessage, OscPacket, OscType};

use crate::config::Settings;
use crate::osc::CommandError;
use crate::paths;

pub struct Responder {
    socket: UdpSocket,
    client_addr: String,
    client_root: String,
    response_file: Option<PathBuf>,
    color: bool,
}

impl Responder {
    pub fn new(settings: &Settings) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Responder {
            socket,
            client_addr: settings.client_addr(),
            client_root: settings.client_root.clone(),
            response_file: settings
                .response_file
                .as_deref()
                .map(paths::expand),
            color: settings.color,
        })
    }

    pub fn respond(&self, source: &str, result: &Result<Vec<String>, CommandError>) {
        match result {
            Ok(payload) => self.ack(source, payload),
            Err(e) => self.error(source, &e.to_string(), &[]),
        }
    }

    pub fn ack(&self, source: &str, payload: &[String]) {
        let addr = format!("/{}/ACK", self.client_root);
        self.send_osc(&addr, source, None, payload);
        render_terminal(self.color, "ACK", source, payload);
        self.write_file("ACK", source, payload);
    }

    pub fn error(&self, source: &str, text: &str, payload: &[String]) {
        let addr = format!("/{}/ERROR", self.client_root);
        self.send_osc(&addr, source, Some(text), payload);
        let mut lines = vec![text.to_string()];
        lines.extend_from_slice(payload);
        render_terminal(self.color, "ERROR", source, &lines);
        self.write_file("ERROR", source, &lines);
    }

    fn send_osc(&self, addr: &str, source: &str, error_text: Option<&str>, payload: &[String]) {
        let mut args = vec![OscType::String(source.to_string())];
        if let Some(text) = error_text {
            args.push(OscType::String(text.to_string()));
        }
        args.extend(payload.iter().map(|s| OscType::String(s.clone())));

        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        match encoder::encode(&packet) {
            Ok(bytes) => {
                // Fire and forget; an absent client is not an error.
                if let Err(e) = self.socket.send_to(&bytes, &self.client_addr) {
                    debug!("response to {} not delivered: {}", self.client_addr, e);
                }
            }
            Err(e) => warn!("could not encode response: {}", e),
        }
    }

    fn write_file(&self, status: &str, source: &str, payload: &[String]) {
        let Some(path) = &self.response_file else {
            return;
        };
        let mut text = format!("{} {}\n", status, source);
        for line in payload {
            text.push_str(line);
            text.push('\n');
        }
        if let Err(e) = fs::write(path, text) {
            warn!("could not write response file {}: {}", path.display(), e);
        }
    }
}

/// Print one reply to the local terminal. The REPL uses this directly for
/// commands that never crossed the wire.
pub fn render_terminal(color: bool, status: &str, source: &str, payload: &[String]) {
    if color {
        let tag = if status == "ACK" {
            style(status).green().bold()
        } else {
            style(status).red().bold()
        };
        println!("{} {}", tag, style(source).dim());
    } else {
        println!("{} {}", status, source);
    }
    for line in payload {
        println!("    {}", line);
    }
}
