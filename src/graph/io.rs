//! Driver-bound leaves: MIDIInput sources and MIDIOutput sinks.

use std::thread;

use crossbeam::channel::Receiver;
use log::{debug, error};

use crate::driver::{InputConnection, OutputPort};
use crate::graph::{self, SharedRegistry};
use crate::midi::MidiMessage;

/// Root operator fed by a driver input port. The connection handle keeps
/// the subscription alive; the listener thread owns the byte channel.
pub struct MidiInputOp {
    device: String,
    // Held only so the driver subscription stays open until close().
    #[allow(dead_code)]
    connection: Option<Box<dyn InputConnection>>,
}

impl MidiInputOp {
    pub fn new(connection: Box<dyn InputConnection>) -> Self {
        MidiInputOp {
            device: connection.device_name().to_string(),
            connection: Some(connection),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Dropping the connection closes the port; the driver callback dies
    /// with it, the channel disconnects, and the listener thread exits.
    pub fn close(&mut self) {
        self.connection = None;
    }
}

/// Leaf sink writing to a driver output port.
pub struct MidiOutputOp {
    device: String,
    port: Option<Box<dyn OutputPort>>,
}

impl MidiOutputOp {
    pub fn new(port: Box<dyn OutputPort>) -> Self {
        MidiOutputOp {
            device: port.device_name().to_string(),
            port: Some(port),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Write one message to the port. Driver failures are logged, not
    /// propagated; a flaky port must not tear the operator down.
    pub fn emit(&mut self, msg: &MidiMessage) {
        // Meta events are file-domain only and never hit the wire.
        if matches!(msg, MidiMessage::Meta { .. }) {
            return;
        }
        if let Some(port) = &mut self.port {
            if let Err(e) = port.write(&msg.to_bytes()) {
                error!("write to '{}' failed: {}", self.device, e);
            }
        }
    }

    /// All-notes-off and all-sound-off on every channel.
    pub fn panic(&mut self) {
        for channel in 0..16 {
            self.emit(&MidiMessage::all_notes_off(channel));
            self.emit(&MidiMessage::all_sound_off(channel));
        }
    }

    pub fn close(&mut self) {
        self.port = None;
    }
}

/// Forward parsed driver bytes into the graph until the byte channel
/// disconnects or the operator disappears from the registry.
pub fn spawn_input_listener(registry: SharedRegistry, name: String, rx: Receiver<Vec<u8>>) {
    thread::spawn(move || {
        for bytes in rx.iter() {
            let Some(msg) = MidiMessage::from_bytes(&bytes) else {
                debug!("{}: dropping unparseable bytes {:02X?}", name, bytes);
                continue;
            };
            match graph::lookup(&registry, &name) {
                Some(op) => graph::send(&registry, &op, &msg),
                None => break,
            }
        }
        debug!("input listener for {} exited", name);
    });
}
