//! Real MIDI I/O via midir.

use crossbeam::channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::driver::{
    resolve_port, DriverError, InputConnection, MidiBackend, OutputPort, Result,
};

pub struct MidirBackend;

impl MidirBackend {
    pub fn new() -> Self {
        MidirBackend
    }

    fn input_client(purpose: &str) -> Result<MidiInput> {
        let mut client = MidiInput::new(&format!("pigpen-{}", purpose))
            .map_err(|e| DriverError::ConnectionError(e.to_string()))?;
        client.ignore(Ignore::None);
        Ok(client)
    }

    fn output_client(purpose: &str) -> Result<MidiOutput> {
        MidiOutput::new(&format!("pigpen-{}", purpose))
            .map_err(|e| DriverError::ConnectionError(e.to_string()))
    }
}

impl Default for MidirBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct MidirInputConnection {
    name: String,
    // Held only to keep the subscription alive; dropping disconnects.
    _connection: MidiInputConnection<()>,
}

impl InputConnection for MidirInputConnection {
    fn device_name(&self) -> &str {
        &self.name
    }
}

struct MidirOutputPort {
    name: String,
    connection: MidiOutputConnection,
}

impl OutputPort for MidirOutputPort {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection
            .send(bytes)
            .map_err(|e| DriverError::SendError(e.to_string()))
    }
}

impl MidiBackend for MidirBackend {
    fn list_inputs(&self) -> Vec<String> {
        let mut devices = Vec::new();
        if let Ok(client) = Self::input_client("list") {
            for port in client.ports() {
                if let Ok(name) = client.port_name(&port) {
                    devices.push(name);
                }
            }
        }
        devices
    }

    fn list_outputs(&self) -> Vec<String> {
        let mut devices = Vec::new();
        if let Ok(client) = Self::output_client("list") {
            for port in client.ports() {
                if let Ok(name) = client.port_name(&port) {
                    devices.push(name);
                }
            }
        }
        devices
    }

    fn open_input(
        &mut self,
        selector: &str,
        tx: Sender<Vec<u8>>,
    ) -> Result<Box<dyn InputConnection>> {
        let client = Self::input_client("in")?;
        let ports = client.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| client.port_name(p).unwrap_or_default())
            .collect();
        let index = resolve_port(&names, selector)
            .ok_or_else(|| DriverError::DeviceUnavailable(selector.to_string()))?;
        let name = names[index].clone();
        let connection = client
            .connect(
                &ports[index],
                "pigpen-input",
                move |_stamp, bytes, _| {
                    let _ = tx.send(bytes.to_vec());
                },
                (),
            )
            .map_err(|e| DriverError::ConnectionError(e.to_string()))?;
        Ok(Box::new(MidirInputConnection {
            name,
            _connection: connection,
        }))
    }

    fn open_output(&mut self, selector: &str) -> Result<Box<dyn OutputPort>> {
        let client = Self::output_client("out")?;
        let ports = client.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| client.port_name(p).unwrap_or_default())
            .collect();
        let index = resolve_port(&names, selector)
            .ok_or_else(|| DriverError::DeviceUnavailable(selector.to_string()))?;
        let name = names[index].clone();
        let connection = client
            .connect(&ports[index], "pigpen-output")
            .map_err(|e| DriverError::ConnectionError(e.to_string()))?;
        Ok(Box::new(MidirOutputPort { name, connection }))
    }
}
