//! Recording/injecting backend for tests and driverless operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam::channel::Sender;

use crate::driver::{
    resolve_port, DriverError, InputConnection, MidiBackend, OutputPort, Result,
};

/// Log of every byte array written to any mock output, in write order.
pub type WriteLog = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

pub struct MockBackend {
    inputs: Vec<String>,
    outputs: Vec<String>,
    taps: HashMap<String, Sender<Vec<u8>>>,
    written: WriteLog,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend {
            inputs: vec!["Mock Input A".to_string(), "Mock Input B".to_string()],
            outputs: vec!["Mock Output A".to_string(), "Mock Output B".to_string()],
            taps: HashMap::new(),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle onto the write log; clone before boxing the backend.
    pub fn write_log(&self) -> WriteLog {
        self.written.clone()
    }

    /// Push bytes into an opened input as if the device had produced them.
    pub fn inject(&self, device: &str, bytes: Vec<u8>) -> bool {
        match self.taps.get(device) {
            Some(tx) => tx.send(bytes).is_ok(),
            None => false,
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct MockInputConnection {
    name: String,
}

impl InputConnection for MockInputConnection {
    fn device_name(&self) -> &str {
        &self.name
    }
}

struct MockOutputPort {
    name: String,
    written: WriteLog,
}

impl OutputPort for MockOutputPort {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.written
            .lock()
            .map_err(|_| DriverError::SendError("write log poisoned".to_string()))?
            .push((self.name.clone(), bytes.to_vec()));
        Ok(())
    }
}

impl MidiBackend for MockBackend {
    fn list_inputs(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn list_outputs(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn open_input(
        &mut self,
        selector: &str,
        tx: Sender<Vec<u8>>,
    ) -> Result<Box<dyn InputConnection>> {
        let index = resolve_port(&self.inputs, selector)
            .ok_or_else(|| DriverError::DeviceUnavailable(selector.to_string()))?;
        let name = self.inputs[index].clone();
        self.taps.insert(name.clone(), tx);
        Ok(Box::new(MockInputConnection { name }))
    }

    fn open_output(&mut self, selector: &str) -> Result<Box<dyn OutputPort>> {
        let index = resolve_port(&self.outputs, selector)
            .ok_or_else(|| DriverError::DeviceUnavailable(selector.to_string()))?;
        Ok(Box::new(MockOutputPort {
            name: self.outputs[index].clone(),
            written: self.written.clone(),
        }))
    }
}
