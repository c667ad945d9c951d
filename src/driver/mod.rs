//! MIDI driver seam.
//!
//! The engine talks to hardware through the [`MidiBackend`] trait: list
//! ports, open an input (inbound bytes are pushed through a channel), open
//! an output (a writable port handle). [`MidirBackend`] is the real
//! implementation; [`MockBackend`] records traffic for tests.

pub mod midir_backend;
pub mod mock_backend;

use std::fmt;
use std::sync::{Arc, Mutex};

use crossbeam::channel::Sender;

pub use midir_backend::MidirBackend;
pub use mock_backend::MockBackend;

/// Custom error type for driver operations
#[derive(Debug)]
pub enum DriverError {
    /// The requested port could not be found or bound
    DeviceUnavailable(String),
    /// Error while establishing a connection
    ConnectionError(String),
    /// Error while writing to an open port
    SendError(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::DeviceUnavailable(msg) => write!(f, "device unavailable: {}", msg),
            DriverError::ConnectionError(msg) => write!(f, "MIDI connection error: {}", msg),
            DriverError::SendError(msg) => write!(f, "MIDI send error: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// An open input connection. Dropping it closes the port and disconnects
/// the byte channel, which ends the listener thread.
pub trait InputConnection: Send {
    fn device_name(&self) -> &str;
}

/// An open output port.
pub trait OutputPort: Send {
    fn device_name(&self) -> &str;
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Trait defining the interface to a MIDI driver implementation.
pub trait MidiBackend: Send {
    fn list_inputs(&self) -> Vec<String>;

    fn list_outputs(&self) -> Vec<String>;

    /// Open the input selected by `selector`; each inbound byte array is
    /// pushed through `tx`.
    fn open_input(&mut self, selector: &str, tx: Sender<Vec<u8>>)
        -> Result<Box<dyn InputConnection>>;

    /// Open the output selected by `selector`.
    fn open_output(&mut self, selector: &str) -> Result<Box<dyn OutputPort>>;
}

/// Process-wide driver handle.
pub type SharedBackend = Arc<Mutex<dyn MidiBackend>>;

/// Resolve a port selector against a name list: a decimal integer picks by
/// index, anything else matches the first name containing it as a substring.
pub fn resolve_port(names: &[String], selector: &str) -> Option<usize> {
    let selector = selector.trim();
    if let Ok(index) = selector.parse::<usize>() {
        if index < names.len() {
            return Some(index);
        }
        return None;
    }
    names.iter().position(|name| name.contains(selector))
}

// Set default backend type
#[cfg(not(feature = "test-mock"))]
pub type DefaultBackend = MidirBackend;
#[cfg(feature = "test-mock")]
pub type DefaultBackend = MockBackend;
