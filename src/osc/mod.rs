//! The OSC command plane.
//!
//! Commands arrive over UDP under a configured address root, pass typed
//! argument validation, run against the engine, and produce a paired
//! ACK/ERROR reply to the client endpoint. The REPL feeds the same command
//! table with the same validation.

pub mod args;
pub mod commands;
pub mod responder;
pub mod server;

pub use responder::Responder;
pub use server::OscServer;

use std::fmt;

use crate::driver::DriverError;
use crate::graph::GraphError;
use crate::smf::SmfError;

/// Errors surfaced by command dispatch, on either the OSC or REPL side.
#[derive(Debug)]
pub enum CommandError {
    /// Too few positional arguments.
    ArgCount { expected: usize, got: usize },
    /// An argument failed its template type.
    ArgType {
        index: usize,
        expected: &'static str,
        got: String,
    },
    /// No such command (or operator subcommand).
    UnknownCommand(String),
    /// Play or continue with no SMF loaded.
    NoMediaLoaded,
    /// Engine-side failure (poisoned lock or similar).
    Internal(String),
    Graph(GraphError),
    Driver(DriverError),
    Smf(SmfError),
    Io(std::io::Error),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::ArgCount { expected, got } => {
                write!(f, "expected {} argument(s), got {}", expected, got)
            }
            CommandError::ArgType {
                index,
                expected,
                got,
            } => write!(
                f,
                "argument {} should be {}, got '{}'",
                index + 1,
                expected,
                got
            ),
            CommandError::UnknownCommand(name) => write!(f, "unknown command '{}'", name),
            CommandError::NoMediaLoaded => write!(f, "no media loaded"),
            CommandError::Internal(msg) => write!(f, "internal error: {}", msg),
            CommandError::Graph(e) => write!(f, "{}", e),
            CommandError::Driver(e) => write!(f, "{}", e),
            CommandError::Smf(e) => write!(f, "{}", e),
            CommandError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Graph(e) => Some(e),
            CommandError::Driver(e) => Some(e),
            CommandError::Smf(e) => Some(e),
            CommandError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for CommandError {
    fn from(e: GraphError) -> Self {
        CommandError::Graph(e)
    }
}

impl From<DriverError> for CommandError {
    fn from(e: DriverError) -> Self {
        CommandError::Driver(e)
    }
}

impl From<SmfError> for CommandError {
    fn from(e: SmfError) -> Self {
        CommandError::Smf(e)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::Io(e)
    }
}
