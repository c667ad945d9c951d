//! The operator graph: nodes, registry and message delivery.
//!
//! Operators are owned centrally by the [`Registry`], keyed by unique name;
//! parent/child edges are name references, so the symmetric links never form
//! owning cycles. Delivery walks the graph with free functions that take a
//! registry handle: an operator mutex is locked only long enough to run the
//! node's own logic and snapshot its child names, and is never held while
//! the registry mutex is taken.

pub mod delay;
pub mod distributor;
pub mod filter;
pub mod io;
pub mod monitor;
pub mod operator;
pub mod player;
pub mod registry;
pub mod selector;
pub mod transformer;

pub use operator::{OpKind, Operator};
pub use registry::{Registry, SharedRegistry};
pub use selector::{ChannelSelector, SelectorMode};

use std::fmt;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::midi::MidiMessage;

pub type SharedOperator = Arc<Mutex<Operator>>;

/// Structural errors raised by registry and graph mutations.
#[derive(Debug)]
pub enum GraphError {
    /// Registry lookup miss.
    NotFound(String),
    /// The factory does not know the requested type tag.
    UnknownOperatorType(String),
    /// The type binds a driver port and must be created through the
    /// device-aware commands.
    DeviceRequired(String),
    /// Committing the edge would push a forward path past the configured
    /// depth bound.
    TreeDepthExceeded {
        parent: String,
        child: String,
        max: usize,
    },
    /// The edge would connect an operator to itself.
    CircularConnection { parent: String, child: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::NotFound(name) => write!(f, "no operator named '{}'", name),
            GraphError::UnknownOperatorType(tag) => {
                write!(f, "unknown operator type '{}'", tag)
            }
            GraphError::DeviceRequired(tag) => write!(
                f,
                "'{}' binds a MIDI device; use new-midi-input or new-midi-output",
                tag
            ),
            GraphError::TreeDepthExceeded { parent, child, max } => write!(
                f,
                "connecting {} -> {} exceeds the tree depth bound of {}",
                parent, child, max
            ),
            GraphError::CircularConnection { parent, child } => {
                write!(f, "connecting {} -> {} would create a cycle", parent, child)
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Full entry point: run the message through the operator's accept/process
/// contract, then fan the results out to its children.
pub fn send(registry: &SharedRegistry, op: &SharedOperator, msg: &MidiMessage) {
    let (outputs, child_names) = {
        let mut guard = match op.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("operator mutex poisoned, dropping message");
                return;
            }
        };
        if !guard.accept(msg) {
            return;
        }
        let outputs = guard.process(msg, registry);
        let children = if guard.midi_output_enabled() {
            guard.child_names()
        } else {
            Vec::new()
        };
        (outputs, children)
    };
    deliver(registry, &child_names, &outputs);
}

/// Fan a message out to an operator's children without re-running the
/// operator's own logic. The player and echo threads enter here.
pub fn distribute(registry: &SharedRegistry, op: &SharedOperator, msg: &MidiMessage) {
    let child_names = {
        let guard = match op.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if !guard.midi_output_enabled() {
            return;
        }
        guard.child_names()
    };
    deliver(registry, &child_names, std::slice::from_ref(msg));
}

/// [`distribute`] by operator name; silently a no-op if the operator has
/// been deleted in the meantime.
pub fn distribute_by_name(registry: &SharedRegistry, name: &str, msg: &MidiMessage) {
    if let Some(op) = lookup(registry, name) {
        distribute(registry, &op, msg);
    }
}

pub fn lookup(registry: &SharedRegistry, name: &str) -> Option<SharedOperator> {
    registry.lock().ok()?.get(name).ok()
}

fn deliver(registry: &SharedRegistry, child_names: &[String], msgs: &[MidiMessage]) {
    if child_names.is_empty() || msgs.is_empty() {
        return;
    }
    let handles: Vec<SharedOperator> = {
        match registry.lock() {
            Ok(reg) => child_names
                .iter()
                .filter_map(|name| reg.get(name).ok())
                .collect(),
            Err(_) => return,
        }
    };
    for msg in msgs {
        for handle in &handles {
            send(registry, handle, msg);
        }
    }
}
