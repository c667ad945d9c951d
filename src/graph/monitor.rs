//! Pass-through operator that dumps traffic to the trace sink.

use crate::midi::MidiMessage;
use crate::trace;

pub struct Monitor {
    trace_enabled: bool,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Monitor { trace_enabled: true }
    }

    pub fn set_trace_enabled(&mut self, flag: bool) {
        self.trace_enabled = flag;
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    pub fn observe(&self, name: &str, msg: &MidiMessage) {
        if self.trace_enabled {
            trace::emit(name, &msg.to_string());
        }
    }

    pub fn reset(&mut self) {
        self.trace_enabled = true;
    }
}
