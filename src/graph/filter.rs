//! Channel filters.
//!
//! Both variants drop channel messages whose channel is not selected; the
//! difference is the selector shape (multi vs single). Non-channel traffic
//! is gated by its own flag.

/// Multi-channel filter payload. The selector itself lives on the operator.
pub struct ChannelFilter {
    pub enable_system_events: bool,
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelFilter {
    pub fn new() -> Self {
        ChannelFilter {
            enable_system_events: true,
        }
    }

    pub fn reset(&mut self) {
        self.enable_system_events = true;
    }
}

/// Single-channel filter payload.
pub struct SingleChannelFilter {
    pub enable_system_events: bool,
}

impl Default for SingleChannelFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleChannelFilter {
    pub fn new() -> Self {
        SingleChannelFilter {
            enable_system_events: true,
        }
    }

    pub fn reset(&mut self) {
        self.enable_system_events = true;
    }
}
