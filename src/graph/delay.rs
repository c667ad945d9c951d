//! Per-channel note echo.
//!
//! Each note-on/off on the selected channel schedules a burst of delayed
//! repetitions on its own thread. Repetition times come from a cyclic
//! pattern of millisecond intervals; each repetition walks the key through
//! the 128-entry map and shifts velocity by the preset's signed offset.
//! Program changes on the selected channel pick one of six presets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::graph::{self, SharedRegistry};
use crate::midi::message::{self, MidiMessage};

pub const PRESET_SLOTS: usize = 6;
pub const MAX_REPEATS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct EchoPreset {
    /// Cyclic inter-echo intervals in milliseconds. Never empty.
    pub pattern: Vec<u64>,
    /// Repetitions per burst, 1..=MAX_REPEATS.
    pub repeats: usize,
    /// Signed velocity shift applied per repetition, clamped into 0..=127.
    pub velocity_offset: i16,
}

impl Default for EchoPreset {
    fn default() -> Self {
        EchoPreset {
            pattern: vec![250],
            repeats: 3,
            velocity_offset: -20,
        }
    }
}

fn identity_map() -> [u8; 128] {
    let mut map = [0u8; 128];
    for (i, slot) in map.iter_mut().enumerate() {
        *slot = i as u8;
    }
    map
}

pub struct Delay {
    presets: [EchoPreset; PRESET_SLOTS],
    active: usize,
    key_map: [u8; 128],
    program_passthrough: bool,
    cancel: Arc<AtomicBool>,
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl Delay {
    pub fn new() -> Self {
        Delay {
            presets: Default::default(),
            active: 0,
            key_map: identity_map(),
            program_passthrough: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn active_preset(&self) -> usize {
        self.active
    }

    pub fn select_preset(&mut self, slot: usize) {
        self.active = slot % PRESET_SLOTS;
    }

    pub fn set_pattern(&mut self, millis: Vec<u64>) {
        if !millis.is_empty() {
            self.presets[self.active].pattern = millis;
        }
    }

    pub fn set_repeats(&mut self, repeats: usize) {
        self.presets[self.active].repeats = repeats.clamp(1, MAX_REPEATS);
    }

    pub fn set_velocity_offset(&mut self, offset: i16) {
        self.presets[self.active].velocity_offset = offset;
    }

    pub fn set_key_map_entry(&mut self, index: i64, value: i64) {
        let index = index.clamp(0, 127) as usize;
        self.key_map[index] = value.clamp(0, 0x7F) as u8;
    }

    pub fn set_program_passthrough(&mut self, flag: bool) {
        self.program_passthrough = flag;
    }

    pub fn program_passthrough(&self) -> bool {
        self.program_passthrough
    }

    /// Handle one channel message already known to be on the selected
    /// channel. Returns the messages to pass through immediately.
    pub fn handle_selected(
        &mut self,
        registry: &SharedRegistry,
        op_name: &str,
        msg: &MidiMessage,
    ) -> Vec<MidiMessage> {
        match msg {
            MidiMessage::Channel { status, data1, .. }
                if *status == message::PROGRAM =>
            {
                self.select_preset(usize::from(*data1));
                if self.program_passthrough {
                    vec![msg.clone()]
                } else {
                    Vec::new()
                }
            }
            m if m.is_note_on() || m.is_note_off() => {
                self.schedule_burst(registry, op_name, msg);
                vec![msg.clone()]
            }
            _ => vec![msg.clone()],
        }
    }

    fn schedule_burst(&self, registry: &SharedRegistry, op_name: &str, msg: &MidiMessage) {
        let MidiMessage::Channel {
            status,
            channel,
            data1,
            data2,
        } = msg.clone()
        else {
            return;
        };
        let preset = self.presets[self.active].clone();
        let key_map = self.key_map;
        let cancel = self.cancel.clone();
        let registry = registry.clone();
        let name = op_name.to_string();

        thread::spawn(move || {
            let mut key = data1;
            let mut velocity = i16::from(data2);
            for rep in 0..preset.repeats {
                let interval = preset.pattern[rep % preset.pattern.len()];
                thread::sleep(Duration::from_millis(interval));
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                key = key_map[usize::from(key)] & 0x7F;
                let echo = if status == message::NOTE_ON && data2 > 0 {
                    velocity = (velocity + preset.velocity_offset).clamp(0, 127);
                    if velocity == 0 {
                        MidiMessage::note_off(channel, key, 0)
                    } else {
                        MidiMessage::note_on(channel, key, velocity as u8)
                    }
                } else {
                    MidiMessage::note_off(channel, key, data2)
                };
                graph::distribute_by_name(&registry, &name, &echo);
            }
        });
    }

    /// Cancel in-flight bursts; later bursts start with a fresh flag.
    pub fn cancel_echoes(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.cancel = Arc::new(AtomicBool::new(false));
    }

    pub fn reset(&mut self) {
        self.cancel_echoes();
        self.presets = Default::default();
        self.active = 0;
        self.key_map = identity_map();
        self.program_passthrough = false;
    }
}
