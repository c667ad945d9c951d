//! Outstanding-note bookkeeping for clean stops.
//!
//! The player counts every note-on it emits and decrements on note-off.
//! When playback stops, whatever is still counted gets an explicit note-off
//! so nothing downstream is left ringing.

use crate::midi::message::MidiMessage;

const CHANNELS: usize = 16;
const KEYS: usize = 128;

/// 16x128 matrix of outstanding note-on counters.
pub struct NoteQueue {
    counts: [[u16; KEYS]; CHANNELS],
}

impl Default for NoteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteQueue {
    pub fn new() -> Self {
        NoteQueue {
            counts: [[0; KEYS]; CHANNELS],
        }
    }

    /// Track one message: note-on with velocity > 0 increments, note-off
    /// (or note-on with velocity 0) decrements, flooring at zero.
    /// Everything else is ignored.
    pub fn update(&mut self, msg: &MidiMessage) {
        let (channel, key) = match msg {
            MidiMessage::Channel {
                channel, data1, ..
            } if msg.is_note_on() || msg.is_note_off() => {
                (usize::from(*channel), usize::from(*data1))
            }
            _ => return,
        };
        let slot = &mut self.counts[channel][key];
        if msg.is_note_on() {
            *slot = slot.saturating_add(1);
        } else {
            *slot = slot.saturating_sub(1);
        }
    }

    /// One note-off per outstanding count, channel-major then key-major.
    pub fn pending_offs(&self) -> Vec<MidiMessage> {
        let mut offs = Vec::new();
        for (channel, keys) in self.counts.iter().enumerate() {
            for (key, count) in keys.iter().enumerate() {
                for _ in 0..*count {
                    offs.push(MidiMessage::note_off(channel as u8, key as u8, 0));
                }
            }
        }
        offs
    }

    pub fn outstanding(&self) -> usize {
        self.counts
            .iter()
            .flat_map(|keys| keys.iter())
            .map(|c| usize::from(*c))
            .sum()
    }

    pub fn reset(&mut self) {
        self.counts = [[0; KEYS]; CHANNELS];
    }
}
