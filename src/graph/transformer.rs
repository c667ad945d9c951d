//! Data-byte substitution through a 128-entry lookup table.

use crate::midi::message::{self, MidiMessage};

pub const TABLE_SIZE: usize = 128;

/// Selector value: transformation disabled.
pub const SELECT_OFF: u8 = 0x00;
/// Selector value: any note-on or note-off.
pub const SELECT_NOTES: u8 = 0x01;

pub struct Transformer {
    table: [u8; TABLE_SIZE],
    status_select: u8,
    data_index: usize,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

fn identity() -> [u8; TABLE_SIZE] {
    let mut table = [0u8; TABLE_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = i as u8;
    }
    table
}

impl Transformer {
    pub fn new() -> Self {
        Transformer {
            table: identity(),
            status_select: SELECT_NOTES,
            data_index: 1,
        }
    }

    /// Install one table entry, clamping index and value into 0..128.
    pub fn set_table_entry(&mut self, index: i64, value: i64) {
        let index = index.clamp(0, TABLE_SIZE as i64 - 1) as usize;
        let value = value.clamp(0, 0x7F) as u8;
        self.table[index] = value;
    }

    pub fn reset_table(&mut self) {
        self.table = identity();
    }

    /// Pick what the transformer matches: SELECT_OFF, SELECT_NOTES, or one
    /// channel status class (0x80..=0xE0).
    pub fn set_selector(&mut self, status: u8, data_index: usize) -> bool {
        let valid_status = status == SELECT_OFF
            || status == SELECT_NOTES
            || (message::is_channel_status(status) && status & 0x0F == 0);
        if !valid_status || !(1..=2).contains(&data_index) {
            return false;
        }
        self.status_select = status;
        self.data_index = data_index;
        true
    }

    pub fn selector(&self) -> (u8, usize) {
        (self.status_select, self.data_index)
    }

    fn matches(&self, status: u8) -> bool {
        match self.status_select {
            SELECT_OFF => false,
            SELECT_NOTES => status == message::NOTE_ON || status == message::NOTE_OFF,
            class => status == class,
        }
    }

    /// Substitute the selected data byte of matching channel messages.
    pub fn apply(&self, msg: &MidiMessage) -> MidiMessage {
        match msg {
            MidiMessage::Channel {
                status,
                channel,
                data1,
                data2,
            } if self.matches(*status) => {
                let (data1, data2) = match self.data_index {
                    1 => (self.table[usize::from(*data1)], *data2),
                    _ => (*data1, self.table[usize::from(*data2)]),
                };
                MidiMessage::channel(*status, *channel, data1, data2)
            }
            other => other.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
