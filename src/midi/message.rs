//! MIDI message model.
//!
//! Messages are classified the way the wire does it: channel voice messages
//! (status 0x80..=0xEF, low nibble = channel), system common/realtime
//! (0xF1..=0xFE), system exclusive (0xF0 .. 0xF7) and meta events (0xFF,
//! legal only inside an SMF track). Converters to and from the raw byte
//! stream live here, next to the status tables.

use std::fmt;

use crate::midi::vlq;

// Channel status classes (high nibble, channel bits zeroed).
pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_PRESSURE: u8 = 0xA0;
pub const CONTROLLER: u8 = 0xB0;
pub const PROGRAM: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const BEND: u8 = 0xE0;

// System statuses.
pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
pub const CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

/// Status byte introducing a meta event (SMF only).
pub const META_STATUS: u8 = 0xFF;

// Controller numbers used by panic handling.
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Upper bound for tempo meta construction, in BPM.
pub const MAX_TEMPO: f64 = 300.0;

/// Meta event types recognized by the parser.
pub mod meta {
    pub const SEQUENCE_NUMBER: u8 = 0x00;
    pub const TEXT: u8 = 0x01;
    pub const COPYRIGHT: u8 = 0x02;
    pub const TRACK_NAME: u8 = 0x03;
    pub const INSTRUMENT_NAME: u8 = 0x04;
    pub const LYRIC: u8 = 0x05;
    pub const MARKER: u8 = 0x06;
    pub const CUE_POINT: u8 = 0x07;
    pub const CHANNEL_PREFIX: u8 = 0x20;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
    pub const SMPTE_OFFSET: u8 = 0x54;
    pub const TIME_SIGNATURE: u8 = 0x58;
    pub const KEY_SIGNATURE: u8 = 0x59;
    pub const SEQUENCER_SPECIFIC: u8 = 0x7F;

    pub fn is_known(meta_type: u8) -> bool {
        matches!(
            meta_type,
            SEQUENCE_NUMBER
                | TEXT..=CUE_POINT
                | CHANNEL_PREFIX
                | END_OF_TRACK
                | TEMPO
                | SMPTE_OFFSET
                | TIME_SIGNATURE
                | KEY_SIGNATURE
                | SEQUENCER_SPECIFIC
        )
    }

    /// The text family: types 0x01..=0x07.
    pub fn is_text(meta_type: u8) -> bool {
        (TEXT..=CUE_POINT).contains(&meta_type)
    }
}

/// True for a channel voice status byte (0x80..=0xEF).
pub fn is_channel_status(byte: u8) -> bool {
    (0x80..=0xEF).contains(&byte)
}

/// True for a single-byte system common/realtime status, sysex delimiters
/// excluded.
pub fn is_system_status(byte: u8) -> bool {
    (0xF1..=0xFE).contains(&byte) && byte != SYSEX_END
}

/// Data byte count for a channel status class: 2 for note-off/on,
/// poly-pressure, controller and bend; 1 for program and channel-pressure.
pub fn channel_data_count(status: u8) -> usize {
    match status & 0xF0 {
        PROGRAM | CHANNEL_PRESSURE => 1,
        _ => 2,
    }
}

/// Error raised when constructing a tempo meta event outside (0, MAX_TEMPO].
#[derive(Debug, Clone, PartialEq)]
pub struct TempoOutOfRange(pub f64);

impl fmt::Display for TempoOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tempo {} BPM outside (0, {}]", self.0, MAX_TEMPO)
    }
}

impl std::error::Error for TempoOutOfRange {}

/// A single MIDI message.
///
/// `Channel` keeps the status class with the channel bits zeroed; the
/// channel index lives in its own field. `data2` is unused for the
/// one-data-byte classes (program, channel pressure).
#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
    Channel {
        status: u8,
        channel: u8,
        data1: u8,
        data2: u8,
    },
    System {
        status: u8,
    },
    SysEx {
        data: Vec<u8>,
    },
    Meta {
        meta_type: u8,
        data: Vec<u8>,
    },
}

impl MidiMessage {
    pub fn channel(status: u8, channel: u8, data1: u8, data2: u8) -> Self {
        MidiMessage::Channel {
            status: status & 0xF0,
            channel: channel & 0x0F,
            data1: data1 & 0x7F,
            data2: data2 & 0x7F,
        }
    }

    pub fn note_on(channel: u8, key: u8, velocity: u8) -> Self {
        Self::channel(NOTE_ON, channel, key, velocity)
    }

    pub fn note_off(channel: u8, key: u8, velocity: u8) -> Self {
        Self::channel(NOTE_OFF, channel, key, velocity)
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::channel(CONTROLLER, channel, controller, value)
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::channel(PROGRAM, channel, program, 0)
    }

    pub fn all_sound_off(channel: u8) -> Self {
        Self::control_change(channel, CC_ALL_SOUND_OFF, 0)
    }

    pub fn all_notes_off(channel: u8) -> Self {
        Self::control_change(channel, CC_ALL_NOTES_OFF, 0)
    }

    /// Tempo meta event. Rejects anything outside (0, MAX_TEMPO] BPM.
    pub fn meta_tempo(bpm: f64) -> Result<Self, TempoOutOfRange> {
        if !(bpm > 0.0 && bpm <= MAX_TEMPO) {
            return Err(TempoOutOfRange(bpm));
        }
        let usec_per_quarter = (60_000_000.0 / bpm) as u32;
        Ok(MidiMessage::Meta {
            meta_type: meta::TEMPO,
            data: vec![
                ((usec_per_quarter >> 16) & 0xFF) as u8,
                ((usec_per_quarter >> 8) & 0xFF) as u8,
                (usec_per_quarter & 0xFF) as u8,
            ],
        })
    }

    pub fn meta_end_of_track() -> Self {
        MidiMessage::Meta {
            meta_type: meta::END_OF_TRACK,
            data: Vec::new(),
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, MidiMessage::Channel { .. })
    }

    /// Channel index 0..=15 for channel messages, None otherwise.
    pub fn channel_index(&self) -> Option<usize> {
        match self {
            MidiMessage::Channel { channel, .. } => Some(usize::from(*channel)),
            _ => None,
        }
    }

    /// Status class (channel bits zeroed) for channel messages.
    pub fn status_class(&self) -> Option<u8> {
        match self {
            MidiMessage::Channel { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Note-on with a nonzero velocity.
    pub fn is_note_on(&self) -> bool {
        matches!(
            self,
            MidiMessage::Channel { status: NOTE_ON, data2, .. } if *data2 > 0
        )
    }

    /// Note-off, or the note-on-velocity-zero shorthand.
    pub fn is_note_off(&self) -> bool {
        match self {
            MidiMessage::Channel { status: NOTE_OFF, .. } => true,
            MidiMessage::Channel { status: NOTE_ON, data2, .. } => *data2 == 0,
            _ => false,
        }
    }

    pub fn is_tempo_change(&self) -> bool {
        matches!(
            self,
            MidiMessage::Meta { meta_type, .. } if *meta_type == meta::TEMPO
        )
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(
            self,
            MidiMessage::Meta { meta_type, .. } if *meta_type == meta::END_OF_TRACK
        )
    }

    /// Microseconds per quarter note carried by a tempo meta event.
    pub fn tempo_usec_per_quarter(&self) -> Option<u32> {
        match self {
            MidiMessage::Meta { meta_type, data }
                if *meta_type == meta::TEMPO && data.len() == 3 =>
            {
                Some(
                    (u32::from(data[0]) << 16)
                        | (u32::from(data[1]) << 8)
                        | u32::from(data[2]),
                )
            }
            _ => None,
        }
    }

    /// Parse a wire-domain message from raw driver bytes.
    ///
    /// Meta events never appear on the wire, so this only produces the
    /// channel/system/sysex variants.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if is_channel_status(status) {
            let class = status & 0xF0;
            let data1 = *bytes.get(1)?;
            let data2 = if channel_data_count(class) == 2 {
                *bytes.get(2)?
            } else {
                0
            };
            return Some(Self::channel(class, status & 0x0F, data1, data2));
        }
        if status == SYSEX_START {
            let end = bytes.iter().rposition(|b| *b == SYSEX_END)?;
            return Some(MidiMessage::SysEx {
                data: bytes[1..end].to_vec(),
            });
        }
        if is_system_status(status) {
            return Some(MidiMessage::System { status });
        }
        None
    }

    /// Render to the raw byte stream. Meta events use the SMF form
    /// (0xFF, type, VLQ length, payload).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MidiMessage::Channel {
                status,
                channel,
                data1,
                data2,
            } => {
                let mut out = vec![status | channel, *data1];
                if channel_data_count(*status) == 2 {
                    out.push(*data2);
                }
                out
            }
            MidiMessage::System { status } => vec![*status],
            MidiMessage::SysEx { data } => {
                let mut out = Vec::with_capacity(data.len() + 2);
                out.push(SYSEX_START);
                out.extend_from_slice(data);
                out.push(SYSEX_END);
                out
            }
            MidiMessage::Meta { meta_type, data } => {
                let mut out = vec![META_STATUS, *meta_type];
                out.extend_from_slice(&vlq::encode(data.len() as u32));
                out.extend_from_slice(data);
                out
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiMessage::Channel {
                status,
                channel,
                data1,
                data2,
            } => {
                let name = match *status {
                    NOTE_OFF => "note-off",
                    NOTE_ON => "note-on",
                    POLY_PRESSURE => "poly-pressure",
                    CONTROLLER => "controller",
                    PROGRAM => "program",
                    CHANNEL_PRESSURE => "channel-pressure",
                    BEND => "bend",
                    _ => "channel",
                };
                if channel_data_count(*status) == 2 {
                    write!(f, "{} ch={} d1={} d2={}", name, channel + 1, data1, data2)
                } else {
                    write!(f, "{} ch={} d1={}", name, channel + 1, data1)
                }
            }
            MidiMessage::System { status } => write!(f, "system {:#04X}", status),
            MidiMessage::SysEx { data } => write!(f, "sysex ({} bytes)", data.len()),
            MidiMessage::Meta { meta_type, data } => {
                if meta::is_text(*meta_type) {
                    write!(f, "meta-text {}", String::from_utf8_lossy(data))
                } else {
                    write!(f, "meta {:#04X} ({} bytes)", meta_type, data.len())
                }
            }
        }
    }
}
