//! Header and track chunk parsing.
//!
//! Track bodies are `<vlq delta> <event>` records. Channel events may use
//! running status; system-exclusive and meta events clear it. Delta ticks are
//! resolved to absolute microseconds with a per-track clock that follows
//! tempo meta events.

use log::warn;

use crate::midi::message::{self, meta, MidiMessage};
use crate::midi::vlq;
use crate::smf::reader;
use crate::smf::SmfError;

/// Fallback tempo until a tempo meta event fires.
pub const DEFAULT_BPM: f64 = 120.0;

/// Valid clock-division range in PPQ; out-of-range headers get the floor.
pub const DIVISION_MIN: u16 = 24;
pub const DIVISION_MAX: u16 = 960;

/// Parsed header chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub format: u16,
    pub track_count: u16,
    pub division: u16,
}

/// A MIDI message with its delta time in ticks and resolved absolute time in
/// microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub delta: u32,
    pub time: u64,
    pub message: MidiMessage,
}

/// Running tick-to-microsecond conversion for one track.
pub struct TrackClock {
    division: u16,
    tick_usec: f64,
    time_usec: f64,
}

impl TrackClock {
    pub fn new(division: u16) -> Self {
        let mut clock = TrackClock {
            division,
            tick_usec: 0.0,
            time_usec: 0.0,
        };
        clock.set_bpm(DEFAULT_BPM);
        clock
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.tick_usec = (60_000_000.0 / bpm) / f64::from(self.division);
    }

    pub fn set_usec_per_quarter(&mut self, usec_per_quarter: u32) {
        self.tick_usec = f64::from(usec_per_quarter) / f64::from(self.division);
    }

    pub fn advance(&mut self, delta_ticks: u32) {
        self.time_usec += f64::from(delta_ticks) * self.tick_usec;
    }

    pub fn now(&self) -> u64 {
        self.time_usec.round() as u64
    }
}

/// Parse the `MThd` chunk at `pos`.
///
/// Out-of-range format or division values are warned about and substituted;
/// a body longer than six bytes is warned about and the excess ignored.
pub fn parse_header(buf: &[u8], pos: usize) -> Result<(Header, usize), SmfError> {
    let (preamble, body_pos) = reader::read_chunk_preamble(buf, pos)?;
    if !preamble.id_matches("MThd") {
        return Err(SmfError::BadChunkId {
            expected: "MThd",
            found: preamble.id,
        });
    }
    if preamble.length < 6 {
        return Err(SmfError::BadHeaderLength(preamble.length));
    }
    if preamble.length > 6 {
        warn!(
            "header chunk body is {} bytes, ignoring the excess",
            preamble.length
        );
    }
    let (body, after) = reader::read_chunk_body(buf, body_pos, &preamble)?;
    let (mut format, p) = reader::read_u16(body, 0)?;
    let (track_count, p) = reader::read_u16(body, p)?;
    let (mut division, _) = reader::read_u16(body, p)?;

    if format > 2 {
        warn!("unsupported SMF format {}, substituting 0", format);
        format = 0;
    }
    if !(DIVISION_MIN..=DIVISION_MAX).contains(&division) {
        warn!(
            "clock division {} outside {}..{}, substituting {}",
            division, DIVISION_MIN, DIVISION_MAX, DIVISION_MIN
        );
        division = DIVISION_MIN;
    }
    Ok((
        Header {
            format,
            track_count,
            division,
        },
        after,
    ))
}

/// Decode one track body into timed events.
///
/// The returned list includes the end-of-track meta event; if the body runs
/// out before one appears, the track is accepted with a warning.
pub fn parse_track_body(body: &[u8], clock: &mut TrackClock) -> Result<Vec<TimedEvent>, SmfError> {
    let mut events = Vec::new();
    let mut running: Option<(u8, u8)> = None;
    let mut pos = 0;

    while pos < body.len() {
        let (delta, next) = vlq::decode(body, pos)?;
        pos = next;
        clock.advance(delta);

        let (first, next) = reader::read_u8(body, pos)?;
        let message = if first < 0x80 {
            let (status, channel) = running.ok_or(SmfError::RunningStatusWithoutSeed(pos))?;
            pos = next;
            let data1 = first;
            let data2 = if message::channel_data_count(status) == 2 {
                let (b, next) = reader::read_u8(body, pos)?;
                pos = next;
                b
            } else {
                0
            };
            MidiMessage::channel(status, channel, data1, data2)
        } else if message::is_channel_status(first) {
            pos = next;
            let status = first & 0xF0;
            let channel = first & 0x0F;
            running = Some((status, channel));
            let (data1, next) = reader::read_u8(body, pos)?;
            pos = next;
            let data2 = if message::channel_data_count(status) == 2 {
                let (b, next) = reader::read_u8(body, pos)?;
                pos = next;
                b
            } else {
                0
            };
            MidiMessage::channel(status, channel, data1, data2)
        } else if first == message::SYSEX_START {
            pos = next;
            running = None;
            let mut data = Vec::new();
            loop {
                let (byte, next) = reader::read_u8(body, pos).map_err(|e| match e {
                    SmfError::Eof(_) => SmfError::SysexUnterminated,
                    other => other,
                })?;
                pos = next;
                match byte {
                    message::SYSEX_END => break,
                    0xF8..=0xFE => {} // realtime slipped inside: ignore
                    b if b >= 0x80 => return Err(SmfError::SysexInvalidByte(b)),
                    b => data.push(b),
                }
            }
            MidiMessage::SysEx { data }
        } else if first == message::META_STATUS {
            pos = next;
            running = None;
            let (meta_type, next) = reader::read_u8(body, pos)?;
            pos = next;
            if !meta::is_known(meta_type) {
                return Err(SmfError::UnknownMetaType(meta_type));
            }
            let (length, next) = vlq::decode(body, pos)?;
            pos = next;
            let (data, next) = reader::take_bytes(body, pos, length as usize)?;
            pos = next;
            MidiMessage::Meta {
                meta_type,
                data: data.to_vec(),
            }
        } else if first == message::SYSEX_END {
            // Stray continuation sysex; nothing buffered to continue, skip it.
            warn!("stray 0xF7 at track offset {}, skipping", pos);
            pos = next;
            continue;
        } else {
            pos = next;
            running = None;
            MidiMessage::System { status: first }
        };

        if let Some(usec) = message.tempo_usec_per_quarter() {
            clock.set_usec_per_quarter(usec);
        }
        let end_of_track = message.is_end_of_track();
        events.push(TimedEvent {
            delta,
            time: clock.now(),
            message,
        });
        if end_of_track {
            if pos < body.len() {
                warn!(
                    "{} residual bytes after end-of-track, discarding",
                    body.len() - pos
                );
            }
            return Ok(events);
        }
    }

    warn!("track body exhausted without an end-of-track event");
    Ok(events)
}
