//! The loaded Standard MIDI File.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::smf::parser::{self, Header, TimedEvent, TrackClock};
use crate::smf::reader;
use crate::smf::SmfError;

/// An immutable, fully parsed SMF: header fields plus per-track timed
/// event lists. The header's track count is treated as an upper bound; the
/// tracks here are whatever `MTrk` chunks the file actually contained.
pub struct SmfFile {
    path: String,
    header: Header,
    tracks: Vec<Vec<TimedEvent>>,
}

impl SmfFile {
    /// Read and parse a file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SmfError> {
        let bytes = fs::read(&path)?;
        let name = path.as_ref().display().to_string();
        let file = Self::parse(name, &bytes)?;
        info!(
            "loaded {}: format {}, {} track(s), division {}",
            file.path,
            file.header.format,
            file.tracks.len(),
            file.header.division
        );
        Ok(file)
    }

    /// Parse an in-memory image. Non-track chunks after the header are
    /// skipped with a warning.
    pub fn parse(path: String, bytes: &[u8]) -> Result<Self, SmfError> {
        let (header, mut pos) = parser::parse_header(bytes, 0)?;
        let mut tracks = Vec::new();

        while pos < bytes.len() {
            let (preamble, body_pos) = reader::read_chunk_preamble(bytes, pos)?;
            let (body, after) = reader::read_chunk_body(bytes, body_pos, &preamble)?;
            if preamble.id_matches("MTrk") {
                let mut clock = TrackClock::new(header.division);
                tracks.push(parser::parse_track_body(body, &mut clock)?);
            } else {
                warn!(
                    "skipping unrecognized chunk {:02X?} ({} bytes)",
                    preamble.id, preamble.length
                );
            }
            pos = after;
        }

        if tracks.len() != usize::from(header.track_count) {
            warn!(
                "header declared {} track(s), found {}",
                header.track_count,
                tracks.len()
            );
        }
        Ok(SmfFile {
            path,
            header,
            tracks,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn format(&self) -> u16 {
        self.header.format
    }

    pub fn division(&self) -> u16 {
        self.header.division
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, index: usize) -> Option<&[TimedEvent]> {
        self.tracks.get(index).map(Vec::as_slice)
    }

    /// Terminal absolute time of track 0, in microseconds. Zero when the
    /// file has no tracks.
    pub fn duration_usec(&self) -> u64 {
        self.tracks
            .first()
            .and_then(|t| t.last())
            .map(|e| e.time)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::message::MidiMessage;

    fn chunk(id: &str, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id.as_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn header_chunk(format: u16, track_count: u16, division: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&format.to_be_bytes());
        body.extend_from_slice(&track_count.to_be_bytes());
        body.extend_from_slice(&division.to_be_bytes());
        chunk("MThd", &body)
    }

    #[test]
    fn test_parse_minimal_file() {
        let mut bytes = header_chunk(0, 1, 96);
        bytes.extend(chunk(
            "MTrk",
            &[0x00, 0x90, 0x3C, 0x40, 0x60, 0x80, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00],
        ));
        let file = SmfFile::parse("test.mid".into(), &bytes).unwrap();
        assert_eq!(file.track_count(), 1);
        let track = file.track(0).unwrap();
        assert_eq!(track[0].message, MidiMessage::note_on(0, 0x3C, 0x40));
        assert!(track[2].message.is_end_of_track());
        assert_eq!(file.duration_usec(), 500_000);
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let mut bytes = header_chunk(0, 1, 96);
        bytes.extend(chunk("XFIH", &[1, 2, 3, 4]));
        bytes.extend(chunk("MTrk", &[0x00, 0xFF, 0x2F, 0x00]));
        let file = SmfFile::parse("test.mid".into(), &bytes).unwrap();
        assert_eq!(file.track_count(), 1);
    }

    #[test]
    fn test_track_count_is_upper_bound() {
        let bytes = header_chunk(1, 4, 96);
        let file = SmfFile::parse("empty.mid".into(), &bytes).unwrap();
        assert_eq!(file.track_count(), 0);
        assert_eq!(file.duration_usec(), 0);
    }

    #[test]
    fn test_truncated_track_fails() {
        let mut bytes = header_chunk(0, 1, 96);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&16u32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x90]); // body shorter than declared
        assert!(SmfFile::parse("bad.mid".into(), &bytes).is_err());
    }
}
