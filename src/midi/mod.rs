//! MIDI message model and codecs.
//!
//! This module provides the pieces shared by the wire and file domains:
//! - [`MidiMessage`] and the status/meta classification tables
//! - the VLQ codec used by SMF delta times and meta lengths
//! - [`NoteQueue`], the outstanding-note ledger used for clean stops

pub mod message;
pub mod note_queue;
pub mod vlq;

pub use message::{MidiMessage, TempoOutOfRange};
pub use note_queue::NoteQueue;
