//! SMF transport operator.
//!
//! A player owns at most one loaded file and walks track 0 on its own
//! thread while `Playing`. Stop is cooperative: the thread polls a one-slot
//! control channel between event sleeps, so stop latency is bounded by the
//! currently scheduled sleep. On the way out it resolves every outstanding
//! note so nothing downstream keeps ringing.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{info, warn};

use crate::graph::{self, SharedRegistry};
use crate::midi::message::{self, meta, MidiMessage};
use crate::midi::NoteQueue;
use crate::osc::CommandError;
use crate::paths;
use crate::smf::parser::DEFAULT_BPM;
use crate::smf::SmfFile;
use crate::trace;

/// Delay before the first event fires, in milliseconds.
pub const START_DELAY_MS: u64 = 200;

const READY: u8 = 0;
const PLAYING: u8 = 1;
const STOPPING: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Ready,
    Playing,
    Stopping,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Ready => write!(f, "ready"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// State shared between the operator and its playback thread.
struct PlayerShared {
    state: AtomicU8,
    position_usec: AtomicU64,
    event_index: AtomicUsize,
    note_queue: Mutex<NoteQueue>,
}

impl PlayerShared {
    fn new() -> Self {
        PlayerShared {
            state: AtomicU8::new(READY),
            position_usec: AtomicU64::new(0),
            event_index: AtomicUsize::new(0),
            note_queue: Mutex::new(NoteQueue::new()),
        }
    }

    fn state(&self) -> PlayerState {
        match self.state.load(Ordering::SeqCst) {
            PLAYING => PlayerState::Playing,
            STOPPING => PlayerState::Stopping,
            _ => PlayerState::Ready,
        }
    }
}

pub struct MidiPlayerOp {
    media: Option<Arc<SmfFile>>,
    shared: Arc<PlayerShared>,
    stop_tx: Option<Sender<()>>,
    enable_midi_transport: bool,
}

impl Default for MidiPlayerOp {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiPlayerOp {
    pub fn new() -> Self {
        MidiPlayerOp {
            media: None,
            shared: Arc::new(PlayerShared::new()),
            stop_tx: None,
            enable_midi_transport: false,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.shared.state()
    }

    pub fn media_path(&self) -> Option<&str> {
        self.media.as_deref().map(SmfFile::path)
    }

    pub fn set_midi_transport(&mut self, flag: bool) {
        self.enable_midi_transport = flag;
    }

    pub fn midi_transport(&self) -> bool {
        self.enable_midi_transport
    }

    /// Accumulated microseconds of dispatched events.
    pub fn position_usec(&self) -> u64 {
        self.shared.position_usec.load(Ordering::SeqCst)
    }

    /// Terminal time of the loaded file; 0 with nothing loaded.
    pub fn duration_usec(&self) -> u64 {
        self.media.as_deref().map(SmfFile::duration_usec).unwrap_or(0)
    }

    /// Parse a file and make it the current media. Any previous media is
    /// discarded; position and event index rewind.
    pub fn load(&mut self, filename: &str) -> Result<(), CommandError> {
        let file = SmfFile::load(paths::expand(filename))?;
        self.media = Some(Arc::new(file));
        self.shared.event_index.store(0, Ordering::SeqCst);
        self.shared.position_usec.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// `Ready -> Playing`, optionally (re)loading first. Playing from the
    /// top rewinds position and event index.
    pub fn play(
        &mut self,
        registry: &SharedRegistry,
        op_name: &str,
        filename: Option<&str>,
    ) -> Result<(), CommandError> {
        if self.shared.state() != PlayerState::Ready {
            warn!("{}: play ignored, not in ready state", op_name);
            return Ok(());
        }
        if let Some(filename) = filename {
            self.load(filename)?;
        }
        let media = self.media.clone().ok_or(CommandError::NoMediaLoaded)?;
        self.shared.event_index.store(0, Ordering::SeqCst);
        self.shared.position_usec.store(0, Ordering::SeqCst);
        self.spawn_playback(registry, op_name, media);
        Ok(())
    }

    /// `Ready -> Playing` reusing the current event index and position.
    pub fn resume(
        &mut self,
        registry: &SharedRegistry,
        op_name: &str,
    ) -> Result<(), CommandError> {
        if self.shared.state() != PlayerState::Ready {
            warn!("{}: continue ignored, not in ready state", op_name);
            return Ok(());
        }
        let media = self.media.clone().ok_or(CommandError::NoMediaLoaded)?;
        self.spawn_playback(registry, op_name, media);
        Ok(())
    }

    /// Request the playback thread to wind down. Idempotent; a no-op from
    /// `Ready`.
    pub fn stop(&mut self) {
        if self.shared.state() != PlayerState::Playing {
            return;
        }
        self.shared.state.store(STOPPING, Ordering::SeqCst);
        if let Some(tx) = &self.stop_tx {
            let _ = tx.try_send(());
        }
    }

    fn spawn_playback(&mut self, registry: &SharedRegistry, op_name: &str, media: Arc<SmfFile>) {
        let (tx, rx) = bounded(1);
        self.stop_tx = Some(tx);
        self.shared.state.store(PLAYING, Ordering::SeqCst);
        let shared = self.shared.clone();
        let registry = registry.clone();
        let name = op_name.to_string();
        info!("{}: playing {}", name, media.path());
        thread::spawn(move || run_playback(registry, name, shared, media, rx));
    }

    /// Incoming system-realtime transport, when enabled: start plays from
    /// the top, continue resumes, stop stops. The message is forwarded to
    /// children either way.
    pub fn handle_transport(
        &mut self,
        registry: &SharedRegistry,
        op_name: &str,
        status: u8,
    ) {
        if !self.enable_midi_transport {
            return;
        }
        let result = match status {
            message::START => self.play(registry, op_name, None),
            message::CONTINUE => self.resume(registry, op_name),
            message::STOP => {
                self.stop();
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!("{}: transport message failed: {}", op_name, e);
        }
    }

    pub fn panic(&mut self) {
        self.stop();
        if self.shared.state() == PlayerState::Ready {
            if let Ok(mut queue) = self.shared.note_queue.lock() {
                queue.reset();
            }
        }
    }

    pub fn close(&mut self) {
        self.stop();
        self.media = None;
        self.stop_tx = None;
    }

    pub fn reset(&mut self) {
        self.stop();
        self.enable_midi_transport = false;
    }
}

/// Sleep that a stop request interrupts. True means stop was requested.
fn interruptible_sleep(rx: &Receiver<()>, duration: Duration) -> bool {
    match rx.recv_timeout(duration) {
        Ok(()) => true,
        Err(RecvTimeoutError::Timeout) => false,
        // Operator deleted out from under us: treat as a stop request.
        Err(RecvTimeoutError::Disconnected) => true,
    }
}

fn run_playback(
    registry: SharedRegistry,
    name: String,
    shared: Arc<PlayerShared>,
    media: Arc<SmfFile>,
    rx: Receiver<()>,
) {
    let division = media.division();
    let mut tick_usec = (60_000_000.0 / DEFAULT_BPM) / f64::from(division);
    let events = media.track(0).unwrap_or(&[]);

    let mut stopped = interruptible_sleep(&rx, Duration::from_millis(START_DELAY_MS));
    let mut index = shared.event_index.load(Ordering::SeqCst);

    while !stopped && index < events.len() {
        let event = &events[index];
        let wait = Duration::from_micros((f64::from(event.delta) * tick_usec) as u64);
        if interruptible_sleep(&rx, wait) {
            break;
        }

        match &event.message {
            msg @ MidiMessage::Channel { .. } => {
                graph::distribute_by_name(&registry, &name, msg);
                if let Ok(mut queue) = shared.note_queue.lock() {
                    queue.update(msg);
                }
            }
            msg @ MidiMessage::System { .. } => {
                graph::distribute_by_name(&registry, &name, msg);
            }
            msg @ MidiMessage::Meta { meta_type, data } => {
                if let Some(usec) = msg.tempo_usec_per_quarter() {
                    tick_usec = f64::from(usec) / f64::from(division);
                } else if meta::is_text(*meta_type) {
                    trace::emit(&name, &String::from_utf8_lossy(data));
                } else if msg.is_end_of_track() {
                    index += 1;
                    shared.event_index.store(index, Ordering::SeqCst);
                    break;
                }
                // Remaining meta types carry nothing for live routing.
            }
            MidiMessage::SysEx { .. } => {
                graph::distribute_by_name(&registry, &name, &event.message);
            }
        }

        shared.position_usec.store(event.time, Ordering::SeqCst);
        index += 1;
        shared.event_index.store(index, Ordering::SeqCst);
        stopped = shared.state.load(Ordering::SeqCst) == STOPPING;
    }

    resolve_notes(&registry, &name, &shared);
    shared.state.store(READY, Ordering::SeqCst);
    info!("{}: playback finished", name);
}

/// All-sound-off everywhere, then drain outstanding note-offs in bursts of
/// sixteen with a short breather between bursts.
fn resolve_notes(registry: &SharedRegistry, name: &str, shared: &PlayerShared) {
    for channel in 0..16 {
        graph::distribute_by_name(registry, name, &MidiMessage::all_sound_off(channel));
    }
    let pending = match shared.note_queue.lock() {
        Ok(queue) => queue.pending_offs(),
        Err(_) => Vec::new(),
    };
    for burst in pending.chunks(16) {
        for off in burst {
            graph::distribute_by_name(registry, name, off);
        }
        thread::sleep(Duration::from_millis(2));
    }
    if let Ok(mut queue) = shared.note_queue.lock() {
        queue.reset();
    }
}
