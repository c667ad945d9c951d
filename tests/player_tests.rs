use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pigpen::config::Settings;
use pigpen::driver::mock_backend::WriteLog;
use pigpen::driver::MockBackend;
use pigpen::midi::{MidiMessage, NoteQueue};
use pigpen::osc::commands::dispatch;
use pigpen::{Engine, SharedBackend};

fn test_engine() -> (Engine, WriteLog) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = MockBackend::new();
    let log = backend.write_log();
    let driver: SharedBackend = Arc::new(Mutex::new(backend));
    (Engine::new(Settings::default(), driver), log)
}

fn tokens(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn chunk(id: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn smf(division: u16, track: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&division.to_be_bytes());
    let mut bytes = chunk("MThd", &body);
    bytes.extend(chunk("MTrk", track));
    bytes
}

fn write_temp_smf(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("pigpen-test-{}-{}.mid", std::process::id(), name));
    fs::write(&path, bytes).unwrap();
    path
}

fn wait_for_ready(engine: &Engine, name: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = dispatch(engine, "op", &tokens(&[name, "q-state"])).unwrap();
        if state == vec!["ready".to_string()] {
            return;
        }
        assert!(Instant::now() < deadline, "player never returned to ready");
        thread::sleep(Duration::from_millis(20));
    }
}

/// Player wired to a mock output; returns the temp file path.
fn player_setup(engine: &Engine, file: &PathBuf) {
    dispatch(engine, "new-operator", &tokens(&["MIDIPlayer", "player"])).unwrap();
    dispatch(engine, "new-midi-output", &tokens(&["Output A", "sink"])).unwrap();
    dispatch(engine, "connect", &tokens(&["player", "sink"])).unwrap();
    dispatch(engine, "op", &tokens(&["player", "load", &file.to_string_lossy()])).unwrap();
}

#[test]
fn test_short_file_plays_to_completion() {
    let (engine, log) = test_engine();
    // One note, division 96, default tempo: delta 48 is a quarter second.
    let bytes = smf(
        96,
        &[
            0x00, 0x91, 60, 100, // note-on ch2
            48, 0x81, 60, 0, // note-off
            0x00, 0xFF, 0x2F, 0x00,
        ],
    );
    let file = write_temp_smf("complete", &bytes);
    player_setup(&engine, &file);

    dispatch(&engine, "op", &tokens(&["player", "play"])).unwrap();
    wait_for_ready(&engine, "player");

    let written: Vec<Vec<u8>> = log.lock().unwrap().iter().map(|(_, b)| b.clone()).collect();
    assert!(written.contains(&vec![0x91, 60, 100]));
    assert!(written.contains(&vec![0x81, 60, 0]));

    let duration = dispatch(&engine, "op", &tokens(&["player", "q-duration"])).unwrap();
    assert_eq!(duration, vec!["250000"]);

    fs::remove_file(file).ok();
}

#[test]
fn test_stop_resolves_hanging_notes() {
    let (engine, log) = test_engine();
    // Five unresolved note-ons on channel 2 (status 0x91), then a long gap
    // to end-of-track so the stop lands mid-playback.
    let bytes = smf(
        96,
        &[
            0x00, 0x91, 60, 100,
            0x00, 0x91, 62, 100,
            0x00, 0x91, 64, 100,
            0x00, 0x91, 65, 100,
            0x00, 0x91, 67, 100,
            0x83, 0x60, 0xFF, 0x2F, 0x00, // delta 480: a couple of seconds away
        ],
    );
    let file = write_temp_smf("hanging", &bytes);
    player_setup(&engine, &file);

    dispatch(&engine, "op", &tokens(&["player", "play"])).unwrap();
    // Let the start delay pass and the notes fire.
    thread::sleep(Duration::from_millis(500));
    dispatch(&engine, "op", &tokens(&["player", "stop"])).unwrap();
    wait_for_ready(&engine, "player");

    // Feed everything the sink saw through a counting queue: net zero.
    let mut queue = NoteQueue::new();
    let mut note_ons = 0;
    for (_, bytes) in log.lock().unwrap().iter() {
        if let Some(msg) = MidiMessage::from_bytes(bytes) {
            if msg.is_note_on() {
                note_ons += 1;
            }
            queue.update(&msg);
        }
    }
    assert_eq!(note_ons, 5, "all five notes should have fired before stop");
    assert_eq!(queue.outstanding(), 0, "stop must resolve every note");

    // All-sound-off went out on every channel.
    let sound_offs = log
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, b)| b.len() == 3 && b[0] & 0xF0 == 0xB0 && b[1] == 120)
        .count();
    assert_eq!(sound_offs, 16);

    fs::remove_file(file).ok();
}

#[test]
fn test_play_without_media_errors() {
    let (engine, _log) = test_engine();
    dispatch(&engine, "new-operator", &tokens(&["MIDIPlayer", "player"])).unwrap();
    let err = dispatch(&engine, "op", &tokens(&["player", "play"])).unwrap_err();
    assert!(matches!(err, pigpen::osc::CommandError::NoMediaLoaded));
}

#[test]
fn test_stop_from_ready_is_noop() {
    let (engine, _log) = test_engine();
    dispatch(&engine, "new-operator", &tokens(&["MIDIPlayer", "player"])).unwrap();
    dispatch(&engine, "op", &tokens(&["player", "stop"])).unwrap();
    let state = dispatch(&engine, "op", &tokens(&["player", "q-state"])).unwrap();
    assert_eq!(state, vec!["ready"]);
}

#[test]
fn test_continue_resumes_position() {
    let (engine, log) = test_engine();
    // Two notes separated by a long gap.
    let bytes = smf(
        96,
        &[
            0x00, 0x90, 60, 100,
            0x00, 0x80, 60, 0,
            0x83, 0x60, 0x90, 72, 100, // delta 480, 2.5 s at 120 BPM
            0x00, 0x80, 72, 0,
            0x00, 0xFF, 0x2F, 0x00,
        ],
    );
    let file = write_temp_smf("resume", &bytes);
    player_setup(&engine, &file);

    dispatch(&engine, "op", &tokens(&["player", "play"])).unwrap();
    thread::sleep(Duration::from_millis(500));
    dispatch(&engine, "op", &tokens(&["player", "stop"])).unwrap();
    wait_for_ready(&engine, "player");

    let first_count = log.lock().unwrap().len();
    assert!(first_count > 0);

    // The second note has not fired yet; continue picks up mid-file.
    let seen: Vec<Vec<u8>> = log.lock().unwrap().iter().map(|(_, b)| b.clone()).collect();
    assert!(!seen.contains(&vec![0x90, 72, 100]));

    dispatch(&engine, "op", &tokens(&["player", "continue"])).unwrap();
    wait_for_ready(&engine, "player");

    let seen: Vec<Vec<u8>> = log.lock().unwrap().iter().map(|(_, b)| b.clone()).collect();
    assert!(seen.contains(&vec![0x90, 72, 100]));

    fs::remove_file(file).ok();
}

#[test]
fn test_midi_transport_stop_passthrough() {
    let (engine, log) = test_engine();
    let bytes = smf(
        96,
        &[
            0x00, 0x90, 60, 100,
            0x83, 0x60, 0xFF, 0x2F, 0x00,
        ],
    );
    let file = write_temp_smf("transport", &bytes);
    player_setup(&engine, &file);
    dispatch(&engine, "op", &tokens(&["player", "enable-midi-transport", "true"])).unwrap();

    // A system-realtime start message drives play().
    let player = engine.registry.lock().unwrap().get("player").unwrap();
    pigpen::graph::send(&engine.registry, &player, &MidiMessage::System { status: 0xFA });
    thread::sleep(Duration::from_millis(400));

    {
        let state = dispatch(&engine, "op", &tokens(&["player", "q-state"])).unwrap();
        assert_eq!(state, vec!["playing"]);
    }

    pigpen::graph::send(&engine.registry, &player, &MidiMessage::System { status: 0xFC });
    wait_for_ready(&engine, "player");

    // The transport messages were also forwarded downstream.
    let seen: Vec<Vec<u8>> = log.lock().unwrap().iter().map(|(_, b)| b.clone()).collect();
    assert!(seen.contains(&vec![0xFA]));
    assert!(seen.contains(&vec![0xFC]));

    fs::remove_file(file).ok();
}
