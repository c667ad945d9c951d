//! Line REPL over the same command table as the OSC plane.
//!
//! Every top-level command is callable by bare name; replies render to the
//! terminal only, since nothing crossed the wire.

use dialoguer::Input;
use log::info;

use crate::osc::commands;
use crate::osc::responder::render_terminal;
use crate::Engine;

/// Read commands until `exit` (or EOF / a shutdown requested elsewhere).
pub fn run(engine: &Engine) {
    info!("REPL started");
    loop {
        if engine.shutdown_requested() {
            break;
        }
        let line: String = match Input::new().with_prompt("pigpen").interact_text() {
            Ok(line) => line,
            Err(e) => {
                info!("REPL input closed: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace().map(String::from);
        let Some(command) = parts.next() else {
            continue;
        };
        let tokens: Vec<String> = parts.collect();
        let color = engine.settings.color;
        match commands::dispatch(engine, &command, &tokens) {
            Ok(payload) => render_terminal(color, "ACK", &command, &payload),
            Err(e) => render_terminal(color, "ERROR", &command, &[e.to_string()]),
        }
        if engine.shutdown_requested() {
            break;
        }
    }
    info!("REPL finished");
}
