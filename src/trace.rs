//! Process-wide trace sink.
//!
//! Monitors and the player's meta-text events write here: a timestamped,
//! optionally colored line on the terminal, mirrored to the debug log.

use std::sync::atomic::{AtomicBool, Ordering};

use console::style;

static COLOR_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_color(enabled: bool) {
    COLOR_ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn emit(tag: &str, text: &str) {
    let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
    if COLOR_ENABLED.load(Ordering::SeqCst) {
        println!("{} {} {}", style(stamp).dim(), style(tag).cyan(), text);
    } else {
        println!("{} {} {}", stamp, tag, text);
    }
    log::debug!("trace {}: {}", tag, text);
}
