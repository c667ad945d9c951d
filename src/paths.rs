//! Special path prefixes: `~/` is the user home, `!/` the application's
//! configuration directory.

use std::env;
use std::path::PathBuf;

fn home() -> PathBuf {
    env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// `~/.config/pigpen`
pub fn config_dir() -> PathBuf {
    home().join(".config").join("pigpen")
}

/// `~/.local/share/pigpen`
pub fn data_dir() -> PathBuf {
    home().join(".local").join("share").join("pigpen")
}

pub fn expand(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix("~/") {
        home().join(rest)
    } else if let Some(rest) = input.strip_prefix("!/") {
        config_dir().join(rest)
    } else {
        PathBuf::from(input)
    }
}
