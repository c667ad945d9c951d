//! Engine settings.
//!
//! A TOML document layered over built-in defaults. Every key is optional;
//! a malformed value logs a warning and falls back to its default, so a
//! broken config file never prevents startup.

use std::path::Path;

use config::{Config, ConfigError, File};
use log::warn;

use crate::graph::registry::DEFAULT_MAX_TREE_DEPTH;
use crate::paths;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_host: String,
    pub server_port: u16,
    pub server_root: String,
    pub client_host: String,
    pub client_port: u16,
    pub client_root: String,
    pub response_file: Option<String>,
    pub max_tree_depth: usize,
    pub default_midi_input: Option<String>,
    pub default_midi_output: Option<String>,
    pub log_level: String,
    pub log_to_term: bool,
    pub color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_host: "127.0.0.1".to_string(),
            server_port: 8020,
            server_root: "pig".to_string(),
            client_host: "127.0.0.1".to_string(),
            client_port: 8021,
            client_root: "pig-client".to_string(),
            response_file: None,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            default_midi_input: None,
            default_midi_output: None,
            log_level: "info".to_string(),
            log_to_term: false,
            color: true,
        }
    }
}

impl Settings {
    /// Load from an explicit file, or from `!/pigpen.toml` when none is
    /// given. A missing file is normal and yields the defaults.
    pub fn load(path: Option<&str>) -> Self {
        let file = match path {
            Some(p) => paths::expand(p),
            None => paths::config_dir().join("pigpen.toml"),
        };
        match read_config(&file) {
            Ok(cfg) => Self::from_config(&cfg),
            Err(e) => {
                warn!("config {} unusable ({}), using defaults", file.display(), e);
                Settings::default()
            }
        }
    }

    fn from_config(cfg: &Config) -> Self {
        let defaults = Settings::default();
        Settings {
            server_host: get_string(cfg, "osc-server.host", defaults.server_host),
            server_port: get_port(cfg, "osc-server.port", defaults.server_port),
            server_root: get_string(cfg, "osc-server.root", defaults.server_root),
            client_host: get_string(cfg, "osc-client.host", defaults.client_host),
            client_port: get_port(cfg, "osc-client.port", defaults.client_port),
            client_root: get_string(cfg, "osc-client.root", defaults.client_root),
            response_file: get_opt_string(cfg, "osc-client.response-file"),
            max_tree_depth: get_depth(cfg, "tree.max-depth", defaults.max_tree_depth),
            default_midi_input: get_opt_string(cfg, "midi-input.device"),
            default_midi_output: get_opt_string(cfg, "midi-output.device"),
            log_level: get_string(cfg, "log.level", defaults.log_level),
            log_to_term: get_bool(cfg, "log.term", defaults.log_to_term),
            color: get_bool(cfg, "color.enabled", defaults.color),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.client_host, self.client_port)
    }
}

fn read_config(file: &Path) -> Result<Config, ConfigError> {
    Config::builder()
        .add_source(File::from(file.to_path_buf()).required(false))
        .build()
}

fn get_string(cfg: &Config, key: &str, fallback: String) -> String {
    match cfg.get_string(key) {
        Ok(value) => value,
        Err(ConfigError::NotFound(_)) => fallback,
        Err(e) => {
            warn!("config key {}: {} (using default)", key, e);
            fallback
        }
    }
}

fn get_opt_string(cfg: &Config, key: &str) -> Option<String> {
    match cfg.get_string(key) {
        Ok(value) => Some(value),
        Err(ConfigError::NotFound(_)) => None,
        Err(e) => {
            warn!("config key {}: {} (ignoring)", key, e);
            None
        }
    }
}

fn get_bool(cfg: &Config, key: &str, fallback: bool) -> bool {
    match cfg.get_bool(key) {
        Ok(value) => value,
        Err(ConfigError::NotFound(_)) => fallback,
        Err(e) => {
            warn!("config key {}: {} (using default)", key, e);
            fallback
        }
    }
}

fn get_port(cfg: &Config, key: &str, fallback: u16) -> u16 {
    match cfg.get_int(key) {
        Ok(value) => match u16::try_from(value) {
            Ok(port) => port,
            Err(_) => {
                warn!("config key {}: {} is not a port (using default)", key, value);
                fallback
            }
        },
        Err(ConfigError::NotFound(_)) => fallback,
        Err(e) => {
            warn!("config key {}: {} (using default)", key, e);
            fallback
        }
    }
}

fn get_depth(cfg: &Config, key: &str, fallback: usize) -> usize {
    match cfg.get_int(key) {
        Ok(value) if value > 0 => value as usize,
        Ok(value) => {
            warn!("config key {}: {} must be positive (using default)", key, value);
            fallback
        }
        Err(ConfigError::NotFound(_)) => fallback,
        Err(e) => {
            warn!("config key {}: {} (using default)", key, e);
            fallback
        }
    }
}
