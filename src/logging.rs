use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::sync::Once;

use crate::config::Settings;
use crate::paths;

static INIT: Once = Once::new();

fn level_filter(name: &str) -> LevelFilter {
    match name {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// File logger under the application data directory, plus an optional
/// terminal logger when the config asks for one. Safe to call once only;
/// later calls are no-ops.
pub fn init_logger(settings: &Settings) -> Result<(), Error> {
    let log_dir = paths::data_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("app.log"))?;

    let level = level_filter(&settings.log_level);
    let mut initialized = false;
    INIT.call_once(|| {
        let mut loggers: Vec<Box<dyn SharedLogger>> =
            vec![WriteLogger::new(level, Config::default(), log_file)];
        if settings.log_to_term {
            loggers.push(TermLogger::new(
                level,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ));
        }
        if CombinedLogger::init(loggers).is_ok() {
            initialized = true;
        }
    });

    if initialized {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Other, "Logger initialization failed"))
    }
}
