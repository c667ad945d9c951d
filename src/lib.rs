pub mod cli;
pub mod config;
pub mod driver;
pub mod graph;
pub mod logging;
pub mod midi;
pub mod osc;
pub mod paths;
pub mod repl;
pub mod smf;
pub mod trace;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub use config::Settings;
pub use driver::{DefaultBackend, SharedBackend};
pub use graph::registry::create_shared_registry;
pub use graph::SharedRegistry;

/// Everything the command plane operates on: the registry, the driver
/// handle, the loaded settings and the shutdown flag. All fields are shared
/// handles, so clones are cheap and every thread sees the same state.
#[derive(Clone)]
pub struct Engine {
    pub registry: SharedRegistry,
    pub driver: SharedBackend,
    pub settings: Settings,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(settings: Settings, driver: SharedBackend) -> Self {
        Engine {
            registry: create_shared_registry(settings.max_tree_depth),
            driver,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Engine over the default backend, for tests and driverless startup.
    pub fn with_default_backend(settings: Settings) -> Self {
        let driver: SharedBackend = Arc::new(Mutex::new(DefaultBackend::new()));
        Self::new(settings, driver)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
