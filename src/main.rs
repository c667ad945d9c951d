use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
use pigpen::{
    cli::Args,
    config::Settings,
    logging,
    osc::{commands, OscServer, Responder},
    repl, trace, DefaultBackend, Engine, SharedBackend,
};

fn main() {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref());
    initialize_logging(&settings);
    trace::set_color(settings.color);

    let driver: SharedBackend = Arc::new(Mutex::new(DefaultBackend::new()));

    if args.device_list {
        list_available_devices(&driver);
        return;
    }

    let engine = Engine::new(settings, driver);
    let server = start_osc_server(&engine);
    create_default_devices(&engine);

    if let Some(script) = &args.batch {
        run_batch_script(&engine, script);
    }

    if args.no_repl {
        run_headless_loop(&engine);
    } else {
        repl::run(&engine);
        engine.request_shutdown();
    }

    shut_down(&engine, server);
}

fn initialize_logging(settings: &Settings) {
    if let Err(e) = logging::init_logger(settings) {
        eprintln!("Logger initialization failed: {}", e);
    }
    log::info!("Application starting");
}

fn list_available_devices(driver: &SharedBackend) {
    let Ok(driver) = driver.lock() else {
        return;
    };
    println!("Available MIDI inputs:");
    for device in driver.list_inputs() {
        println!("  - {}", device);
    }
    println!("Available MIDI outputs:");
    for device in driver.list_outputs() {
        println!("  - {}", device);
    }
}

fn start_osc_server(engine: &Engine) -> Option<thread::JoinHandle<()>> {
    let responder = match Responder::new(&engine.settings) {
        Ok(responder) => responder,
        Err(e) => {
            log::error!("could not create responder: {}", e);
            eprintln!("Error creating OSC responder: {}", e);
            std::process::exit(1);
        }
    };
    match OscServer::spawn(engine.clone(), responder) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("could not bind OSC server: {}", e);
            eprintln!("Error binding OSC server on {}: {}", engine.settings.server_addr(), e);
            std::process::exit(1);
        }
    }
}

/// Bind the devices named in the config, when present.
fn create_default_devices(engine: &Engine) {
    if let Some(device) = engine.settings.default_midi_input.clone() {
        match commands::dispatch(engine, "new-midi-input", &[device.clone()]) {
            Ok(names) => log::info!("default input {} -> {}", device, names.join(", ")),
            Err(e) => log::warn!("default input {} unavailable: {}", device, e),
        }
    }
    if let Some(device) = engine.settings.default_midi_output.clone() {
        match commands::dispatch(engine, "new-midi-output", &[device.clone()]) {
            Ok(names) => log::info!("default output {} -> {}", device, names.join(", ")),
            Err(e) => log::warn!("default output {} unavailable: {}", device, e),
        }
    }
}

fn run_batch_script(engine: &Engine, script: &str) {
    match commands::run_batch(engine, script) {
        Ok(report) => {
            for line in report {
                println!("{}", line);
            }
        }
        Err(e) => {
            log::error!("batch {} failed: {}", script, e);
            eprintln!("Batch script failed: {}", e);
        }
    }
}

/// Headless mode: keep serving OSC until an `exit` command arrives.
fn run_headless_loop(engine: &Engine) {
    log::info!("running headless; send /{}/exit to stop", engine.settings.server_root);
    while !engine.shutdown_requested() {
        thread::sleep(Duration::from_millis(250));
    }
}

fn shut_down(engine: &Engine, server: Option<thread::JoinHandle<()>>) {
    if let Ok(mut registry) = engine.registry.lock() {
        registry.clear();
    }
    if let Some(handle) = server {
        let _ = handle.join();
    }
    log::info!("Application stopped");
}
