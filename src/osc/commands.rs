//! The command table shared by the OSC server and the REPL.

use std::fs;
use std::sync::MutexGuard;

use crossbeam::channel::unbounded;
use log::{info, warn};

use crate::driver::{resolve_port, DriverError, MidiBackend};
use crate::graph::io::{spawn_input_listener, MidiInputOp, MidiOutputOp};
use crate::graph::operator::Operator;
use crate::graph::Registry;
use crate::osc::args::{self, Arg};
use crate::osc::CommandError;
use crate::paths;
use crate::Engine;

type CommandResult = Result<Vec<String>, CommandError>;

pub struct CommandSpec {
    pub name: &'static str,
    pub template: &'static str,
    pub help: &'static str,
    run: fn(&Engine, &[Arg]) -> CommandResult,
}

/// Every top-level command the dialect knows.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "ping",
        template: "",
        help: "liveness check",
        run: ping,
    },
    CommandSpec {
        name: "exit",
        template: "",
        help: "shut the engine down",
        run: exit,
    },
    CommandSpec {
        name: "new-operator",
        template: "s",
        help: "new-operator <type> [name]",
        run: new_operator,
    },
    CommandSpec {
        name: "new-midi-input",
        template: "s",
        help: "new-midi-input <device> [name]",
        run: new_midi_input,
    },
    CommandSpec {
        name: "new-midi-output",
        template: "s",
        help: "new-midi-output <device> [name]",
        run: new_midi_output,
    },
    CommandSpec {
        name: "delete-operator",
        template: "o",
        help: "delete-operator <name>",
        run: delete_operator,
    },
    CommandSpec {
        name: "delete-all-operators",
        template: "",
        help: "clear the registry",
        run: delete_all_operators,
    },
    CommandSpec {
        name: "connect",
        template: "oo",
        help: "connect <parent> <child>",
        run: connect,
    },
    CommandSpec {
        name: "disconnect-child",
        template: "oo",
        help: "disconnect-child <parent> <child>",
        run: disconnect_child,
    },
    CommandSpec {
        name: "disconnect-all",
        template: "o",
        help: "disconnect-all <name>",
        run: disconnect_all,
    },
    CommandSpec {
        name: "disconnect-parents",
        template: "o",
        help: "disconnect-parents <name>",
        run: disconnect_parents,
    },
    CommandSpec {
        name: "q-operator-types",
        template: "",
        help: "list known operator types",
        run: q_operator_types,
    },
    CommandSpec {
        name: "q-operators",
        template: "",
        help: "list registered operators",
        run: q_operators,
    },
    CommandSpec {
        name: "q-roots",
        template: "",
        help: "list root operators",
        run: q_roots,
    },
    CommandSpec {
        name: "q-graph",
        template: "",
        help: "dump the connection graph",
        run: q_graph,
    },
    CommandSpec {
        name: "q-commands",
        template: "",
        help: "list top-level commands",
        run: q_commands,
    },
    CommandSpec {
        name: "op",
        template: "os",
        help: "op <name> <subcommand> [args...]",
        run: op,
    },
    CommandSpec {
        name: "q-midi-inputs",
        template: "",
        help: "list driver input ports",
        run: q_midi_inputs,
    },
    CommandSpec {
        name: "q-midi-outputs",
        template: "",
        help: "list driver output ports",
        run: q_midi_outputs,
    },
    CommandSpec {
        name: "panic",
        template: "",
        help: "all-notes-off everywhere",
        run: panic_all,
    },
    CommandSpec {
        name: "reset",
        template: "",
        help: "restore operator defaults",
        run: reset_all,
    },
    CommandSpec {
        name: "batch",
        template: "s",
        help: "batch <script-file>",
        run: batch,
    },
];

/// Look the command up, validate its arguments, run it.
pub fn dispatch(engine: &Engine, command: &str, tokens: &[String]) -> CommandResult {
    let spec = COMMANDS
        .iter()
        .find(|spec| spec.name == command)
        .ok_or_else(|| CommandError::UnknownCommand(command.to_string()))?;
    let validated = args::validate(spec.template, tokens, &engine.registry)?;
    (spec.run)(engine, &validated)
}

pub fn command_names() -> Vec<&'static str> {
    COMMANDS.iter().map(|spec| spec.name).collect()
}

/// Run a batch script: one command per line, `#` comments and blank lines
/// skipped. A failing line is reported and the script keeps going.
pub fn run_batch(engine: &Engine, filename: &str) -> CommandResult {
    let text = fs::read_to_string(paths::expand(filename))?;
    let mut report = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace().map(String::from);
        let Some(command) = parts.next() else {
            continue;
        };
        let tokens: Vec<String> = parts.collect();
        match dispatch(engine, &command, &tokens) {
            Ok(_) => report.push(format!("line {}: {}", number + 1, command)),
            Err(e) => {
                warn!("batch {} line {}: {}", filename, number + 1, e);
                report.push(format!("line {}: {} failed: {}", number + 1, command, e));
            }
        }
    }
    Ok(report)
}

fn lock_registry(engine: &Engine) -> Result<MutexGuard<'_, Registry>, CommandError> {
    engine
        .registry
        .lock()
        .map_err(|_| CommandError::Internal("registry lock poisoned".to_string()))
}

fn lock_driver(engine: &Engine) -> Result<MutexGuard<'_, dyn MidiBackend + 'static>, CommandError> {
    engine
        .driver
        .lock()
        .map_err(|_| CommandError::Internal("driver lock poisoned".to_string()))
}

fn ping(_engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(vec!["pong".to_string()])
}

fn exit(engine: &Engine, _args: &[Arg]) -> CommandResult {
    engine.request_shutdown();
    Ok(vec!["exiting".to_string()])
}

fn new_operator(engine: &Engine, args: &[Arg]) -> CommandResult {
    let type_tag = args[0].text();
    let proposed = args
        .get(1)
        .map(|a| a.text().to_string())
        .unwrap_or_else(|| type_tag.to_lowercase());
    let (name, _) = lock_registry(engine)?.create(type_tag, &proposed)?;
    Ok(vec![name])
}

fn new_midi_input(engine: &Engine, args: &[Arg]) -> CommandResult {
    let selector = args[0].text();
    let proposed = args
        .get(1)
        .map(|a| a.text().to_string())
        .unwrap_or_else(|| "midi-in".to_string());

    let mut registry = lock_registry(engine)?;
    let mut driver = lock_driver(engine)?;
    let names = driver.list_inputs();
    let index = resolve_port(&names, selector)
        .ok_or_else(|| DriverError::DeviceUnavailable(selector.to_string()))?;
    let device = names[index].clone();

    // One operator per device: a second request returns the first binding.
    if let Some(existing) = registry.cached_input(&device) {
        info!("input device '{}' already bound to {}", device, existing);
        return Ok(vec![existing]);
    }

    let (tx, rx) = unbounded();
    let connection = driver.open_input(&device, tx)?;
    drop(driver);

    let op = Operator::midi_input(&proposed, MidiInputOp::new(connection));
    let (name, _) = registry.insert(op);
    registry.cache_input(&device, &name);
    drop(registry);

    spawn_input_listener(engine.registry.clone(), name.clone(), rx);
    Ok(vec![name])
}

fn new_midi_output(engine: &Engine, args: &[Arg]) -> CommandResult {
    let selector = args[0].text();
    let proposed = args
        .get(1)
        .map(|a| a.text().to_string())
        .unwrap_or_else(|| "midi-out".to_string());

    let mut registry = lock_registry(engine)?;
    let mut driver = lock_driver(engine)?;
    let names = driver.list_outputs();
    let index = resolve_port(&names, selector)
        .ok_or_else(|| DriverError::DeviceUnavailable(selector.to_string()))?;
    let device = names[index].clone();

    if let Some(existing) = registry.cached_output(&device) {
        info!("output device '{}' already bound to {}", device, existing);
        return Ok(vec![existing]);
    }

    let port = driver.open_output(&device)?;
    drop(driver);

    let op = Operator::midi_output(&proposed, MidiOutputOp::new(port));
    let (name, _) = registry.insert(op);
    registry.cache_output(&device, &name);
    Ok(vec![name])
}

fn delete_operator(engine: &Engine, args: &[Arg]) -> CommandResult {
    let name = args[0].text();
    lock_registry(engine)?.delete(name)?;
    Ok(vec![format!("deleted {}", name)])
}

fn delete_all_operators(engine: &Engine, _args: &[Arg]) -> CommandResult {
    lock_registry(engine)?.clear();
    Ok(vec!["registry cleared".to_string()])
}

fn connect(engine: &Engine, args: &[Arg]) -> CommandResult {
    let (parent, child) = (args[0].text(), args[1].text());
    lock_registry(engine)?.connect(parent, child)?;
    Ok(vec![format!("{} -> {}", parent, child)])
}

fn disconnect_child(engine: &Engine, args: &[Arg]) -> CommandResult {
    let (parent, child) = (args[0].text(), args[1].text());
    lock_registry(engine)?.disconnect(parent, child)?;
    Ok(vec![format!("{} -x- {}", parent, child)])
}

fn disconnect_all(engine: &Engine, args: &[Arg]) -> CommandResult {
    let name = args[0].text();
    lock_registry(engine)?.disconnect_all(name)?;
    Ok(vec![format!("{} children disconnected", name)])
}

fn disconnect_parents(engine: &Engine, args: &[Arg]) -> CommandResult {
    let name = args[0].text();
    lock_registry(engine)?.disconnect_parents(name)?;
    Ok(vec![format!("{} parents disconnected", name)])
}

fn q_operator_types(engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(lock_registry(engine)?.operator_types())
}

fn q_operators(engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(lock_registry(engine)?
        .operators()
        .into_iter()
        .map(|(name, op_type)| format!("{}, {}", op_type, name))
        .collect())
}

fn q_roots(engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(lock_registry(engine)?.roots())
}

fn q_graph(engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(lock_registry(engine)?.graph_lines())
}

fn q_commands(_engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(command_names().into_iter().map(String::from).collect())
}

fn op(engine: &Engine, args: &[Arg]) -> CommandResult {
    let name = args[0].text();
    let subcommand = args[1].text();
    let tokens: Vec<String> = args[2..].iter().map(|a| a.text().to_string()).collect();
    let handle = lock_registry(engine)?.get(name)?;
    let mut guard = handle
        .lock()
        .map_err(|_| CommandError::Internal("operator lock poisoned".to_string()))?;
    guard.dispatch_command(subcommand, &tokens, &engine.registry)
}

fn q_midi_inputs(engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(lock_driver(engine)?.list_inputs())
}

fn q_midi_outputs(engine: &Engine, _args: &[Arg]) -> CommandResult {
    Ok(lock_driver(engine)?.list_outputs())
}

fn panic_all(engine: &Engine, _args: &[Arg]) -> CommandResult {
    lock_registry(engine)?.panic_all();
    Ok(vec!["panic sent".to_string()])
}

fn reset_all(engine: &Engine, _args: &[Arg]) -> CommandResult {
    lock_registry(engine)?.reset_all();
    Ok(vec!["operators reset".to_string()])
}

fn batch(engine: &Engine, args: &[Arg]) -> CommandResult {
    run_batch(engine, args[0].text())
}
