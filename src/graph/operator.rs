//! Operator core: identity, edges, and the receive/transform/distribute
//! contract every node follows.
//!
//! The variant set is closed, so the payloads live in a sealed enum
//! dispatched by `match`; the subcommand surface stays string-keyed so the
//! OSC `op` command can reach variant-specific controls.

use std::collections::BTreeSet;

use crate::graph::delay::Delay;
use crate::graph::distributor::Distributor;
use crate::graph::filter::{ChannelFilter, SingleChannelFilter};
use crate::graph::io::{MidiInputOp, MidiOutputOp};
use crate::graph::monitor::Monitor;
use crate::graph::player::MidiPlayerOp;
use crate::graph::selector::{ChannelSelector, SelectorMode};
use crate::graph::transformer::Transformer;
use crate::graph::SharedRegistry;
use crate::midi::message::MidiMessage;
use crate::osc::args;
use crate::osc::CommandError;

pub enum OpKind {
    Monitor(Monitor),
    ChannelFilter(ChannelFilter),
    SingleChannelFilter(SingleChannelFilter),
    Distributor(Distributor),
    Transformer(Transformer),
    Delay(Delay),
    Input(MidiInputOp),
    Output(MidiOutputOp),
    Player(MidiPlayerOp),
}

/// Type tags accepted by the factory and reported by `q-operator-types`.
pub const OPERATOR_TYPES: &[&str] = &[
    "Monitor",
    "ChannelFilter",
    "SingleChannelFilter",
    "Distributor",
    "Transformer",
    "Delay",
    "MIDIInput",
    "MIDIOutput",
    "MIDIPlayer",
];

pub struct Operator {
    name: String,
    selector: ChannelSelector,
    parents: BTreeSet<String>,
    children: BTreeSet<String>,
    midi_output_enabled: bool,
    kind: OpKind,
}

impl Operator {
    fn with_kind(name: &str, selector: ChannelSelector, kind: OpKind) -> Self {
        Operator {
            name: name.to_string(),
            selector,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            midi_output_enabled: true,
            kind,
        }
    }

    pub fn monitor(name: &str) -> Self {
        Self::with_kind(name, ChannelSelector::None, OpKind::Monitor(Monitor::new()))
    }

    pub fn channel_filter(name: &str) -> Self {
        Self::with_kind(
            name,
            ChannelSelector::multi_all(),
            OpKind::ChannelFilter(ChannelFilter::new()),
        )
    }

    pub fn single_channel_filter(name: &str) -> Self {
        Self::with_kind(
            name,
            ChannelSelector::single(),
            OpKind::SingleChannelFilter(SingleChannelFilter::new()),
        )
    }

    pub fn distributor(name: &str) -> Self {
        Self::with_kind(
            name,
            ChannelSelector::Multi(0x0001),
            OpKind::Distributor(Distributor::new()),
        )
    }

    pub fn transformer(name: &str) -> Self {
        Self::with_kind(
            name,
            ChannelSelector::None,
            OpKind::Transformer(Transformer::new()),
        )
    }

    pub fn delay(name: &str) -> Self {
        Self::with_kind(name, ChannelSelector::single(), OpKind::Delay(Delay::new()))
    }

    pub fn midi_input(name: &str, op: MidiInputOp) -> Self {
        Self::with_kind(name, ChannelSelector::None, OpKind::Input(op))
    }

    pub fn midi_output(name: &str, op: MidiOutputOp) -> Self {
        Self::with_kind(name, ChannelSelector::None, OpKind::Output(op))
    }

    pub fn midi_player(name: &str) -> Self {
        Self::with_kind(
            name,
            ChannelSelector::None,
            OpKind::Player(MidiPlayerOp::new()),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn op_type(&self) -> &'static str {
        match &self.kind {
            OpKind::Monitor(_) => "Monitor",
            OpKind::ChannelFilter(_) => "ChannelFilter",
            OpKind::SingleChannelFilter(_) => "SingleChannelFilter",
            OpKind::Distributor(_) => "Distributor",
            OpKind::Transformer(_) => "Transformer",
            OpKind::Delay(_) => "Delay",
            OpKind::Input(_) => "MIDIInput",
            OpKind::Output(_) => "MIDIOutput",
            OpKind::Player(_) => "MIDIPlayer",
        }
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut OpKind {
        &mut self.kind
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut ChannelSelector {
        &mut self.selector
    }

    pub fn midi_output_enabled(&self) -> bool {
        self.midi_output_enabled
    }

    pub fn set_midi_output_enabled(&mut self, flag: bool) {
        self.midi_output_enabled = flag;
    }

    // Edge bookkeeping; structural integrity is the registry's business.

    pub fn child_names(&self) -> Vec<String> {
        self.children.iter().cloned().collect()
    }

    pub fn parent_names(&self) -> Vec<String> {
        self.parents.iter().cloned().collect()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.contains(name)
    }

    pub(crate) fn add_child(&mut self, name: &str) {
        self.children.insert(name.to_string());
    }

    pub(crate) fn remove_child(&mut self, name: &str) {
        self.children.remove(name);
    }

    pub(crate) fn add_parent(&mut self, name: &str) {
        self.parents.insert(name.to_string());
    }

    pub(crate) fn remove_parent(&mut self, name: &str) {
        self.parents.remove(name);
    }

    pub(crate) fn clear_edges(&mut self) {
        self.parents.clear();
        self.children.clear();
    }

    /// Gate applied before any processing. Filters veto here; everything
    /// else accepts everything.
    pub fn accept(&self, msg: &MidiMessage) -> bool {
        match &self.kind {
            OpKind::ChannelFilter(f) => match msg.channel_index() {
                Some(index) => self.selector.is_selected(index),
                None => f.enable_system_events,
            },
            OpKind::SingleChannelFilter(f) => match msg.channel_index() {
                Some(index) => self.selector.is_selected(index),
                None => f.enable_system_events,
            },
            _ => true,
        }
    }

    /// Variant logic for one accepted message; the returned messages are
    /// what fans out to children.
    pub fn process(&mut self, msg: &MidiMessage, registry: &SharedRegistry) -> Vec<MidiMessage> {
        let Operator {
            name,
            selector,
            kind,
            ..
        } = self;
        match kind {
            OpKind::Monitor(monitor) => {
                monitor.observe(name, msg);
                vec![msg.clone()]
            }
            OpKind::ChannelFilter(_) | OpKind::SingleChannelFilter(_) => vec![msg.clone()],
            OpKind::Distributor(distributor) => distributor.spread(selector, msg),
            OpKind::Transformer(transformer) => vec![transformer.apply(msg)],
            OpKind::Delay(delay) => match msg.channel_index() {
                Some(index) if selector.is_selected(index) => {
                    delay.handle_selected(registry, name, msg)
                }
                _ => vec![msg.clone()],
            },
            OpKind::Input(_) => vec![msg.clone()],
            OpKind::Output(output) => {
                output.emit(msg);
                vec![msg.clone()]
            }
            OpKind::Player(player) => {
                if let MidiMessage::System { status } = msg {
                    player.handle_transport(registry, name, *status);
                }
                vec![msg.clone()]
            }
        }
    }

    /// Variant-local part of a panic; the recursive walk over children is
    /// driven by the registry.
    pub fn panic_local(&mut self) {
        match &mut self.kind {
            OpKind::Output(output) => output.panic(),
            OpKind::Player(player) => player.panic(),
            OpKind::Delay(delay) => delay.cancel_echoes(),
            _ => {}
        }
    }

    /// Release any driver resource. Called once, on delete.
    pub fn close(&mut self) {
        match &mut self.kind {
            OpKind::Input(input) => input.close(),
            OpKind::Output(output) => output.close(),
            OpKind::Player(player) => player.close(),
            _ => {}
        }
    }

    /// Restore selector and variant parameters to construction defaults.
    /// Edges are untouched.
    pub fn reset(&mut self) {
        self.midi_output_enabled = true;
        match &mut self.kind {
            OpKind::Monitor(m) => m.reset(),
            OpKind::ChannelFilter(f) => {
                f.reset();
                self.selector = ChannelSelector::multi_all();
            }
            OpKind::SingleChannelFilter(f) => {
                f.reset();
                self.selector = ChannelSelector::single();
            }
            OpKind::Distributor(_) => self.selector = ChannelSelector::Multi(0x0001),
            OpKind::Transformer(t) => t.reset(),
            OpKind::Delay(d) => {
                d.reset();
                self.selector = ChannelSelector::single();
            }
            OpKind::Input(_) | OpKind::Output(_) => {}
            OpKind::Player(p) => p.reset(),
        }
    }

    /// Subcommand names this operator answers to, sorted.
    pub fn commands(&self) -> Vec<&'static str> {
        let mut list = vec!["ping", "q-commands", "enable-midi-output"];
        if self.selector.mode() != SelectorMode::None {
            list.extend([
                "enable-channel",
                "select-channel",
                "select-all",
                "deselect-all",
                "q-channels",
                "q-channel-mode",
            ]);
        }
        match &self.kind {
            OpKind::Monitor(_) => list.push("enable"),
            OpKind::ChannelFilter(_) | OpKind::SingleChannelFilter(_) => {
                list.push("enable-system-events")
            }
            OpKind::Distributor(_) => {}
            OpKind::Transformer(_) => {
                list.extend(["set-table-entry", "set-selector", "reset-table"])
            }
            OpKind::Delay(_) => list.extend([
                "set-pattern",
                "set-repeats",
                "set-velocity-offset",
                "set-key-map",
                "select-preset",
                "enable-program-passthrough",
            ]),
            OpKind::Input(_) | OpKind::Output(_) => list.push("q-device"),
            OpKind::Player(_) => list.extend([
                "load",
                "play",
                "stop",
                "continue",
                "q-position",
                "q-duration",
                "q-state",
                "enable-midi-transport",
            ]),
        }
        list.sort_unstable();
        list
    }

    /// Run one subcommand from the operator's table.
    pub fn dispatch_command(
        &mut self,
        command: &str,
        tokens: &[String],
        registry: &SharedRegistry,
    ) -> Result<Vec<String>, CommandError> {
        match command {
            "ping" => {
                return Ok(vec![format!("{} ({}) alive", self.name, self.op_type())]);
            }
            "q-commands" => {
                return Ok(self.commands().iter().map(|c| c.to_string()).collect());
            }
            "enable-midi-output" => {
                self.midi_output_enabled = args::bool_token(tokens, 0)?;
                return Ok(vec![format!(
                    "{} midi-output {}",
                    self.name, self.midi_output_enabled
                )]);
            }
            _ => {}
        }

        if self.selector.mode() != SelectorMode::None {
            match command {
                "enable-channel" => {
                    let index = args::channel_token(tokens, 0)?;
                    let flag = args::bool_token(tokens, 1)?;
                    self.selector.enable(index, flag);
                    return Ok(vec![self.channel_summary()]);
                }
                "select-channel" => {
                    let index = args::channel_token(tokens, 0)?;
                    self.selector.select(index);
                    return Ok(vec![self.channel_summary()]);
                }
                "select-all" => {
                    self.selector.select_all();
                    return Ok(vec![self.channel_summary()]);
                }
                "deselect-all" => {
                    self.selector.deselect_all();
                    return Ok(vec![self.channel_summary()]);
                }
                "q-channels" => return Ok(vec![self.channel_summary()]),
                "q-channel-mode" => return Ok(vec![self.selector.mode().to_string()]),
                _ => {}
            }
        }

        let Operator { name, kind, .. } = self;
        match kind {
            OpKind::Monitor(monitor) => {
                if command == "enable" {
                    let flag = args::bool_token(tokens, 0)?;
                    monitor.set_trace_enabled(flag);
                    return Ok(vec![format!("{} trace {}", name, flag)]);
                }
            }
            OpKind::ChannelFilter(filter) => {
                if command == "enable-system-events" {
                    filter.enable_system_events = args::bool_token(tokens, 0)?;
                    return Ok(vec![format!(
                        "{} system-events {}",
                        name, filter.enable_system_events
                    )]);
                }
            }
            OpKind::SingleChannelFilter(filter) => {
                if command == "enable-system-events" {
                    filter.enable_system_events = args::bool_token(tokens, 0)?;
                    return Ok(vec![format!(
                        "{} system-events {}",
                        name, filter.enable_system_events
                    )]);
                }
            }
            OpKind::Distributor(_) => {}
            OpKind::Transformer(transformer) => match command {
                "set-table-entry" => {
                    let index = args::int_token(tokens, 0)?;
                    let value = args::int_token(tokens, 1)?;
                    transformer.set_table_entry(index, value);
                    return Ok(vec![format!("{} table[{}] = {}", name, index, value)]);
                }
                "set-selector" => {
                    let status = args::int_token(tokens, 0)?;
                    let index = args::int_token(tokens, 1)?;
                    let ok = (0..=0xFF).contains(&status)
                        && transformer.set_selector(status as u8, index.max(0) as usize);
                    if !ok {
                        return Err(CommandError::ArgType {
                            index: 0,
                            expected: "status class and data index 1..2",
                            got: format!("{} {}", status, index),
                        });
                    }
                    return Ok(vec![format!("{} selector {:#04X}/{}", name, status, index)]);
                }
                "reset-table" => {
                    transformer.reset_table();
                    return Ok(vec![format!("{} table reset", name)]);
                }
                _ => {}
            },
            OpKind::Delay(delay) => match command {
                "set-pattern" => {
                    if tokens.is_empty() {
                        return Err(CommandError::ArgCount { expected: 1, got: 0 });
                    }
                    let mut pattern = Vec::with_capacity(tokens.len());
                    for i in 0..tokens.len() {
                        let ms = args::int_token(tokens, i)?;
                        if ms <= 0 {
                            return Err(CommandError::ArgType {
                                index: i,
                                expected: "positive milliseconds",
                                got: tokens[i].clone(),
                            });
                        }
                        pattern.push(ms as u64);
                    }
                    delay.set_pattern(pattern);
                    return Ok(vec![format!("{} pattern set", name)]);
                }
                "set-repeats" => {
                    let repeats = args::int_token(tokens, 0)?;
                    delay.set_repeats(repeats.max(0) as usize);
                    return Ok(vec![format!("{} repeats {}", name, repeats)]);
                }
                "set-velocity-offset" => {
                    let offset = args::int_token(tokens, 0)?;
                    delay.set_velocity_offset(offset.clamp(-127, 127) as i16);
                    return Ok(vec![format!("{} velocity-offset {}", name, offset)]);
                }
                "set-key-map" => {
                    let index = args::int_token(tokens, 0)?;
                    let value = args::int_token(tokens, 1)?;
                    delay.set_key_map_entry(index, value);
                    return Ok(vec![format!("{} key-map[{}] = {}", name, index, value)]);
                }
                "select-preset" => {
                    let slot = args::int_token(tokens, 0)?;
                    delay.select_preset(slot.max(0) as usize);
                    return Ok(vec![format!("{} preset {}", name, delay.active_preset())]);
                }
                "enable-program-passthrough" => {
                    let flag = args::bool_token(tokens, 0)?;
                    delay.set_program_passthrough(flag);
                    return Ok(vec![format!("{} program-passthrough {}", name, flag)]);
                }
                _ => {}
            },
            OpKind::Input(input) => {
                if command == "q-device" {
                    return Ok(vec![input.device().to_string()]);
                }
            }
            OpKind::Output(output) => {
                if command == "q-device" {
                    return Ok(vec![output.device().to_string()]);
                }
            }
            OpKind::Player(player) => match command {
                "load" => {
                    let filename = args::str_token(tokens, 0)?;
                    player.load(filename)?;
                    return Ok(vec![format!("{} loaded {}", name, filename)]);
                }
                "play" => {
                    player.play(registry, name, tokens.first().map(String::as_str))?;
                    return Ok(vec![format!("{} playing", name)]);
                }
                "stop" => {
                    player.stop();
                    return Ok(vec![format!("{} stopping", name)]);
                }
                "continue" => {
                    player.resume(registry, name)?;
                    return Ok(vec![format!("{} continuing", name)]);
                }
                "q-position" => return Ok(vec![player.position_usec().to_string()]),
                "q-duration" => return Ok(vec![player.duration_usec().to_string()]),
                "q-state" => return Ok(vec![player.state().to_string()]),
                "enable-midi-transport" => {
                    let flag = args::bool_token(tokens, 0)?;
                    player.set_midi_transport(flag);
                    return Ok(vec![format!("{} midi-transport {}", name, flag)]);
                }
                _ => {}
            },
        }

        Err(CommandError::UnknownCommand(format!(
            "{}.{}",
            self.name, command
        )))
    }

    fn channel_summary(&self) -> String {
        let channels: Vec<String> = self
            .selector
            .selected_indexes()
            .into_iter()
            .map(|i| (i + 1).to_string())
            .collect();
        format!("{} channels [{}]", self.name, channels.join(", "))
    }
}
