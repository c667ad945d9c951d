//! Channel distributor: clones channel messages onto every selected channel.

use crate::graph::selector::ChannelSelector;
use crate::midi::MidiMessage;

#[derive(Default)]
pub struct Distributor;

impl Distributor {
    pub fn new() -> Self {
        Distributor
    }

    /// One copy per selected channel, in ascending channel order, with the
    /// channel nibble rewritten. Non-channel messages pass once unchanged.
    pub fn spread(&self, selector: &ChannelSelector, msg: &MidiMessage) -> Vec<MidiMessage> {
        match msg {
            MidiMessage::Channel {
                status,
                data1,
                data2,
                ..
            } => selector
                .selected_indexes()
                .into_iter()
                .map(|index| MidiMessage::channel(*status, index as u8, *data1, *data2))
                .collect(),
            other => vec![other.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_per_selected_channel() {
        let mut selector = ChannelSelector::Multi(0);
        for index in [0, 2, 6] {
            selector.enable(index, true);
        }
        let out = Distributor::new().spread(&selector, &MidiMessage::note_on(0, 0x3C, 0x40));
        assert_eq!(
            out.iter().map(MidiMessage::to_bytes).collect::<Vec<_>>(),
            vec![
                vec![0x90, 0x3C, 0x40],
                vec![0x92, 0x3C, 0x40],
                vec![0x96, 0x3C, 0x40],
            ]
        );
    }

    #[test]
    fn test_system_passes_once() {
        let selector = ChannelSelector::Multi(0b0000_0000_0100_0101);
        let clock = MidiMessage::System { status: 0xF8 };
        let out = Distributor::new().spread(&selector, &clock);
        assert_eq!(out, vec![clock]);
    }

    #[test]
    fn test_empty_selection_drops_channel_messages() {
        let selector = ChannelSelector::Multi(0);
        let out = Distributor::new().spread(&selector, &MidiMessage::note_on(3, 60, 90));
        assert!(out.is_empty());
    }
}
