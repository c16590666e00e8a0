// MIDI devices - Port enumeration and lookup by name

use midir::{Ignore, MidiInput as MidirInput, MidiInputPort, MidiOutput as MidirOutput, MidiOutputPort};

pub(crate) const CLIENT_NAME: &str = "midiseq";

/// Direction of a MIDI port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub index: usize,
    pub name: String,
    pub direction: PortDirection,
    pub is_default: bool,
}

/// Case-insensitive substring match of a port name against a pattern
pub fn port_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Index of the first name matching `pattern`, the first port for None
pub fn select_port(names: &[String], pattern: Option<&str>) -> Option<usize> {
    match pattern {
        None => (!names.is_empty()).then_some(0),
        Some(pattern) => names.iter().position(|name| port_matches(name, pattern)),
    }
}

pub struct MidiDeviceManager;

impl MidiDeviceManager {
    pub fn new() -> Self {
        Self
    }

    /// All input ports; the first one is considered the default
    pub fn list_input_ports(&self) -> Vec<MidiDeviceInfo> {
        let Ok(midi_in) = MidirInput::new(&format!("{} scanner", CLIENT_NAME)) else {
            return Vec::new();
        };
        midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in.port_name(port).ok().map(|name| MidiDeviceInfo {
                    index,
                    name,
                    direction: PortDirection::Input,
                    is_default: index == 0,
                })
            })
            .collect()
    }

    /// All output ports; the first one is considered the default
    pub fn list_output_ports(&self) -> Vec<MidiDeviceInfo> {
        let Ok(midi_out) = MidirOutput::new(&format!("{} scanner", CLIENT_NAME)) else {
            return Vec::new();
        };
        midi_out
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_out.port_name(port).ok().map(|name| MidiDeviceInfo {
                    index,
                    name,
                    direction: PortDirection::Output,
                    is_default: index == 0,
                })
            })
            .collect()
    }

    /// Input client and the port matching `pattern` (first port for None)
    pub fn find_input_port(&self, pattern: Option<&str>) -> Option<(MidirInput, MidiInputPort, String)> {
        let mut midi_in = MidirInput::new(&format!("{} input", CLIENT_NAME)).ok()?;
        midi_in.ignore(Ignore::All);
        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|port| midi_in.port_name(port).unwrap_or_default())
            .collect();
        let index = select_port(&names, pattern)?;
        let port = ports.into_iter().nth(index)?;
        let name = names.into_iter().nth(index)?;
        Some((midi_in, port, name))
    }

    /// Output client and the port matching `pattern` (first port for None)
    pub fn find_output_port(
        &self,
        pattern: Option<&str>,
    ) -> Option<(MidirOutput, MidiOutputPort, String)> {
        let midi_out = MidirOutput::new(&format!("{} output", CLIENT_NAME)).ok()?;
        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|port| midi_out.port_name(port).unwrap_or_default())
            .collect();
        let index = select_port(&names, pattern)?;
        let port = ports.into_iter().nth(index)?;
        let name = names.into_iter().nth(index)?;
        Some((midi_out, port, name))
    }
}

impl Default for MidiDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
