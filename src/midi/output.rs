// MIDI Output - Sound sink writing to a hardware or virtual port through midir

use crate::midi::device::MidiDeviceManager;
use crate::midi::sink::SoundSink;
use midir::MidiOutputConnection;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("No MIDI output port available")]
    NoPorts,

    #[error("MIDI output port not found: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI output: {0}")]
    Connect(String),
}

/// Sound sink backed by a MIDI output connection
pub struct MidiOutput {
    connection: Mutex<MidiOutputConnection>,
    port_name: String,
}

impl MidiOutput {
    /// Connect to the first port whose name contains `pattern`, or the first
    /// port when `pattern` is None
    pub fn connect(pattern: Option<&str>) -> Result<Self, OutputError> {
        let manager = MidiDeviceManager::new();
        let (midi_out, port, port_name) = manager.find_output_port(pattern).ok_or_else(|| {
            match pattern {
                Some(pattern) => OutputError::PortNotFound(pattern.to_string()),
                None => OutputError::NoPorts,
            }
        })?;

        let connection = midi_out
            .connect(&port, "midiseq-out")
            .map_err(|e| OutputError::Connect(e.to_string()))?;

        log::info!("MIDI output connected: {}", port_name);
        Ok(Self {
            connection: Mutex::new(connection),
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&self, message: &[u8]) {
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = connection.send(message) {
            log::warn!("MIDI send failed on {}: {}", self.port_name, e);
        }
    }
}

impl SoundSink for MidiOutput {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.send(&[0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]);
    }

    fn note_off(&self, channel: u8, note: u8) {
        self.send(&[0x80 | (channel & 0x0F), note & 0x7F, 0]);
    }

    fn program_change(&self, channel: u8, program: u8) {
        self.send(&[0xC0 | (channel & 0x0F), program & 0x7F]);
    }

    fn control_change(&self, channel: u8, controller: u8, value: u8) {
        self.send(&[0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]);
    }

    fn pitch_bend(&self, channel: u8, value: u16) {
        let value = value & 0x3FFF;
        self.send(&[
            0xE0 | (channel & 0x0F),
            (value & 0x7F) as u8,
            (value >> 7) as u8,
        ]);
    }

    fn aftertouch(&self, channel: u8, pressure: u8) {
        self.send(&[0xD0 | (channel & 0x0F), pressure & 0x7F]);
    }

    fn poly_aftertouch(&self, channel: u8, note: u8, pressure: u8) {
        self.send(&[0xA0 | (channel & 0x0F), note & 0x7F, pressure & 0x7F]);
    }
}

impl Drop for MidiOutput {
    fn drop(&mut self) {
        self.panic(None);
    }
}
