// MIDI Input - Forwards incoming channel messages to the scheduler ring

use crate::messaging::channels::InputProducer;
use crate::messaging::command::RawMidi;
use crate::midi::device::MidiDeviceManager;
use midir::MidiInputConnection;
use ringbuf::traits::Producer;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("No MIDI input port available")]
    NoPorts,

    #[error("MIDI input port not found: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI input: {0}")]
    Connect(String),
}

/// Open input connection; dropping it closes the port
pub struct MidiInput {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiInput {
    /// Connect to the port matching `pattern` (first port for None)
    ///
    /// The callback runs on the midir thread: it only pushes into the ring,
    /// dropping messages when the scheduler falls behind.
    pub fn connect(pattern: Option<&str>, mut tx: InputProducer) -> Result<Self, InputError> {
        let manager = MidiDeviceManager::new();
        let (midi_in, port, port_name) =
            manager.find_input_port(pattern).ok_or_else(|| match pattern {
                Some(pattern) => InputError::PortNotFound(pattern.to_string()),
                None => InputError::NoPorts,
            })?;

        let connection = midi_in
            .connect(
                &port,
                "midiseq-in",
                move |_timestamp, message, _| {
                    let Some(raw) = RawMidi::from_slice(message) else {
                        return;
                    };
                    if tx.try_push(raw).is_err() {
                        log::warn!("MIDI input buffer full, event ignored");
                    }
                },
                (),
            )
            .map_err(|e| InputError::Connect(e.to_string()))?;

        log::info!("MIDI input connected: {}", port_name);
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}
