// Engine commands - Control thread → scheduler thread

/// Requests the scheduler applies at the start of its next iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    /// Tempo changed; the clock is re-anchored at the current tick
    /// using the new seconds-per-tick
    SetTempo { sec_per_tick: f64 },
    /// Silence the sink from the scheduler thread
    Panic,
}

/// Raw MIDI message from an input port, fixed size so it stays `Copy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMidi {
    bytes: [u8; 3],
    len: u8,
}

impl RawMidi {
    /// Keep channel messages only (at most three bytes)
    pub fn from_slice(message: &[u8]) -> Option<Self> {
        if message.is_empty() || message.len() > 3 {
            return None;
        }
        let mut bytes = [0u8; 3];
        bytes[..message.len()].copy_from_slice(message);
        Some(Self {
            bytes,
            len: message.len() as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}
