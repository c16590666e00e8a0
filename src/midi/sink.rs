// Sound sink - Output capability consumed by the sequencer
// Any synth backend implements this trait; the scheduler only talks to it

use crate::midi::event::{Event, EventKind};
use std::sync::{Mutex, PoisonError};

/// Number of MIDI channels addressed by a full panic
pub const CHANNEL_COUNT: u8 = 16;

/// Output side of the sequencer
///
/// Calls are expected to be synchronous and fast; the scheduler thread
/// invokes them directly while it holds no sequence lock.
pub trait SoundSink: Send + Sync {
    fn note_on(&self, channel: u8, note: u8, velocity: u8);

    fn note_off(&self, channel: u8, note: u8);

    fn program_change(&self, channel: u8, program: u8);

    fn control_change(&self, channel: u8, controller: u8, value: u8);

    /// Bank select (CC 0)
    fn bank_change(&self, channel: u8, bank: u8) {
        self.control_change(channel, 0, bank);
    }

    fn pitch_bend(&self, _channel: u8, _value: u16) {}

    fn aftertouch(&self, _channel: u8, _pressure: u8) {}

    fn poly_aftertouch(&self, _channel: u8, _note: u8, _pressure: u8) {}

    /// All notes off on one channel, or on every channel for None
    fn panic(&self, channel: Option<u8>) {
        match channel {
            Some(chan) => self.control_change(chan, 123, 0),
            None => {
                for chan in 0..CHANNEL_COUNT {
                    self.control_change(chan, 123, 0);
                }
            }
        }
    }

    /// Panic plus program reset on every channel
    fn reset(&self) {
        self.panic(None);
        for chan in 0..CHANNEL_COUNT {
            self.program_change(chan, 0);
        }
    }

    /// Dispatch a playable event, meta and sysex events are ignored
    fn send_event(&self, event: &Event) {
        let chan = event.channel;
        match event.kind {
            EventKind::NoteOn { note, velocity } => self.note_on(chan, note, velocity),
            EventKind::NoteOff { note, .. } => self.note_off(chan, note),
            EventKind::ControlChange { controller, value } => {
                self.control_change(chan, controller, value)
            }
            EventKind::ProgramChange { program } => self.program_change(chan, program),
            EventKind::PitchBend { value } => self.pitch_bend(chan, value),
            EventKind::ChannelAftertouch { pressure } => self.aftertouch(chan, pressure),
            EventKind::PolyAftertouch { note, pressure } => {
                self.poly_aftertouch(chan, note, pressure)
            }
            EventKind::SysEx(_) | EventKind::Meta(_) => {}
        }
    }
}

/// Sink that drops everything
#[derive(Debug, Default)]
pub struct NullSink;

impl SoundSink for NullSink {
    fn note_on(&self, _channel: u8, _note: u8, _velocity: u8) {}
    fn note_off(&self, _channel: u8, _note: u8) {}
    fn program_change(&self, _channel: u8, _program: u8) {}
    fn control_change(&self, _channel: u8, _controller: u8, _value: u8) {}
}

/// One call received by a [`CaptureSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: u16 },
    Aftertouch { channel: u8, pressure: u8 },
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    Panic { channel: Option<u8> },
}

/// Sink that records every call, for dry runs and tests
#[derive(Debug, Default)]
pub struct CaptureSink {
    messages: Mutex<Vec<SinkMessage>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, msg: SinkMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg);
    }

    /// Snapshot of all messages received so far
    pub fn messages(&self) -> Vec<SinkMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the note on messages, as (channel, note, velocity)
    pub fn notes_on(&self) -> Vec<(u8, u8, u8)> {
        self.messages()
            .into_iter()
            .filter_map(|msg| match msg {
                SinkMessage::NoteOn {
                    channel,
                    note,
                    velocity,
                } => Some((channel, note, velocity)),
                _ => None,
            })
            .collect()
    }

    pub fn panic_count(&self) -> usize {
        self.messages()
            .iter()
            .filter(|msg| matches!(msg, SinkMessage::Panic { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SoundSink for CaptureSink {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.push(SinkMessage::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&self, channel: u8, note: u8) {
        self.push(SinkMessage::NoteOff { channel, note });
    }

    fn program_change(&self, channel: u8, program: u8) {
        self.push(SinkMessage::ProgramChange { channel, program });
    }

    fn control_change(&self, channel: u8, controller: u8, value: u8) {
        self.push(SinkMessage::ControlChange {
            channel,
            controller,
            value,
        });
    }

    fn pitch_bend(&self, channel: u8, value: u16) {
        self.push(SinkMessage::PitchBend { channel, value });
    }

    fn aftertouch(&self, channel: u8, pressure: u8) {
        self.push(SinkMessage::Aftertouch { channel, pressure });
    }

    fn poly_aftertouch(&self, channel: u8, note: u8, pressure: u8) {
        self.push(SinkMessage::PolyAftertouch {
            channel,
            note,
            pressure,
        });
    }

    // Recorded as a single message rather than sixteen CC 123
    fn panic(&self, channel: Option<u8>) {
        self.push(SinkMessage::Panic { channel });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_event_dispatch() {
        let sink = CaptureSink::new();
        sink.send_event(&Event::note_on(0, 3, 60, 100));
        sink.send_event(&Event::note_off(0, 3, 60));
        sink.send_event(&Event::tempo(0, 500_000));
        sink.send_event(&Event::program_change(0, 1, 5));

        assert_eq!(
            sink.messages(),
            vec![
                SinkMessage::NoteOn {
                    channel: 3,
                    note: 60,
                    velocity: 100
                },
                SinkMessage::NoteOff { channel: 3, note: 60 },
                SinkMessage::ProgramChange {
                    channel: 1,
                    program: 5
                },
            ]
        );
    }

    #[test]
    fn test_default_panic_sends_cc123_on_all_channels() {
        struct CcCounter(Mutex<Vec<(u8, u8)>>);
        impl SoundSink for CcCounter {
            fn note_on(&self, _: u8, _: u8, _: u8) {}
            fn note_off(&self, _: u8, _: u8) {}
            fn program_change(&self, _: u8, _: u8) {}
            fn control_change(&self, channel: u8, controller: u8, _: u8) {
                self.0.lock().unwrap().push((channel, controller));
            }
        }

        let sink = CcCounter(Mutex::new(Vec::new()));
        sink.panic(None);
        let calls = sink.0.lock().unwrap().clone();
        assert_eq!(calls.len(), 16);
        assert!(calls.iter().all(|(_, ctrl)| *ctrl == 123));

        sink.0.lock().unwrap().clear();
        sink.panic(Some(4));
        assert_eq!(sink.0.lock().unwrap().as_slice(), &[(4, 123)]);
    }

    #[test]
    fn test_bank_change_is_cc0() {
        let sink = CaptureSink::new();
        sink.bank_change(2, 7);
        assert_eq!(
            sink.messages(),
            vec![SinkMessage::ControlChange {
                channel: 2,
                controller: 0,
                value: 7
            }]
        );
    }
}
