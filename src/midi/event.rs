// MIDI event types
// Absolute-tick events stored in tracks, plus raw wire parsing

use std::fmt;

/// Channel used by General MIDI for drums, also used by the click track
pub const DRUM_CHANNEL: u8 = 9;

/// Meta events carried by tracks (never sent to the sound sink)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    /// Microseconds per quarter note
    Tempo(u32),
    TimeSignature {
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        notated_32nd: u8,
    },
    KeySignature {
        sharps: i8,
        minor: bool,
    },
    Text(String),
    Copyright(String),
    TrackName(String),
    InstrumentName(String),
    Lyric(String),
    Marker(String),
    CuePoint(String),
    EndOfTrack,
    /// Any other meta type, kept verbatim for export
    Other(u8, Vec<u8>),
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    /// 14-bit value, 8192 is the centre
    PitchBend { value: u16 },
    ChannelAftertouch { pressure: u8 },
    PolyAftertouch { note: u8, pressure: u8 },
    SysEx(Vec<u8>),
    Meta(MetaEvent),
}

/// Event stamped with an absolute tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub tick: i64,
    pub channel: u8,
    pub kind: EventKind,
}

impl Event {
    pub fn new(tick: i64, channel: u8, kind: EventKind) -> Self {
        Self {
            tick,
            channel: channel & 0x0F,
            kind,
        }
    }

    pub fn note_on(tick: i64, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(tick, channel, EventKind::NoteOn { note, velocity })
    }

    pub fn note_off(tick: i64, channel: u8, note: u8) -> Self {
        Self::new(tick, channel, EventKind::NoteOff { note, velocity: 0 })
    }

    pub fn control_change(tick: i64, channel: u8, controller: u8, value: u8) -> Self {
        Self::new(tick, channel, EventKind::ControlChange { controller, value })
    }

    pub fn program_change(tick: i64, channel: u8, program: u8) -> Self {
        Self::new(tick, channel, EventKind::ProgramChange { program })
    }

    pub fn meta(tick: i64, meta: MetaEvent) -> Self {
        Self::new(tick, 0, EventKind::Meta(meta))
    }

    pub fn tempo(tick: i64, tempo: u32) -> Self {
        Self::meta(tick, MetaEvent::Tempo(tempo))
    }

    pub fn end_of_track(tick: i64) -> Self {
        Self::meta(tick, MetaEvent::EndOfTrack)
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self.kind, EventKind::NoteOn { .. })
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self.kind, EventKind::NoteOff { .. })
    }

    /// Note number for note on/off and poly aftertouch
    pub fn note(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOn { note, .. }
            | EventKind::NoteOff { note, .. }
            | EventKind::PolyAftertouch { note, .. } => Some(note),
            _ => None,
        }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self.kind, EventKind::Meta(_))
    }

    pub fn is_tempo(&self) -> bool {
        matches!(self.kind, EventKind::Meta(MetaEvent::Tempo(_)))
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(self.kind, EventKind::Meta(MetaEvent::EndOfTrack))
    }

    /// Channel voice messages, the only ones sent to a sound sink
    pub fn is_playable(&self) -> bool {
        !matches!(self.kind, EventKind::Meta(_) | EventKind::SysEx(_))
    }

    /// Copy of this event moved to another tick
    pub fn at(&self, tick: i64) -> Self {
        Self {
            tick,
            ..self.clone()
        }
    }

    /// Parse a raw MIDI message
    /// NoteOn with velocity 0 is read as NoteOff
    pub fn from_bytes(bytes: &[u8], tick: i64) -> Option<Self> {
        let status = *bytes.first()?;
        if status == 0xF0 {
            return Some(Self::new(tick, 0, EventKind::SysEx(bytes[1..].to_vec())));
        }
        let channel = status & 0x0F;
        let data1 = bytes.get(1).copied();
        let data2 = bytes.get(2).copied();

        let kind = match (status & 0xF0, data1, data2) {
            (0x80, Some(note), Some(velocity)) => EventKind::NoteOff { note, velocity },
            (0x90, Some(note), Some(0)) => EventKind::NoteOff { note, velocity: 0 },
            (0x90, Some(note), Some(velocity)) => EventKind::NoteOn { note, velocity },
            (0xA0, Some(note), Some(pressure)) => EventKind::PolyAftertouch { note, pressure },
            (0xB0, Some(controller), Some(value)) => EventKind::ControlChange { controller, value },
            (0xC0, Some(program), _) => EventKind::ProgramChange { program },
            (0xD0, Some(pressure), _) => EventKind::ChannelAftertouch { pressure },
            (0xE0, Some(lsb), Some(msb)) => EventKind::PitchBend {
                value: ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F),
            },
            _ => return None,
        };
        Some(Self::new(tick, channel, kind))
    }

    /// Serialize a channel message to wire bytes, None for meta events
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let chan = self.channel & 0x0F;
        let bytes = match &self.kind {
            EventKind::NoteOn { note, velocity } => vec![0x90 | chan, *note & 0x7F, *velocity & 0x7F],
            EventKind::NoteOff { note, velocity } => vec![0x80 | chan, *note & 0x7F, *velocity & 0x7F],
            EventKind::PolyAftertouch { note, pressure } => {
                vec![0xA0 | chan, *note & 0x7F, *pressure & 0x7F]
            }
            EventKind::ControlChange { controller, value } => {
                vec![0xB0 | chan, *controller & 0x7F, *value & 0x7F]
            }
            EventKind::ProgramChange { program } => vec![0xC0 | chan, *program & 0x7F],
            EventKind::ChannelAftertouch { pressure } => vec![0xD0 | chan, *pressure & 0x7F],
            EventKind::PitchBend { value } => {
                vec![0xE0 | chan, (*value & 0x7F) as u8, ((*value >> 7) & 0x7F) as u8]
            }
            EventKind::SysEx(data) => {
                let mut bytes = Vec::with_capacity(data.len() + 1);
                bytes.push(0xF0);
                bytes.extend_from_slice(data);
                bytes
            }
            EventKind::Meta(_) => return None,
        };
        Some(bytes)
    }

    /// Short type name, used in listings
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            EventKind::NoteOn { .. } => "note_on",
            EventKind::NoteOff { .. } => "note_off",
            EventKind::ControlChange { .. } => "control_change",
            EventKind::ProgramChange { .. } => "program_change",
            EventKind::PitchBend { .. } => "pitchwheel",
            EventKind::ChannelAftertouch { .. } => "aftertouch",
            EventKind::PolyAftertouch { .. } => "polytouch",
            EventKind::SysEx(_) => "sysex",
            EventKind::Meta(meta) => match meta {
                MetaEvent::Tempo(_) => "set_tempo",
                MetaEvent::TimeSignature { .. } => "time_signature",
                MetaEvent::KeySignature { .. } => "key_signature",
                MetaEvent::Text(_) => "text",
                MetaEvent::Copyright(_) => "copyright",
                MetaEvent::TrackName(_) => "track_name",
                MetaEvent::InstrumentName(_) => "instrument_name",
                MetaEvent::Lyric(_) => "lyrics",
                MetaEvent::Marker(_) => "marker",
                MetaEvent::CuePoint(_) => "cue_marker",
                MetaEvent::EndOfTrack => "end_of_track",
                MetaEvent::Other(..) => "unknown_meta",
            },
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8} {}", self.tick, self.type_name())?;
        match &self.kind {
            EventKind::NoteOn { note, velocity } | EventKind::NoteOff { note, velocity } => {
                write!(f, " chan={} note={} vel={}", self.channel, note, velocity)
            }
            EventKind::ControlChange { controller, value } => {
                write!(f, " chan={} ctrl={} val={}", self.channel, controller, value)
            }
            EventKind::ProgramChange { program } => {
                write!(f, " chan={} prog={}", self.channel, program)
            }
            EventKind::PitchBend { value } => write!(f, " chan={} val={}", self.channel, value),
            EventKind::ChannelAftertouch { pressure } => {
                write!(f, " chan={} val={}", self.channel, pressure)
            }
            EventKind::PolyAftertouch { note, pressure } => {
                write!(f, " chan={} note={} val={}", self.channel, note, pressure)
            }
            EventKind::Meta(MetaEvent::Tempo(tempo)) => write!(f, " tempo={}", tempo),
            EventKind::Meta(
                MetaEvent::Text(text)
                | MetaEvent::TrackName(text)
                | MetaEvent::InstrumentName(text)
                | MetaEvent::Marker(text),
            ) => write!(f, " \"{}\"", text),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on() {
        let event = Event::from_bytes(&[0x91, 60, 100], 10).unwrap();
        assert_eq!(event.tick, 10);
        assert_eq!(event.channel, 1);
        assert_eq!(event.kind, EventKind::NoteOn { note: 60, velocity: 100 });
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let event = Event::from_bytes(&[0x90, 64, 0], 0).unwrap();
        assert!(event.is_note_off());
        assert_eq!(event.note(), Some(64));
    }

    #[test]
    fn test_program_change_two_bytes() {
        let event = Event::from_bytes(&[0xC3, 12], 0).unwrap();
        assert_eq!(event.channel, 3);
        assert_eq!(event.kind, EventKind::ProgramChange { program: 12 });
    }

    #[test]
    fn test_pitch_bend_centre() {
        let event = Event::from_bytes(&[0xE0, 0x00, 0x40], 0).unwrap();
        assert_eq!(event.kind, EventKind::PitchBend { value: 8192 });
        assert_eq!(event.to_bytes(), Some(vec![0xE0, 0x00, 0x40]));
    }

    #[test]
    fn test_truncated_and_empty_messages() {
        assert!(Event::from_bytes(&[], 0).is_none());
        assert!(Event::from_bytes(&[0x90, 60], 0).is_none());
        assert!(Event::from_bytes(&[0xF8], 0).is_none());
    }

    #[test]
    fn test_meta_is_not_playable() {
        assert!(!Event::tempo(0, 500_000).is_playable());
        assert!(Event::end_of_track(0).to_bytes().is_none());
        assert!(Event::note_on(0, 0, 60, 90).is_playable());
    }

    #[test]
    fn test_display() {
        let ev = Event::note_on(120, 2, 60, 90);
        assert_eq!(ev.to_string(), "     120 note_on chan=2 note=60 vel=90");
    }
}
