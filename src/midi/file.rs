// Standard MIDI File - Load and save sequences through midly
// Files are read as format 0 or 1 and always written as format 1

use crate::midi::event::{Event, EventKind, MetaEvent};
use crate::sequencer::edit;
use crate::sequencer::sequence::Sequence;
use crate::sequencer::timebase::TimeBase;
use crate::sequencer::track::Track;
use midly::num::{u4, u7, u14, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// MIDI file error types
#[derive(Debug, thiserror::Error)]
pub enum MidiFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("Unsupported timing: {0}")]
    UnsupportedTiming(String),

    #[error("MIDI file contains no track")]
    Empty,

    #[error("Resolution {0} does not fit in a MIDI header")]
    InvalidPpq(u32),
}

/// Decoded content of a MIDI file
#[derive(Debug, Clone, PartialEq)]
pub struct SmfData {
    pub format: u16,
    pub ppq: u32,
    /// First tempo found at tick 0
    pub tempo: Option<u32>,
    /// First time signature found at tick 0
    pub time_signature: Option<(u8, u8)>,
    pub tracks: Vec<Track>,
}

impl SmfData {
    /// Time base described by the file header and its tick-0 meta events
    pub fn time_base(&self) -> TimeBase {
        let mut base = TimeBase::new(self.ppq);
        if let Some(tempo) = self.tempo {
            base.set_tempo(tempo);
        }
        if let Some((numerator, denominator)) = self.time_signature {
            if !base.set_time_signature(numerator, denominator) {
                log::warn!("Ignoring time signature {}/{}", numerator, denominator);
            }
        }
        base
    }

    /// Build a ready-to-play sequence: click regenerated, track ends
    /// equalized, timeline built, loop off
    pub fn into_sequence(self) -> Sequence {
        let mut seq = Sequence::from_base(self.time_base());
        seq.load_tracks(self.tracks);
        seq
    }
}

/// Read and decode a MIDI file
pub fn read_file(path: &Path) -> Result<SmfData, MidiFileError> {
    let bytes = fs::read(path)?;
    parse_bytes(&bytes)
}

/// Load a MIDI file as a sequence
pub fn load_sequence(path: &Path) -> Result<Sequence, MidiFileError> {
    let data = read_file(path)?;
    log::info!(
        "Loaded {} (format {}, {} tracks, {} ppq)",
        path.display(),
        data.format,
        data.tracks.len(),
        data.ppq
    );
    Ok(data.into_sequence())
}

/// Save a sequence as a format 1 MIDI file
pub fn save_sequence(seq: &Sequence, path: &Path) -> Result<(), MidiFileError> {
    let mut tracks = seq.tracks().to_vec();
    edit::clean_tracks(&mut tracks);
    let bytes = write_bytes(seq.base().ppq(), &tracks)?;
    fs::write(path, bytes)?;
    log::info!("Saved {} ({} tracks)", path.display(), tracks.len());
    Ok(())
}

/// Decode SMF bytes; a format 0 track is split per channel
pub fn parse_bytes(bytes: &[u8]) -> Result<SmfData, MidiFileError> {
    let smf = Smf::parse(bytes)?;
    let ppq = match smf.header.timing {
        Timing::Metrical(ppq) => ppq.as_int() as u32,
        Timing::Timecode(fps, sub) => {
            return Err(MidiFileError::UnsupportedTiming(format!(
                "SMPTE {:?}, {} subframes",
                fps, sub
            )));
        }
    };
    if ppq == 0 {
        return Err(MidiFileError::InvalidPpq(0));
    }
    if smf.tracks.is_empty() {
        return Err(MidiFileError::Empty);
    }

    let format = match smf.header.format {
        Format::SingleTrack => 0,
        Format::Parallel => 1,
        Format::Sequential => {
            log::warn!("Format 2 file read as format 1");
            2
        }
    };

    let mut tracks: Vec<Track> = smf.tracks.iter().map(|raw| read_track(raw.as_slice())).collect();
    if format == 0 {
        tracks = split_by_channel(tracks);
    }

    let tempo = tracks.iter().flat_map(|t| t.events()).find_map(|ev| match ev.kind {
        EventKind::Meta(MetaEvent::Tempo(tempo)) if ev.tick == 0 => Some(tempo),
        _ => None,
    });
    let time_signature = tracks.iter().flat_map(|t| t.events()).find_map(|ev| match ev.kind {
        EventKind::Meta(MetaEvent::TimeSignature {
            numerator,
            denominator,
            ..
        }) if ev.tick == 0 => Some((numerator, denominator)),
        _ => None,
    });

    Ok(SmfData {
        format,
        ppq,
        tempo,
        time_signature,
        tracks,
    })
}

/// Encode tracks as format 1 SMF bytes
pub fn write_bytes(ppq: u32, tracks: &[Track]) -> Result<Vec<u8>, MidiFileError> {
    if ppq == 0 || ppq > 0x7FFF {
        return Err(MidiFileError::InvalidPpq(ppq));
    }
    let header = Header::new(Format::Parallel, Timing::Metrical(u15::new(ppq as u16)));
    let smf = Smf {
        header,
        tracks: tracks.iter().map(write_track).collect(),
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}

// ---- Reading ----

fn read_track(raw: &[TrackEvent<'_>]) -> Track {
    let mut track = Track::new();
    let mut tick: i64 = 0;
    let mut channel_seen = false;
    let mut bank_seen = false;
    let mut program_seen = false;

    for raw_ev in raw {
        tick += raw_ev.delta.as_int() as i64;
        let Some(ev) = convert_event(tick, &raw_ev.kind) else {
            continue;
        };

        match &ev.kind {
            EventKind::Meta(MetaEvent::TrackName(name)) if track.name.is_empty() => {
                track.name = name.clone();
            }
            EventKind::Meta(MetaEvent::InstrumentName(name)) if track.instrument_name.is_empty() => {
                track.instrument_name = name.clone();
            }
            EventKind::ControlChange { controller: 0, value } if !bank_seen => {
                track.bank = *value;
                bank_seen = true;
            }
            EventKind::ProgramChange { program } if !program_seen => {
                track.program = *program;
                program_seen = true;
            }
            _ => {}
        }
        if ev.is_playable() && !channel_seen {
            track.channel = ev.channel;
            channel_seen = true;
        }
        track.add_ev(ev);
    }
    track.sort();
    track
}

fn convert_event(tick: i64, kind: &TrackEventKind<'_>) -> Option<Event> {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let chan = channel.as_int();
            let kind = match *message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => EventKind::NoteOff {
                    note: key.as_int(),
                    velocity: 0,
                },
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Aftertouch { key, vel } => EventKind::PolyAftertouch {
                    note: key.as_int(),
                    pressure: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::ControlChange {
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                    program: program.as_int(),
                },
                MidiMessage::ChannelAftertouch { vel } => EventKind::ChannelAftertouch {
                    pressure: vel.as_int(),
                },
                MidiMessage::PitchBend { bend } => EventKind::PitchBend {
                    value: bend.0.as_int(),
                },
            };
            Some(Event::new(tick, chan, kind))
        }
        TrackEventKind::SysEx(data) => Some(Event::new(tick, 0, EventKind::SysEx(data.to_vec()))),
        TrackEventKind::Escape(_) => None,
        TrackEventKind::Meta(meta) => convert_meta(meta).map(|meta| Event::meta(tick, meta)),
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn convert_meta(meta: &MetaMessage<'_>) -> Option<MetaEvent> {
    let meta = match *meta {
        MetaMessage::Tempo(tempo) => MetaEvent::Tempo(tempo.as_int()),
        MetaMessage::TimeSignature(numerator, pow, clocks_per_click, notated_32nd) => {
            MetaEvent::TimeSignature {
                numerator,
                denominator: 1u8.checked_shl(pow as u32).unwrap_or(4),
                clocks_per_click,
                notated_32nd,
            }
        }
        MetaMessage::KeySignature(sharps, minor) => MetaEvent::KeySignature { sharps, minor },
        MetaMessage::Text(data) => MetaEvent::Text(text(data)),
        MetaMessage::Copyright(data) => MetaEvent::Copyright(text(data)),
        MetaMessage::TrackName(data) => MetaEvent::TrackName(text(data)),
        MetaMessage::InstrumentName(data) => MetaEvent::InstrumentName(text(data)),
        MetaMessage::Lyric(data) => MetaEvent::Lyric(text(data)),
        MetaMessage::Marker(data) => MetaEvent::Marker(text(data)),
        MetaMessage::CuePoint(data) => MetaEvent::CuePoint(text(data)),
        MetaMessage::EndOfTrack => MetaEvent::EndOfTrack,
        MetaMessage::ProgramName(data) => MetaEvent::Other(0x08, data.to_vec()),
        MetaMessage::DeviceName(data) => MetaEvent::Other(0x09, data.to_vec()),
        MetaMessage::SequencerSpecific(data) => MetaEvent::Other(0x7F, data.to_vec()),
        MetaMessage::Unknown(kind, data) => MetaEvent::Other(kind, data.to_vec()),
        // Port/channel prefixes, SMPTE offset and sequence numbers are dropped
        _ => return None,
    };
    Some(meta)
}

/// Format 0: meta and sysex stay on a conductor track, channel events go
/// to one track per channel in channel order
fn split_by_channel(tracks: Vec<Track>) -> Vec<Track> {
    let mut conductor = Track::new();
    let mut channels: BTreeMap<u8, Track> = BTreeMap::new();

    for source in tracks {
        if conductor.name.is_empty() {
            conductor.name = source.name.clone();
        }
        for ev in source.events() {
            if ev.is_playable() {
                let track = channels.entry(ev.channel).or_insert_with(|| {
                    let mut track = Track::with_channel(ev.channel);
                    track.name = format!("Channel {:02}", ev.channel + 1);
                    track
                });
                match ev.kind {
                    EventKind::ControlChange { controller: 0, value } => track.bank = value,
                    EventKind::ProgramChange { program } => track.program = program,
                    _ => {}
                }
                track.add_ev(ev.clone());
            } else {
                conductor.add_ev(ev.clone());
            }
        }
    }

    let mut split = vec![conductor];
    split.extend(channels.into_values());
    for track in split.iter_mut() {
        track.sort();
    }
    split
}

// ---- Writing ----

fn write_track(track: &Track) -> Vec<TrackEvent<'_>> {
    let mut raw = Vec::with_capacity(track.len() + 2);
    let mut last_tick: i64 = 0;

    let has_name = track
        .events()
        .iter()
        .any(|ev| matches!(ev.kind, EventKind::Meta(MetaEvent::TrackName(_))));
    if !has_name && !track.name.is_empty() {
        raw.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
        });
    }

    for ev in track.events() {
        let Some(kind) = encode_event(ev) else {
            continue;
        };
        let tick = ev.tick.max(last_tick);
        let delta = (tick - last_tick).min(MAX_DELTA as i64) as u32;
        last_tick = tick;
        raw.push(TrackEvent {
            delta: u28::new(delta),
            kind,
        });
    }

    let terminated = raw
        .last()
        .is_some_and(|ev| matches!(ev.kind, TrackEventKind::Meta(MetaMessage::EndOfTrack)));
    if !terminated {
        raw.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
    }
    raw
}

fn encode_event(ev: &Event) -> Option<TrackEventKind<'_>> {
    let channel = u4::new(ev.channel & 0x0F);
    let midi = |message| Some(TrackEventKind::Midi { channel, message });
    match &ev.kind {
        EventKind::NoteOn { note, velocity } => midi(MidiMessage::NoteOn {
            key: u7::new(note & 0x7F),
            vel: u7::new(velocity & 0x7F),
        }),
        EventKind::NoteOff { note, velocity } => midi(MidiMessage::NoteOff {
            key: u7::new(note & 0x7F),
            vel: u7::new(velocity & 0x7F),
        }),
        EventKind::ControlChange { controller, value } => midi(MidiMessage::Controller {
            controller: u7::new(controller & 0x7F),
            value: u7::new(value & 0x7F),
        }),
        EventKind::ProgramChange { program } => midi(MidiMessage::ProgramChange {
            program: u7::new(program & 0x7F),
        }),
        EventKind::PitchBend { value } => midi(MidiMessage::PitchBend {
            bend: midly::PitchBend(u14::new(value & 0x3FFF)),
        }),
        EventKind::ChannelAftertouch { pressure } => midi(MidiMessage::ChannelAftertouch {
            vel: u7::new(pressure & 0x7F),
        }),
        EventKind::PolyAftertouch { note, pressure } => midi(MidiMessage::Aftertouch {
            key: u7::new(note & 0x7F),
            vel: u7::new(pressure & 0x7F),
        }),
        EventKind::SysEx(data) => Some(TrackEventKind::SysEx(data)),
        EventKind::Meta(meta) => encode_meta(meta).map(TrackEventKind::Meta),
    }
}

fn encode_meta(meta: &MetaEvent) -> Option<MetaMessage<'_>> {
    let meta = match meta {
        MetaEvent::Tempo(tempo) => MetaMessage::Tempo(u24::new((*tempo).min(0xFF_FFFF))),
        MetaEvent::TimeSignature {
            numerator,
            denominator,
            clocks_per_click,
            notated_32nd,
        } => MetaMessage::TimeSignature(
            *numerator,
            (*denominator).max(1).trailing_zeros() as u8,
            *clocks_per_click,
            *notated_32nd,
        ),
        MetaEvent::KeySignature { sharps, minor } => MetaMessage::KeySignature(*sharps, *minor),
        MetaEvent::Text(s) => MetaMessage::Text(s.as_bytes()),
        MetaEvent::Copyright(s) => MetaMessage::Copyright(s.as_bytes()),
        MetaEvent::TrackName(s) => MetaMessage::TrackName(s.as_bytes()),
        MetaEvent::InstrumentName(s) => MetaMessage::InstrumentName(s.as_bytes()),
        MetaEvent::Lyric(s) => MetaMessage::Lyric(s.as_bytes()),
        MetaEvent::Marker(s) => MetaMessage::Marker(s.as_bytes()),
        MetaEvent::CuePoint(s) => MetaMessage::CuePoint(s.as_bytes()),
        MetaEvent::EndOfTrack => MetaMessage::EndOfTrack,
        MetaEvent::Other(0x08, data) => MetaMessage::ProgramName(data),
        MetaEvent::Other(0x09, data) => MetaMessage::DeviceName(data),
        MetaEvent::Other(0x7F, data) => MetaMessage::SequencerSpecific(data),
        MetaEvent::Other(kind, data) => MetaMessage::Unknown(*kind, data),
    };
    Some(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format0_bytes() -> Vec<u8> {
        let events = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(600_000))),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TimeSignature(3, 2, 24, 8)),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(2),
                    message: MidiMessage::ProgramChange { program: u7::new(40) },
                },
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(2),
                    message: MidiMessage::NoteOn {
                        key: u7::new(60),
                        vel: u7::new(100),
                    },
                },
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::NoteOn {
                        key: u7::new(48),
                        vel: u7::new(90),
                    },
                },
            },
            TrackEvent {
                delta: u28::new(96),
                kind: TrackEventKind::Midi {
                    channel: u4::new(2),
                    message: MidiMessage::NoteOn {
                        key: u7::new(60),
                        vel: u7::new(0),
                    },
                },
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::NoteOff {
                        key: u7::new(48),
                        vel: u7::new(0),
                    },
                },
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96))),
            tracks: vec![events],
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_format0_split_by_channel() {
        let data = parse_bytes(&format0_bytes()).unwrap();
        assert_eq!(data.format, 0);
        assert_eq!(data.ppq, 96);
        assert_eq!(data.tracks.len(), 3);
        assert!(data.tracks[0].has_no_playable());
        assert_eq!(data.tracks[1].channel, 0);
        assert_eq!(data.tracks[2].channel, 2);
        assert_eq!(data.tracks[2].program, 40);
    }

    #[test]
    fn test_tick0_meta_sets_time_base() {
        let data = parse_bytes(&format0_bytes()).unwrap();
        assert_eq!(data.tempo, Some(600_000));
        assert_eq!(data.time_signature, Some((3, 4)));
        let base = data.time_base();
        assert_eq!(base.bpm(), 100.0);
        assert_eq!(base.bar_ticks(), 288);
    }

    #[test]
    fn test_zero_velocity_note_on_reads_as_note_off() {
        let data = parse_bytes(&format0_bytes()).unwrap();
        let track = &data.tracks[2];
        let off = track.events().iter().find(|e| e.tick == 96).unwrap();
        assert!(off.is_note_off());
        assert_eq!(off.note(), Some(60));
    }

    #[test]
    fn test_write_then_parse_keeps_notes_and_names() {
        let mut track = Track::with_channel(1);
        track.name = "Bass".to_string();
        track.add_evs([
            Event::note_on(0, 1, 40, 110),
            Event::note_off(240, 1, 40),
            Event::end_of_track(480),
        ]);
        let conductor = Track::from_events(vec![Event::tempo(0, 500_000), Event::end_of_track(480)]);
        let bytes = write_bytes(120, &[conductor, track]).unwrap();

        let data = parse_bytes(&bytes).unwrap();
        assert_eq!(data.format, 1);
        assert_eq!(data.tracks.len(), 2);
        assert_eq!(data.tracks[1].name, "Bass");
        assert_eq!(data.tracks[1].note_count(), 1);
        assert_eq!(data.tracks[1].length(), 480);
        assert_eq!(data.tracks[1].channel, 1);
    }

    #[test]
    fn test_invalid_ppq_rejected() {
        assert!(matches!(write_bytes(0, &[]), Err(MidiFileError::InvalidPpq(0))));
        assert!(matches!(
            write_bytes(40_000, &[]),
            Err(MidiFileError::InvalidPpq(40_000))
        ));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_bytes(b"not a midi file"),
            Err(MidiFileError::Parse(_))
        ));
    }

    #[test]
    fn test_into_sequence_equalizes_tracks() {
        let seq = parse_bytes(&format0_bytes()).unwrap().into_sequence();
        assert!(!seq.is_looping());
        assert_eq!(seq.length(), 96);
        for track in seq.tracks() {
            assert_eq!(track.length(), 96);
        }
    }
}
