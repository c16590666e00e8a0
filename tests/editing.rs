//! Editing through the Player: quantize, erase, clipboard, tracks and undo

use midiseq::midi::event::{Event, EventKind};
use midiseq::midi::sink::{CaptureSink, SinkMessage};
use midiseq::sequencer::{Player, PlayerError, PlayerOptions, Sequence, Track};
use std::sync::Arc;
use std::time::Duration;

// 4/4 at ppq 120: one bar is 480 ticks, a sixteenth is 30
fn sloppy_song() -> Sequence {
    let mut drums = Track::with_channel(9);
    drums.add_evs([
        Event::note_on(2, 9, 36, 100),
        Event::note_off(20, 9, 36),
        Event::note_on(118, 9, 38, 100),
        Event::note_off(140, 9, 38),
    ]);
    let mut keys = Track::with_channel(0);
    keys.add_evs([
        Event::note_on(0, 0, 60, 100),
        Event::note_off(240, 0, 60),
        Event::note_on(480, 0, 64, 100),
        Event::note_off(720, 0, 64),
    ]);

    let mut seq = Sequence::new(120);
    seq.load_tracks(vec![
        Track::from_events(vec![Event::tempo(0, 500_000)]),
        drums,
        keys,
    ]);
    seq
}

fn player() -> (Player, Arc<CaptureSink>) {
    let sink = Arc::new(CaptureSink::new());
    let options = PlayerOptions {
        relocate_delay: Duration::ZERO,
        ..PlayerOptions::default()
    };
    (Player::new(sloppy_song(), sink.clone(), options), sink)
}

fn note_ticks(player: &Player, tracknum: usize) -> Vec<(i64, Option<i64>)> {
    player.with_sequence(|seq| {
        seq.get_notes(tracknum)
            .into_iter()
            .map(|n| (n.tick, n.duration))
            .collect()
    })
}

#[test]
fn test_quantize_keeps_durations() {
    let (mut player, _sink) = player();
    assert_eq!(player.set_quantize_resolution(16).unwrap(), 30);

    let moved = player.quantize_track(1).unwrap();
    assert_eq!(moved, 4);
    assert_eq!(note_ticks(&player, 1), vec![(0, Some(18)), (120, Some(22))]);
}

#[test]
fn test_quantize_resolution_rejected() {
    let (mut player, _sink) = player();
    assert!(matches!(
        player.set_quantize_resolution(0),
        Err(PlayerError::InvalidResolution(0))
    ));
    assert!(matches!(
        player.set_quantize_resolution(1000),
        Err(PlayerError::InvalidResolution(1000))
    ));
    assert_eq!(player.with_sequence(|seq| seq.quantize_resolution()), 16);
}

#[test]
fn test_erase_range_then_undo() {
    let (mut player, _sink) = player();
    assert_eq!(player.erase_track(2, Some((400, 800))).unwrap(), 2);
    assert_eq!(note_ticks(&player, 2), vec![(0, Some(240))]);

    assert_eq!(player.history().undo_description(), Some("erase"));
    player.undo().unwrap();
    assert_eq!(note_ticks(&player, 2).len(), 2);
    assert!(player.history().can_redo());
}

#[test]
fn test_erase_rejects_bad_input() {
    let (mut player, _sink) = player();
    assert!(matches!(
        player.erase_track(9, None),
        Err(PlayerError::InvalidTrack(9))
    ));
    assert!(matches!(
        player.erase_track(2, Some((100, 50))),
        Err(PlayerError::InvalidRange(100, 50))
    ));
    assert!(!player.history().can_undo());
}

#[test]
fn test_cut_and_paste_replace() {
    let (mut player, _sink) = player();
    assert_eq!(player.cut(2, 0, 240).unwrap(), 2);
    assert_eq!(player.clipboard().length(), 240);
    assert_eq!(note_ticks(&player, 2), vec![(480, Some(240))]);

    player.paste(2, 480, false).unwrap();
    assert_eq!(note_ticks(&player, 2), vec![(480, Some(240))]);
    assert_eq!(
        player.with_sequence(|seq| seq.get_notes(2)[0].note),
        60
    );

    player.undo().unwrap();
    player.undo().unwrap();
    assert_eq!(note_ticks(&player, 2), vec![(0, Some(240)), (480, Some(240))]);
}

#[test]
fn test_paste_past_the_end_extends_the_song() {
    let (mut player, _sink) = player();
    let before = player.with_sequence(Sequence::length);
    player.copy(2, 480, 720).unwrap();
    player.paste(2, 1440, true).unwrap();

    let after = player.with_sequence(Sequence::length);
    assert!(after > before);
    assert_eq!(after, 1680);
    let ends: Vec<i64> = player.with_sequence(|seq| {
        seq.tracks()
            .iter()
            .filter_map(|t| t.events().iter().find(|e| e.is_end_of_track()).map(|e| e.tick))
            .collect()
    });
    assert!(ends.iter().all(|&tick| tick == 1680));
}

#[test]
fn test_delete_track() {
    let (mut player, _sink) = player();
    player.delete_track(1).unwrap();
    assert_eq!(player.with_sequence(Sequence::track_count), 2);
    assert_eq!(player.with_sequence(|seq| seq.track(1).unwrap().channel), 0);

    player.undo().unwrap();
    assert_eq!(player.with_sequence(Sequence::track_count), 3);
}

#[test]
fn test_channel_change_rewrites_events() {
    let (mut player, _sink) = player();
    player.set_track_channel(2, 4).unwrap();
    let channels: Vec<u8> = player.with_sequence(|seq| {
        seq.track(2)
            .unwrap()
            .events()
            .iter()
            .filter(|e| e.is_playable())
            .map(|e| e.channel)
            .collect()
    });
    assert!(channels.iter().all(|&c| c == 4));
}

#[test]
fn test_program_change_inserted_and_sent() {
    let (mut player, sink) = player();
    player.set_track_program(2, 19).unwrap();

    let first = player.with_sequence(|seq| seq.track(2).unwrap().events()[0].clone());
    assert_eq!(first.tick, 0);
    assert_eq!(first.kind, EventKind::ProgramChange { program: 19 });
    assert!(sink.messages().contains(&SinkMessage::ProgramChange {
        channel: 0,
        program: 19
    }));

    player.set_track_program(2, 20).unwrap();
    let programs = player.with_sequence(|seq| {
        seq.track(2)
            .unwrap()
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::ProgramChange { .. }))
            .count()
    });
    assert_eq!(programs, 1);
}

#[test]
fn test_history_is_bounded() {
    let sink = Arc::new(CaptureSink::new());
    let options = PlayerOptions {
        relocate_delay: Duration::ZERO,
        history_size: 3,
        ..PlayerOptions::default()
    };
    let mut player = Player::new(sloppy_song(), sink, options);
    for _ in 0..5 {
        player.set_track_channel(2, 3).unwrap();
    }
    assert_eq!(player.history().undo_count(), 3);
    for _ in 0..3 {
        player.undo().unwrap();
    }
    assert!(player.undo().is_err());
}

#[test]
fn test_new_sequence_clears_history() {
    let (mut player, _sink) = player();
    player.erase_track(1, None).unwrap();
    player.new_sequence(4);

    assert!(!player.history().can_undo());
    let summary = player.summary();
    assert_eq!(summary.tracks.len(), 5);
    assert_eq!(summary.length_ticks, 960);
}

#[test]
fn test_open_keeps_quantize_resolution() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("sloppy.mid");
    let (mut player, _sink) = player();
    player.save_file(&path).unwrap();

    assert_eq!(player.set_quantize_resolution(8).unwrap(), 60);
    player.load_file(&path).unwrap();
    assert_eq!(player.with_sequence(|seq| seq.quantize_resolution()), 8);
    assert_eq!(player.with_sequence(|seq| seq.quantize_step()), 60);
}
