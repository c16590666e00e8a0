//! Playback scenarios driven through the Player
//!
//! The engine is stepped by hand against a manual clock so timing is exact;
//! one test runs the real scheduler thread against the system clock.

use midiseq::messaging::channels::create_input_channel;
use midiseq::messaging::command::RawMidi;
use midiseq::midi::event::Event;
use midiseq::midi::sink::{CaptureSink, SinkMessage};
use midiseq::sequencer::{
    EngineStatus, ManualClock, Player, PlayerOptions, SchedulerTiming, Sequence, SystemClock,
    Track, TransportState,
};
use ringbuf::traits::Producer;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ppq 120 at 120 BPM: 240 ticks per second
fn song() -> Sequence {
    let mut lead = Track::with_channel(0);
    lead.add_evs([
        Event::note_on(0, 0, 60, 100),
        Event::note_off(120, 0, 60),
        Event::note_on(960, 0, 62, 100),
        Event::note_off(1080, 0, 62),
    ]);
    let mut bass = Track::with_channel(1);
    bass.add_evs([Event::note_on(0, 1, 36, 90), Event::note_off(240, 1, 36)]);

    let mut seq = Sequence::new(120);
    seq.load_tracks(vec![
        Track::from_events(vec![Event::tempo(0, 500_000)]),
        lead,
        bass,
    ]);
    seq
}

fn options() -> PlayerOptions {
    PlayerOptions {
        relocate_delay: Duration::ZERO,
        click_recording: false,
        click_playing: false,
        quantize_on_record: false,
        ..PlayerOptions::default()
    }
}

fn setup() -> (Player, midiseq::sequencer::Engine<ManualClock>, ManualClock, Arc<CaptureSink>) {
    let sink = Arc::new(CaptureSink::new());
    let clock = ManualClock::new();
    let mut player = Player::new(song(), sink.clone(), options());
    let engine = player.take_engine(clock.clone()).unwrap();
    (player, engine, clock, sink)
}

#[test]
fn test_events_follow_the_clock() {
    let (mut player, mut engine, clock, sink) = setup();
    player.play();

    engine.step();
    assert_eq!(sink.notes_on(), vec![(0, 60, 100), (1, 36, 90)]);

    clock.advance_secs(0.5);
    engine.step();
    assert!(sink.messages().contains(&SinkMessage::NoteOff { channel: 0, note: 60 }));
    assert!(!sink.messages().contains(&SinkMessage::NoteOff { channel: 1, note: 36 }));
    assert_eq!(player.position(), 120);

    clock.advance_secs(3.5);
    engine.step();
    assert_eq!(sink.notes_on().len(), 3);
    assert_eq!(player.position(), 960);
}

#[test]
fn test_tempo_change_keeps_position() {
    let (mut player, mut engine, clock, _sink) = setup();
    player.play();
    engine.step();

    clock.advance_secs(0.5);
    engine.step();
    assert_eq!(player.position(), 120);

    player.set_bpm(60.0).unwrap();
    engine.step();
    assert_eq!(player.position(), 120);

    // 60 BPM: 120 ticks per second
    clock.advance_secs(1.0);
    engine.step();
    assert_eq!(player.position(), 240);
}

#[test]
fn test_loop_wraps_to_start() {
    let (mut player, mut engine, clock, sink) = setup();
    player.set_loop_region(0, 480).unwrap();
    assert!(player.toggle_loop());
    player.play();
    engine.step();

    clock.advance_secs(1.0);
    engine.step();
    let panics = sink.panic_count();

    clock.advance_secs(1.0);
    engine.step();
    assert!(sink.panic_count() > panics);
    assert_eq!(player.position(), 0);
    let lead_notes = sink
        .notes_on()
        .into_iter()
        .filter(|&(channel, _, _)| channel == 0)
        .count();
    assert_eq!(lead_notes, 2);
    assert!(player.state().is_playing());
}

#[test]
fn test_end_of_sequence_stops() {
    let (mut player, mut engine, clock, _sink) = setup();
    player.play();
    engine.step();

    clock.advance_secs(10.0);
    assert!(matches!(engine.step(), EngineStatus::Ended { .. }));
    assert_eq!(player.state(), TransportState::Stopped);

    let messages: Vec<String> = player
        .poll_notifications()
        .into_iter()
        .map(|n| n.message)
        .collect();
    assert_eq!(messages, vec!["End of sequence".to_string()]);
}

#[test]
fn test_play_at_end_restarts() {
    let (mut player, mut engine, _clock, sink) = setup();
    player.goto_end();
    player.play();
    engine.step();
    assert_eq!(player.position(), 0);
    assert_eq!(sink.notes_on().len(), 2);
}

#[test]
fn test_solo_silences_other_tracks() {
    let (mut player, mut engine, _clock, sink) = setup();
    assert!(player.toggle_solo(2).unwrap());
    sink.clear();

    player.play();
    engine.step();
    assert_eq!(sink.notes_on(), vec![(1, 36, 90)]);
}

#[test]
fn test_goto_while_playing() {
    let (mut player, mut engine, clock, sink) = setup();
    player.play();
    engine.step();
    sink.clear();

    assert_eq!(player.goto(960), 960);
    assert!(player.state().is_playing());
    engine.step();
    assert_eq!(sink.notes_on(), vec![(0, 62, 100)]);

    clock.advance_secs(0.25);
    engine.step();
    assert_eq!(player.position(), 1020);
}

#[test]
fn test_record_take_lands_on_armed_track() {
    let sink = Arc::new(CaptureSink::new());
    let clock = ManualClock::new();
    let mut player = Player::new(song(), sink.clone(), options());
    let (mut input_tx, input_rx) = create_input_channel(16);
    let mut engine = player
        .take_engine(clock.clone())
        .unwrap()
        .with_input(input_rx);

    assert!(player.arm(2).unwrap());
    player.record();
    assert_eq!(player.state(), TransportState::Recording);
    engine.step();

    clock.advance_secs(0.5);
    input_tx
        .try_push(RawMidi::from_slice(&[0x90, 64, 110]).unwrap())
        .unwrap();
    engine.step();

    clock.advance_secs(0.5);
    input_tx
        .try_push(RawMidi::from_slice(&[0x80, 64, 0]).unwrap())
        .unwrap();
    engine.step();

    // Input is echoed as it arrives
    assert!(sink.notes_on().contains(&(0, 64, 110)));

    assert!(player.stop_record());
    assert_eq!(player.state(), TransportState::Playing);

    let notes = player.with_sequence(|seq| seq.get_notes(2));
    let recorded: Vec<(i64, u8, u8, Option<i64>)> = notes
        .iter()
        .filter(|n| n.note == 64)
        .map(|n| (n.tick, n.channel, n.velocity, n.duration))
        .collect();
    assert_eq!(recorded, vec![(120, 1, 110, Some(120))]);
    assert!(player.history().can_undo());

    player.pause();
    player.undo().unwrap();
    let notes = player.with_sequence(|seq| seq.get_notes(2));
    assert!(notes.iter().all(|n| n.note != 64));
}

#[test]
fn test_empty_take_changes_nothing() {
    let (mut player, mut engine, clock, _sink) = setup();
    player.record();
    engine.step();
    clock.advance_secs(0.5);
    engine.step();

    assert!(!player.stop_record());
    assert!(!player.history().can_undo());
}

#[test]
fn test_click_follows_the_bar() {
    let (mut player, mut engine, clock, sink) = setup();
    player.toggle_click();
    player.play();
    engine.step();

    // one beat later: second click of the bar
    clock.advance_secs(0.5);
    engine.step();
    let clicks: Vec<(u8, u8, u8)> = sink
        .notes_on()
        .into_iter()
        .filter(|&(channel, _, _)| channel == 9)
        .collect();
    assert_eq!(clicks.len(), 2);
    assert!(clicks[0].2 > clicks[1].2);
}

#[test]
fn test_scheduler_thread_plays() {
    let sink = Arc::new(CaptureSink::new());
    let mut opts = options();
    opts.timing = SchedulerTiming {
        active_poll: Duration::from_millis(1),
        idle_poll: Duration::from_millis(5),
        shutdown_timeout: Duration::from_secs(1),
    };
    let mut player = Player::new(song(), sink.clone(), opts);
    player.start(SystemClock::new(), None).unwrap();

    player.play();
    thread::sleep(Duration::from_millis(150));
    assert!(sink.notes_on().contains(&(0, 60, 100)));

    player.goto(960);
    thread::sleep(Duration::from_millis(50));
    assert!(sink.notes_on().contains(&(0, 62, 100)));

    player.shutdown();
    assert!(!player.state().is_playing());
}
