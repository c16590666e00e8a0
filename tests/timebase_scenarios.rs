//! Time conversions, click pattern and timeline as seen from outside the crate

use midiseq::midi::event::Event;
use midiseq::sequencer::quantize;
use midiseq::sequencer::{Metronome, Sequence, TimeBase, Timeline, Track};
use rand::Rng;

#[test]
fn test_seconds_round_trip_across_tempos() {
    for bpm in [40.0, 90.0, 120.0, 133.0, 240.0] {
        let mut base = TimeBase::new(480);
        assert!(base.set_bpm(bpm));
        for tick in [0, 1, 479, 480, 1920, 123_457] {
            let sec = base.tick_to_sec(tick);
            assert_eq!(base.sec_to_tick(sec), tick, "{} BPM, tick {}", bpm, tick);
        }
    }
}

#[test]
fn test_bars_follow_time_signature() {
    let mut base = TimeBase::new(96);
    assert!(base.set_time_signature(3, 4));
    assert_eq!(base.bar_ticks(), 288);
    assert_eq!(base.bar_to_tick(2), 576);
    assert_eq!(base.get_bar(576 + 96 + 5), (3, 2));
    assert_eq!(base.tick_to_bar(576 + 96 + 5).to_string(), "003:02:005");

    assert!(base.set_time_signature(6, 8));
    assert_eq!(base.bar_ticks(), 576);
    assert!(!base.set_time_signature(7, 6));
    assert_eq!(base.bar_ticks(), 576);
}

#[test]
fn test_format_time_at_tempo() {
    let mut base = TimeBase::new(120);
    base.set_bpm(60.0);
    assert_eq!(base.format_time(0), "00:00.000");
    assert_eq!(base.format_time(120 * 75), "01:15.000");
    assert_eq!(base.format_time(60), "00:00.500");
}

#[test]
fn test_click_repeats_every_bar() {
    let mut base = TimeBase::new(120);
    base.set_time_signature(3, 4);
    let mut metronome = Metronome::new(&base);

    let clicks: Vec<i64> = metronome
        .due_events(3 * 360)
        .into_iter()
        .filter(|ev| ev.is_note_on())
        .map(|ev| ev.tick)
        .collect();
    assert_eq!(clicks, vec![0, 120, 240, 360, 480, 600, 720, 840, 960, 1080]);

    metronome.seek(600);
    assert_eq!(metronome.peek_tick(), Some(600));
    metronome.seek(610);
    let next_on = metronome
        .due_events(720)
        .into_iter()
        .find(|ev| ev.is_note_on())
        .map(|ev| ev.tick);
    assert_eq!(next_on, Some(720));
}

#[test]
fn test_timeline_merges_tracks() {
    let tracks = vec![
        Track::from_events(vec![Event::note_on(0, 0, 60, 90), Event::note_off(100, 0, 60)]),
        Track::from_events(vec![Event::note_on(50, 1, 40, 90), Event::note_off(100, 1, 40)]),
    ];
    let mut timeline = Timeline::from_tracks(&tracks);
    let mut ticks = Vec::new();
    loop {
        let tick = timeline.next_ev_time();
        if tick < 0 {
            break;
        }
        ticks.push(tick);
    }
    assert_eq!(ticks, vec![0, 50, 100]);

    timeline.seek(60);
    assert_eq!(timeline.peek_time(), 100);
    assert!(timeline.search_ev_group_time(50).is_some());
    assert!(timeline.search_ev_group_time(51).is_none());
}

#[test]
fn test_quantized_ticks_sit_on_grid() {
    let mut rng = rand::thread_rng();
    let step = quantize::quantize_step(480, 16).unwrap();
    for _ in 0..500 {
        let tick: i64 = rng.gen_range(0..100_000);
        let snapped = quantize::quantize_tick(tick, step);
        assert_eq!(snapped % step, 0);
        assert!((snapped - tick).abs() <= step / 2);
    }
}

#[test]
fn test_position_clamped_to_length() {
    let mut seq = Sequence::with_tracks(120, 120.0, 2);
    assert_eq!(seq.length(), 960);
    assert_eq!(seq.set_position(5000), 960);
    assert_eq!(seq.set_position(-20), 0);
    assert_eq!(seq.set_left_locator(2000), 960);
}
