// Quantizer - Snap events to a grid derived from the bar length
// Note on/off pairs move together so durations are preserved

use super::track::Track;
use crate::midi::event::Event;

/// Grid step in ticks for a bar length and a resolution
/// (16 = sixteenth notes in 4/4). None when the step would be zero.
pub fn quantize_step(bar_ticks: i64, resolution: i64) -> Option<i64> {
    if resolution <= 0 {
        return None;
    }
    let step = bar_ticks / resolution;
    (step > 0).then_some(step)
}

/// Snap a tick to the grid: down when `rest <= step / 2`, up otherwise
pub fn quantize_tick(tick: i64, step: i64) -> i64 {
    if step <= 0 {
        return tick;
    }
    let rest = tick.rem_euclid(step);
    if rest == 0 {
        tick
    } else if rest <= step / 2 {
        tick - rest
    } else {
        tick - rest + step
    }
}

/// Index of the note off closing the note on at `on_index`:
/// first later note off with the same note and channel not already paired
fn find_noteoff(events: &[Event], on_index: usize, paired: &[bool]) -> Option<usize> {
    let on = &events[on_index];
    let note = on.note()?;
    events
        .iter()
        .enumerate()
        .skip(on_index + 1)
        .find(|(idx, ev)| {
            !paired[*idx] && ev.is_note_off() && ev.channel == on.channel && ev.note() == Some(note)
        })
        .map(|(idx, _)| idx)
}

/// Quantize a list of events in place; they are re-sorted afterwards
/// Returns the number of events that moved
pub fn quantize_events(events: &mut [Event], step: i64) -> usize {
    if step <= 0 {
        return 0;
    }
    let mut paired = vec![false; events.len()];
    let mut moved = 0;

    for idx in 0..events.len() {
        if paired[idx] {
            continue;
        }
        let tick = events[idx].tick;
        let delta = quantize_tick(tick, step) - tick;

        if events[idx].is_note_on() {
            if let Some(off_idx) = find_noteoff(events, idx, &paired) {
                paired[off_idx] = true;
                if delta != 0 {
                    events[off_idx].tick += delta;
                    moved += 1;
                }
            }
        }
        if delta != 0 {
            events[idx].tick += delta;
            moved += 1;
        }
        paired[idx] = true;
    }

    events.sort_by_key(|ev| ev.tick);
    moved
}

/// Quantize a whole track at the given step
/// End of track markers stay where they are.
pub fn quantize_track(track: &mut Track, step: i64) -> usize {
    if step <= 0 {
        return 0;
    }
    let mut events = track.take_events();
    let (mut body, eot): (Vec<Event>, Vec<Event>) =
        events.drain(..).partition(|ev| !ev.is_end_of_track());
    let moved = quantize_events(&mut body, step);
    let length = body.last().map(|ev| ev.tick).unwrap_or(0);
    body.extend(eot.into_iter().map(|ev| {
        let tick = ev.tick.max(length);
        ev.at(tick)
    }));
    track.set_events(body);
    track.sort();
    moved
}
