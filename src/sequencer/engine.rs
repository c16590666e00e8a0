// Engine - One scheduler iteration: fetch due events and send them to the sink
// Runs on the scheduler thread; everything it shares is behind the sequence
// lock, the playback atomics or a ring buffer

use super::clock::Clock;
use super::sequence::{SharedSequence, Sequence, lock_sequence};
use super::transport::PlaybackState;
use crate::messaging::channels::{EngineConsumer, InputConsumer, NotificationProducer};
use crate::messaging::command::EngineCommand;
use crate::messaging::notification::Notification;
use crate::midi::event::{DRUM_CHANNEL, Event};
use crate::midi::sink::SoundSink;
use ringbuf::traits::{Consumer, Producer};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Float slack when comparing elapsed time against a tick's due time
const DUE_EPSILON: f64 = 1e-9;

/// Result of one [`Engine::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Nothing active; the engine is parked
    Idle,
    /// Playing and/or clicking, position in ticks
    Running { position: i64 },
    /// Played past the last event and stopped
    Ended { position: i64 },
}

/// Scheduler state machine
///
/// The clock is anchored at `origin` (seconds) where the position was
/// `last_time` (seconds from tick 0 at the anchored tempo). Elapsed song time
/// is `now - origin + last_time`; the next due timeline tick is `curtick`,
/// -1 once the timeline is exhausted.
pub struct Engine<C: Clock> {
    sequence: SharedSequence,
    state: Arc<PlaybackState>,
    sink: Arc<dyn SoundSink>,
    clock: C,
    commands: EngineConsumer,
    input: Option<InputConsumer>,
    notifications: Option<NotificationProducer>,

    origin: f64,
    last_time: f64,
    sec_per_tick: f64,
    curtick: i64,
    primed: bool,
    click_primed: bool,
    out_queue: VecDeque<(usize, Event)>,
}

impl<C: Clock> Engine<C> {
    pub fn new(
        sequence: SharedSequence,
        state: Arc<PlaybackState>,
        sink: Arc<dyn SoundSink>,
        clock: C,
        commands: EngineConsumer,
    ) -> Self {
        Self {
            sequence,
            state,
            sink,
            clock,
            commands,
            input: None,
            notifications: None,
            origin: 0.0,
            last_time: 0.0,
            sec_per_tick: 0.0,
            curtick: -1,
            primed: false,
            click_primed: false,
            out_queue: VecDeque::new(),
        }
    }

    /// Attach the ring fed by a MIDI input port
    pub fn with_input(mut self, input: InputConsumer) -> Self {
        self.input = Some(input);
        self
    }

    /// Attach the ring used to report end of sequence and similar events
    pub fn with_notifications(mut self, notifications: NotificationProducer) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn state(&self) -> &Arc<PlaybackState> {
        &self.state
    }

    /// Next due timeline tick, -1 when exhausted
    pub fn curtick(&self) -> i64 {
        self.curtick
    }

    pub fn sec_per_tick(&self) -> f64 {
        self.sec_per_tick
    }

    /// Loop until `running` is cleared. `active_poll` is the sleep while
    /// playing or clicking, `idle_poll` while parked.
    pub fn run(&mut self, active_poll: Duration, idle_poll: Duration) {
        log::debug!("Scheduler loop started");
        while self.state.is_running() {
            let pause = match self.step() {
                EngineStatus::Idle => idle_poll,
                _ => active_poll,
            };
            thread::sleep(pause);
        }
        self.sink.panic(None);
        self.state.set_parked(true);
        log::debug!("Scheduler loop finished");
    }

    /// One scheduler iteration
    pub fn step(&mut self) -> EngineStatus {
        let incoming = self.drain_input();

        if !self.state.is_active() {
            self.primed = false;
            self.click_primed = false;
            self.out_queue.clear();
            self.state.set_parked(true);
            return EngineStatus::Idle;
        }
        self.state.set_parked(false);

        let sequence = Arc::clone(&self.sequence);
        let mut seq = lock_sequence(&sequence);
        let now = self.clock.now();

        let start_requested = self.state.take_start_request();
        if !self.primed || start_requested {
            self.prime(&mut seq, now);
        }
        self.apply_commands(now);

        let playing = self.state.is_playing();
        let mut reltime = self.reltime(now);
        let mut position = self.sec_to_tick(reltime);

        if playing {
            if let Some(start) = seq.loop_manager(position) {
                // Finish the pass: everything before the loop end still sounds
                let last_tick = seq.end_loop() - 1;
                self.play_due(&mut seq, last_tick as f64 * self.sec_per_tick);
                if self.state.is_clicking() && self.click_primed {
                    for ev in seq.metronome_mut().due_events(last_tick) {
                        self.sink.send_event(&ev);
                    }
                }
                log::debug!("Loop back from {} to {}", position, start);
                self.relocate(&mut seq, start, now);
                reltime = self.reltime(now);
                position = start;
            }

            if self.state.is_recording() {
                for ev in incoming {
                    seq.recorder_mut().input(ev, position);
                }
            }

            self.play_due(&mut seq, reltime);
        }

        if self.state.is_clicking() {
            if !self.click_primed {
                seq.metronome_mut().seek(position);
                self.click_primed = true;
            }
            let click_tick = self.floor_tick(reltime);
            for ev in seq.metronome_mut().due_events(click_tick) {
                self.sink.send_event(&ev);
            }
        } else {
            self.click_primed = false;
        }

        if !playing {
            return EngineStatus::Running { position };
        }

        self.state.set_current_tick(position);
        seq.set_current_tick(position);

        if self.is_end_of_data(&seq) {
            self.state.set_playing(false);
            self.notify(Notification::end_of_sequence(position));
            log::info!("End of sequence at tick {}", position);
            return EngineStatus::Ended { position };
        }

        EngineStatus::Running { position }
    }

    /// Anchor the clock at the sequence position and reset every cursor
    fn prime(&mut self, seq: &mut Sequence, now: f64) {
        let tick = seq.set_position(seq.current_tick());
        self.sec_per_tick = seq.base().sec_per_tick();
        self.origin = now;
        self.last_time = tick as f64 * self.sec_per_tick;
        self.curtick = seq.timeline_mut().next_ev_time();
        self.out_queue.clear();
        seq.metronome_mut().seek(tick);
        self.click_primed = true;
        self.primed = true;
        log::trace!("Engine primed at tick {}", tick);
    }

    /// Jump to `tick` without stopping: sink silenced, clock re-anchored
    fn relocate(&mut self, seq: &mut Sequence, tick: i64, now: f64) {
        self.out_queue.clear();
        self.sink.panic(None);
        let tick = seq.set_position(tick);
        self.origin = now;
        self.last_time = tick as f64 * self.sec_per_tick;
        self.curtick = seq.timeline_mut().next_ev_time();
        seq.metronome_mut().seek(tick);
    }

    fn apply_commands(&mut self, now: f64) {
        while let Some(command) = self.commands.try_pop() {
            match command {
                EngineCommand::SetTempo { sec_per_tick } => {
                    if sec_per_tick <= 0.0 || !sec_per_tick.is_finite() {
                        log::warn!("Ignoring invalid tempo: {} s/tick", sec_per_tick);
                        let tick = self.state.current_tick();
                        self.notify(Notification::tempo_rejected(tick, sec_per_tick));
                        continue;
                    }
                    // Keep the current tick, continue at the new speed
                    let tick = if self.sec_per_tick > 0.0 {
                        self.reltime(now) / self.sec_per_tick
                    } else {
                        0.0
                    };
                    self.last_time = tick * sec_per_tick;
                    self.origin = now;
                    self.sec_per_tick = sec_per_tick;
                    log::debug!("Tempo re-anchored at tick {:.1}", tick);
                }
                EngineCommand::Panic => self.sink.panic(None),
            }
        }
    }

    /// Send every timeline group due at `reltime`, catching up on late ones
    fn play_due(&mut self, seq: &mut Sequence, reltime: f64) {
        while self.curtick >= 0
            && reltime + DUE_EPSILON >= self.curtick as f64 * self.sec_per_tick
        {
            let due = seq.get_playable_data(self.curtick);
            self.out_queue.extend(due);
            self.send_queue(seq);
            self.curtick = seq.timeline_mut().next_ev_time();
        }
    }

    /// Drain the output queue, dropping muted tracks and applying each
    /// track's channel (drum and conductor events keep theirs)
    fn send_queue(&mut self, seq: &Sequence) {
        while let Some((tracknum, mut ev)) = self.out_queue.pop_front() {
            let Some(track) = seq.track(tracknum) else {
                continue;
            };
            if !track.is_audible() {
                continue;
            }
            if tracknum != 0 && ev.channel != DRUM_CHANNEL {
                ev.channel = track.channel;
            }
            self.sink.send_event(&ev);
        }
    }

    fn is_end_of_data(&self, seq: &Sequence) -> bool {
        let loop_pending = seq.is_looping() && seq.end_loop() > seq.start_loop();
        self.curtick < 0 && !loop_pending && !self.state.is_recording()
    }

    /// Echo input to the sink and hand back the parsed events
    fn drain_input(&mut self) -> Vec<Event> {
        let Some(input) = self.input.as_mut() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        while let Some(raw) = input.try_pop() {
            if let Some(ev) = Event::from_bytes(raw.as_bytes(), 0) {
                self.sink.send_event(&ev);
                events.push(ev);
            }
        }
        events
    }

    fn notify(&mut self, notification: Notification) {
        if let Some(tx) = self.notifications.as_mut() {
            if tx.try_push(notification).is_err() {
                log::warn!("Notification queue full, message dropped");
            }
        }
    }

    fn reltime(&self, now: f64) -> f64 {
        now - self.origin + self.last_time
    }

    fn sec_to_tick(&self, sec: f64) -> i64 {
        if self.sec_per_tick <= 0.0 {
            return 0;
        }
        (sec / self.sec_per_tick).round() as i64
    }

    fn floor_tick(&self, sec: f64) -> i64 {
        if self.sec_per_tick <= 0.0 {
            return 0;
        }
        ((sec + DUE_EPSILON) / self.sec_per_tick).floor() as i64
    }
}
