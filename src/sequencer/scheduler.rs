// Scheduler - Dedicated thread driving the engine loop

use super::clock::Clock;
use super::engine::Engine;
use super::transport::PlaybackState;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sleep intervals of the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    /// Between iterations while playing or clicking
    pub active_poll: Duration,
    /// Between iterations while parked
    pub idle_poll: Duration,
    /// Upper bound on the wait for the thread to exit
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            active_poll: Duration::from_millis(10),
            idle_poll: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

/// Owns the scheduler thread; stopping (or dropping) it ends the loop
pub struct Scheduler {
    handle: Option<JoinHandle<()>>,
    state: Arc<PlaybackState>,
    timing: SchedulerTiming,
}

impl Scheduler {
    /// Spawn the thread running `engine`
    pub fn spawn<C>(mut engine: Engine<C>, timing: SchedulerTiming) -> io::Result<Self>
    where
        C: Clock + 'static,
    {
        let state = Arc::clone(engine.state());
        state.set_running(true);

        let handle = thread::Builder::new()
            .name("midiseq-scheduler".to_string())
            .spawn(move || engine.run(timing.active_poll, timing.idle_poll));

        match handle {
            Ok(handle) => {
                log::info!("Scheduler thread spawned");
                Ok(Self {
                    handle: Some(handle),
                    state,
                    timing,
                })
            }
            Err(e) => {
                state.set_running(false);
                Err(e)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Ask the loop to exit and join it
    ///
    /// If the thread does not finish within the shutdown timeout it is
    /// detached rather than blocking the caller.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.state.set_running(false);

        let step = self.timing.active_poll.max(Duration::from_millis(1));
        let mut waited = Duration::ZERO;
        while !handle.is_finished() && waited < self.timing.shutdown_timeout {
            thread::sleep(step);
            waited += step;
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("Scheduler thread panicked");
            } else {
                log::info!("Scheduler thread stopped");
            }
        } else {
            log::warn!("Scheduler thread did not stop in time, detaching");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_engine_channel;
    use crate::midi::sink::CaptureSink;
    use crate::sequencer::clock::SystemClock;
    use crate::sequencer::sequence::Sequence;
    use std::sync::Mutex;

    fn fast_timing() -> SchedulerTiming {
        SchedulerTiming {
            active_poll: Duration::from_millis(1),
            idle_poll: Duration::from_millis(1),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_spawn_and_stop() {
        let seq = Arc::new(Mutex::new(Sequence::with_tracks(120, 120.0, 1)));
        let state = PlaybackState::new();
        let sink = Arc::new(CaptureSink::new());
        let (_tx, rx) = create_engine_channel(8);
        let engine = Engine::new(seq, Arc::clone(&state), sink.clone(), SystemClock::new(), rx);

        let mut scheduler = Scheduler::spawn(engine, fast_timing()).unwrap();
        assert!(state.is_running());
        assert!(scheduler.is_running());

        scheduler.stop();
        assert!(!state.is_running());
        assert!(!scheduler.is_running());
        // Loop exit silences the sink
        assert_eq!(sink.panic_count(), 1);
    }

    #[test]
    fn test_idle_engine_parks() {
        let seq = Arc::new(Mutex::new(Sequence::with_tracks(120, 120.0, 1)));
        let state = PlaybackState::new();
        state.set_parked(false);
        let (_tx, rx) = create_engine_channel(8);
        let engine = Engine::new(
            seq,
            Arc::clone(&state),
            Arc::new(CaptureSink::new()),
            SystemClock::new(),
            rx,
        );
        let _scheduler = Scheduler::spawn(engine, fast_timing()).unwrap();

        let mut parked = false;
        for _ in 0..500 {
            if state.is_parked() {
                parked = true;
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(parked);
    }
}
