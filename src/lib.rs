// midiseq - Library exports for the CLI, tests and benchmarks

pub mod config;
pub mod history;
pub mod messaging;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use config::{ConfigError, SequencerConfig};
pub use history::{History, HistoryError};
pub use messaging::channels::{create_engine_channel, create_input_channel, create_notification_channel};
pub use midi::event::{Event, EventKind, MetaEvent};
pub use midi::sink::{CaptureSink, NullSink, SoundSink};
pub use sequencer::{
    Clock, ManualClock, Player, PlayerError, PlayerOptions, Sequence, SystemClock, TimeBase,
    TimeSignature, Track, TransportState,
};
