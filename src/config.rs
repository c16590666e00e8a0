// Configuration - Sequencer settings persisted as RON in the user config dir

use crate::sequencer::recorder::RecordMode;
use crate::sequencer::scheduler::SchedulerTiming;
use crate::sequencer::timebase::{DEFAULT_PPQ, TimeSignature};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "midiseq";
const CONFIG_FILE: &str = "config.ron";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No configuration directory available on this system")]
    NoConfigDir,
}

/// User settings for a new sequence, the scheduler and the ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Resolution of new sequences (ticks per quarter note)
    pub ppq: u32,
    pub bpm: f64,
    pub numerator: u8,
    pub denominator: u8,
    /// Channel tracks of a new sequence (the tempo track comes on top)
    pub track_count: usize,
    /// Quantize grid, in notes per bar
    pub quantize_resolution: i64,
    /// Quantize takes when they are merged
    pub quantize_on_record: bool,
    pub record_mode: RecordMode,
    /// Click while recording
    pub click_recording: bool,
    /// Click while playing
    pub click_playing: bool,
    /// Scheduler sleep while playing, in milliseconds
    pub poll_interval_ms: u64,
    /// Scheduler sleep while parked, in milliseconds
    pub thread_interval_ms: u64,
    /// Pause after a panic before a relocation, in milliseconds
    pub relocate_delay_ms: u64,
    /// Output port name (substring match), first port when unset
    pub output_port: Option<String>,
    /// Input port name (substring match), first port when unset
    pub input_port: Option<String>,
    /// Undo levels kept
    pub history_size: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            ppq: DEFAULT_PPQ,
            bpm: 120.0,
            numerator: 4,
            denominator: 4,
            track_count: 16,
            quantize_resolution: 16,
            quantize_on_record: true,
            record_mode: RecordMode::Replace,
            click_recording: true,
            click_playing: false,
            poll_interval_ms: 10,
            thread_interval_ms: 100,
            relocate_delay_ms: 10,
            output_port: None,
            input_port: None,
            history_size: 100,
        }
    }
}

impl SequencerConfig {
    /// `<config dir>/midiseq/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = ron::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location; missing or broken files fall back to
    /// the defaults
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                log::info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring configuration {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write as pretty RON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let text = ron::ser::to_string_pretty(self, PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    pub fn save_default(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save(&path)?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ppq == 0 {
            return Err(ConfigError::Invalid("ppq must be positive".into()));
        }
        if self.bpm <= 0.0 || !self.bpm.is_finite() {
            return Err(ConfigError::Invalid(format!("bad bpm {}", self.bpm)));
        }
        if TimeSignature::new(self.numerator, self.denominator).is_none() {
            return Err(ConfigError::Invalid(format!(
                "bad time signature {}/{}",
                self.numerator, self.denominator
            )));
        }
        if self.quantize_resolution <= 0 {
            return Err(ConfigError::Invalid(
                "quantize resolution must be positive".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be positive".into()));
        }
        Ok(())
    }

    pub fn scheduler_timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            active_poll: Duration::from_millis(self.poll_interval_ms),
            idle_poll: Duration::from_millis(self.thread_interval_ms.max(self.poll_interval_ms)),
            ..SchedulerTiming::default()
        }
    }

    pub fn relocate_delay(&self) -> Duration {
        Duration::from_millis(self.relocate_delay_ms)
    }
}
