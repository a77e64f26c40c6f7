//! Engine configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::envelope::{DEFAULT_KILL_FADE_MS, DEFAULT_RETRIG_MS};
use crate::{
    DEFAULT_POLYPHONY, DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE, MAX_POLYPHONY, MAX_SAMPLE_RATE,
    MIN_SAMPLE_RATE,
};

/// Longest retrig or kill fade accepted by [`SynthConfig::validate`].
pub const MAX_FADE_MS: f32 = 100.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate {0} Hz is outside 8000..=96000")]
    SampleRate(f32),
    #[error("block size {0} is outside 1..=2048")]
    BlockSize(usize),
    #[error("polyphony {0} is outside 1..=64")]
    Polyphony(usize),
    #[error("{name} of {value} ms is outside 0..=100")]
    FadeTime { name: &'static str, value: f32 },
    #[error("velocity tracking {0} is outside 0..=1")]
    VelocityTracking(f32),
    #[error("{0} capacity must be non-zero")]
    Capacity(&'static str),
}

/// How a new note picks its victim when every voice is busy.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StealPolicy {
    /// Oldest voice already in release, else the oldest voice.
    #[default]
    OldestReleased,
    /// Oldest voice regardless of phase.
    Oldest,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub sample_rate: f32,
    pub block_size: usize,
    pub polyphony: usize,
    pub steal_policy: StealPolicy,
    /// Fade applied when a sounding voice is retriggered.
    pub retrig_ms: f32,
    /// Fade applied to stolen or hard-stopped voices.
    pub kill_fade_ms: f32,
    pub velocity_tracking: f32,
    /// Base seed for per-voice noise generators.
    pub noise_seed: u64,
    pub message_capacity: usize,
    pub scope_capacity: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: 512,
            polyphony: DEFAULT_POLYPHONY,
            steal_policy: StealPolicy::default(),
            retrig_ms: DEFAULT_RETRIG_MS,
            kill_fade_ms: DEFAULT_KILL_FADE_MS,
            velocity_tracking: 1.0,
            noise_seed: 0x4845_5846_4d00_0001,
            message_capacity: 1024,
            scope_capacity: 8192,
        }
    }
}

impl SynthConfig {
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_polyphony(mut self, polyphony: usize) -> Self {
        self.polyphony = polyphony;
        self
    }

    pub fn with_steal_policy(mut self, policy: StealPolicy) -> Self {
        self.steal_policy = policy;
        self
    }

    pub fn with_noise_seed(mut self, seed: u64) -> Self {
        self.noise_seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !(1..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if !(1..=MAX_POLYPHONY).contains(&self.polyphony) {
            return Err(ConfigError::Polyphony(self.polyphony));
        }
        for (name, value) in [
            ("retrig fade", self.retrig_ms),
            ("kill fade", self.kill_fade_ms),
        ] {
            if !(0.0..=MAX_FADE_MS).contains(&value) {
                return Err(ConfigError::FadeTime { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.velocity_tracking) {
            return Err(ConfigError::VelocityTracking(self.velocity_tracking));
        }
        if self.message_capacity == 0 {
            return Err(ConfigError::Capacity("message queue"));
        }
        if self.scope_capacity == 0 {
            return Err(ConfigError::Capacity("scope ring"));
        }
        Ok(())
    }
}
