use thiserror::Error;

use crate::config::ConfigError;
use crate::dsp::envelope::EnvelopeError;
use crate::dsp::oscillator::WaveShape;

/// Errors surfaced by construction and control-side APIs.
///
/// Nothing on the render path returns one of these: the audio thread clamps,
/// floors or steals instead of failing.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("envelope table build failed: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("failed to build {shape:?} wavetable set")]
    Wavetable { shape: WaveShape },

    #[error("control queue is full")]
    QueueFull,
}
