//! Polyphonic FM synthesis engine.
//!
//! The engine is split in two halves. [`Synth`] lives on the audio thread and
//! renders blocks; [`SynthHandle`] lives on the control side, rebuilds envelope
//! tables and enqueues parameter changes. A [`TelemetryReader`] observes the
//! audio thread without blocking it.

pub mod config;
pub mod dsp;
pub mod error;
pub mod io;
pub mod synth;

pub use config::{StealPolicy, SynthConfig};
pub use dsp::context::RenderCtx;
pub use error::EngineError;
pub use synth::handle::SynthHandle;
pub use synth::message::{ParamChange, SynthMessage};
pub use synth::poly::Synth;
pub use synth::telemetry::{ScopeFrame, TelemetryReader, TelemetrySnapshot};

/// Largest block rendered in one pass; longer host requests are chunked.
pub const MAX_BLOCK_SIZE: usize = 2048;
pub const MAX_SAMPLE_RATE: f32 = 96_000.0;
pub const MIN_SAMPLE_RATE: f32 = 8_000.0;
pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;

/// Operators per voice.
pub const OPERATOR_COUNT: usize = 6;
/// LFOs per voice.
pub const LFO_COUNT: usize = 4;
pub const DEFAULT_POLYPHONY: usize = 18;
pub const MAX_POLYPHONY: usize = 64;
