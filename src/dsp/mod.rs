//! Low-level DSP primitives used by the voices.
//!
//! These components are allocation-free and realtime-safe once constructed,
//! making them safe to embed directly inside voice structs. Anything that
//! allocates (wavetables, envelope tables) is built up front or on the
//! control thread.

/// Render context and unit conversions.
pub mod context;
/// Delay/attack/hold/decay/sustain/release envelope tables and readers.
pub mod envelope;
/// Stereo state-variable filter with its own envelope.
pub mod filter;
/// Low frequency oscillators.
pub mod lfo;
/// Audio-rate oscillators and noise.
pub mod oscillator;
/// Band-limited wavetables built by FFT.
pub mod wavetable;

pub use context::RenderCtx;
pub use envelope::{EnvelopeParams, EnvelopePhase, EnvelopeTables, VoiceEnvelope};
pub use filter::{FilterType, StereoFilter};
pub use lfo::{Lfo, LfoTarget};
pub use oscillator::{Oscillator, WaveShape};
pub use wavetable::{Wavetable, WavetableBank, WavetableSet};
