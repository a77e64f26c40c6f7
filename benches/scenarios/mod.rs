//! Whole-engine benchmarks.
//!
//! These render through `Synth::render_block`, so they include message
//! draining, routing and per-voice filtering.

mod voices;

pub use voices::bench_voices;
