use std::sync::Arc;

use crate::dsp::context::{lerp, RenderCtx};
use crate::dsp::envelope::{EnvelopeTables, VoiceEnvelope};
use crate::dsp::oscillator::{Oscillator, WaveShape};
use crate::dsp::wavetable::WavetableBank;

pub const RATIO_MIN: f32 = 0.1;
pub const RATIO_MAX: f32 = 10.0;
pub const RATIO_DEFAULT: f32 = 1.0;
pub const MOD_INDEX_MIN: f32 = 0.0;
pub const MOD_INDEX_MAX: f32 = 450.0;
pub const MOD_INDEX_DEFAULT: f32 = 0.0;
pub const PAN_DEFAULT: f32 = 0.5;
pub const LEVEL_DEFAULT: f32 = 1.0;

#[inline]
fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// One FM operator: an oscillator shaped by an envelope.
///
/// Modulation arrives as a frequency offset accumulated from other
/// operators' previous-sample outputs; see [`RoutingGrid`](super::routing::RoutingGrid).
#[derive(Debug, Clone)]
pub struct FmOperator {
    index: usize,
    ratio: f32,
    mod_index: f32,
    pan: f32,
    level: f32,
    audible: bool,
    mod_offset: f32,
    last_mono: f32,
    last_left: f32,
    last_right: f32,
    last_hz: f32,
    oscillator: Oscillator,
    envelope: VoiceEnvelope,
}

impl FmOperator {
    pub fn new(index: usize, bank: Arc<WavetableBank>, seed: u64) -> Self {
        Self {
            index,
            ratio: RATIO_DEFAULT,
            mod_index: MOD_INDEX_DEFAULT,
            pan: PAN_DEFAULT,
            level: LEVEL_DEFAULT,
            audible: false,
            mod_offset: 0.0,
            last_mono: 0.0,
            last_left: 0.0,
            last_right: 0.0,
            last_hz: 0.0,
            oscillator: Oscillator::with_seed(bank, seed),
            envelope: VoiceEnvelope::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn mod_index(&self) -> f32 {
        self.mod_index
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_audible(&self) -> bool {
        self.audible
    }

    pub fn shape(&self) -> WaveShape {
        self.oscillator.shape()
    }

    pub fn mod_offset(&self) -> f32 {
        self.mod_offset
    }

    pub fn last_mono(&self) -> f32 {
        self.last_mono
    }

    pub fn last_left(&self) -> f32 {
        self.last_left
    }

    pub fn last_right(&self) -> f32 {
        self.last_right
    }

    /// Instantaneous frequency of the last sample, before oscillator clamping.
    pub fn last_frequency(&self) -> f32 {
        self.last_hz
    }

    pub fn envelope(&self) -> &VoiceEnvelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut VoiceEnvelope {
        &mut self.envelope
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = clamp_or(ratio, RATIO_MIN, RATIO_MAX, RATIO_DEFAULT);
    }

    pub fn set_mod_index(&mut self, index: f32) {
        self.mod_index = clamp_or(index, MOD_INDEX_MIN, MOD_INDEX_MAX, MOD_INDEX_DEFAULT);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = clamp_or(pan, 0.0, 1.0, PAN_DEFAULT);
    }

    pub fn set_level(&mut self, level: f32) {
        self.level = clamp_or(level, 0.0, 1.0, LEVEL_DEFAULT);
    }

    pub fn set_audible(&mut self, audible: bool) {
        self.audible = audible;
    }

    pub fn set_shape(&mut self, shape: WaveShape) {
        self.oscillator.set_shape(shape);
    }

    #[inline]
    pub fn clear_offset(&mut self) {
        self.mod_offset = 0.0;
    }

    #[inline]
    pub fn add_mod_from(&mut self, source_mono: f32) {
        self.mod_offset += source_mono;
    }

    #[inline]
    pub fn tick(&mut self, fundamental: f32, tables: &EnvelopeTables, ctx: &RenderCtx) {
        self.tick_with_level_mod(fundamental, 0.0, tables, ctx);
    }

    /// `level_mod` in 0..1 pushes the level toward unity.
    #[inline]
    pub fn tick_with_level_mod(
        &mut self,
        fundamental: f32,
        level_mod: f32,
        tables: &EnvelopeTables,
        ctx: &RenderCtx,
    ) {
        let hz = fundamental * self.ratio + self.mod_index * self.mod_offset;
        self.last_hz = hz;

        let level = lerp(self.level, 1.0, level_mod.clamp(0.0, 1.0));
        let raw = self.oscillator.sample(hz, ctx) * level;
        let mono = self.envelope.process(raw, tables);

        self.last_mono = mono;
        self.last_left = mono * self.pan;
        self.last_right = mono * (1.0 - self.pan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::EnvelopeParams;

    fn operator() -> FmOperator {
        FmOperator::new(0, Arc::new(WavetableBank::build().unwrap()), 3)
    }

    fn sustained() -> EnvelopeTables {
        EnvelopeTables::build(EnvelopeParams::dahdsr(0.0, 0.0, 0.0, 0.0, 1.0, 10.0), 44_100.0)
            .unwrap()
    }

    #[test]
    fn frequency_follows_ratio_and_offset() {
        let ctx = RenderCtx::new(44_100.0, 64);
        let tables = sustained();
        let mut op = operator();
        op.set_ratio(2.0);
        op.tick(220.0, &tables, &ctx);
        assert_eq!(op.last_frequency(), 440.0);

        op.set_mod_index(100.0);
        op.add_mod_from(0.5);
        op.tick(220.0, &tables, &ctx);
        assert_eq!(op.last_frequency(), 490.0);

        op.clear_offset();
        op.tick(220.0, &tables, &ctx);
        assert_eq!(op.last_frequency(), 440.0);
    }

    #[test]
    fn pan_splits_mono() {
        let ctx = RenderCtx::new(44_100.0, 64);
        let tables = sustained();
        let mut op = operator();
        op.envelope_mut().trigger_on(1.0, 0.0);
        op.set_pan(0.25);
        for _ in 0..20 {
            op.tick(440.0, &tables, &ctx);
        }
        let mono = op.last_mono();
        assert!(mono.abs() > 0.0);
        assert!((op.last_left() - mono * 0.25).abs() < 1e-7);
        assert!((op.last_right() - mono * 0.75).abs() < 1e-7);
    }

    #[test]
    fn level_mod_pushes_toward_unity() {
        let ctx = RenderCtx::new(44_100.0, 64);
        let tables = sustained();
        let mut quiet = operator();
        let mut pushed = operator();
        for op in [&mut quiet, &mut pushed] {
            op.set_level(0.0);
            op.envelope_mut().trigger_on(1.0, 0.0);
        }
        for _ in 0..20 {
            quiet.tick(440.0, &tables, &ctx);
            pushed.tick_with_level_mod(440.0, 1.0, &tables, &ctx);
        }
        assert_eq!(quiet.last_mono(), 0.0);
        assert!(pushed.last_mono().abs() > 0.0);
    }

    #[test]
    fn setters_clamp() {
        let mut op = operator();
        op.set_ratio(50.0);
        assert_eq!(op.ratio(), RATIO_MAX);
        op.set_mod_index(-1.0);
        assert_eq!(op.mod_index(), MOD_INDEX_MIN);
        op.set_pan(f32::NAN);
        assert_eq!(op.pan(), PAN_DEFAULT);
        op.set_level(3.0);
        assert_eq!(op.level(), 1.0);
    }
}
