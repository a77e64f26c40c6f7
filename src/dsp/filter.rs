use std::f32::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::context::{lerp, RenderCtx};
use crate::dsp::envelope::{EnvelopeTables, VoiceEnvelope};

/*
| type      | passes          | rejects      |
| --------- | --------------- | ------------ |
| low-pass  | below cutoff    | above cutoff |
| high-pass | above cutoff    | below cutoff |
| band-pass | around cutoff   | outside      |

Cutoff modulation
-----------------

The envelope and LFOs push the cutoff toward the top of the range:

    m         = clamp(env_mod + lfo_mod, 0, 1)
    effective = cutoff + (CUTOFF_MAX - cutoff) * m

so a fully open envelope always reaches CUTOFF_MAX regardless of where the
knob sits.
*/

pub const CUTOFF_MIN: f32 = 20.0;
pub const CUTOFF_MAX: f32 = 20_000.0;
pub const CUTOFF_DEFAULT: f32 = 4_000.0;
pub const RESONANCE_MIN: f32 = 0.1;
pub const RESONANCE_MAX: f32 = 35.0;
pub const RESONANCE_DEFAULT: f32 = 1.0;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
}

impl FilterType {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => FilterType::HighPass,
            2 => FilterType::BandPass,
            _ => FilterType::LowPass,
        }
    }
}

pub struct FilterOutputs {
    pub lowpass: f32,
    pub bandpass: f32,
    pub highpass: f32,
}

/// Highest cutoff that stays stable at `sample_rate`.
#[inline]
pub fn max_cutoff(sample_rate: f32) -> f32 {
    CUTOFF_MAX.min(0.49 * sample_rate)
}

#[inline]
fn clamp_cutoff(cutoff: f32, sample_rate: f32) -> f32 {
    if cutoff.is_finite() {
        cutoff.clamp(CUTOFF_MIN, max_cutoff(sample_rate))
    } else {
        CUTOFF_DEFAULT.min(max_cutoff(sample_rate))
    }
}

/// TPT state-variable core (Zavalishin / Simper).
#[derive(Debug, Clone, Default)]
pub struct SvfCore {
    ic1eq: f32, // First integrator's memory
    ic2eq: f32, // Second integrator's memory
    g: f32,
    k: f32,
}

impl SvfCore {
    pub fn new(sample_rate: f32, cutoff: f32, resonance: f32) -> Self {
        let mut core = Self::default();
        core.set_coefficients(compute_g(cutoff, sample_rate), compute_k(resonance));
        core
    }

    #[inline]
    pub fn set_coefficients(&mut self, g: f32, k: f32) {
        self.g = g;
        self.k = k;
    }

    #[inline]
    pub fn next_sample(&mut self, sample: f32) -> FilterOutputs {
        let (g, k) = (self.g, self.k);
        let h = 1.0 / (1.0 + g * (g + k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        FilterOutputs {
            lowpass: v2,
            bandpass: v1,
            highpass: sample - k * v1 - v2,
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

#[inline]
fn compute_g(cutoff: f32, sample_rate: f32) -> f32 {
    (PI * clamp_cutoff(cutoff, sample_rate) / sample_rate).tan()
}

#[inline]
fn compute_k(resonance: f32) -> f32 {
    let q = if resonance.is_finite() {
        resonance.clamp(RESONANCE_MIN, RESONANCE_MAX)
    } else {
        RESONANCE_DEFAULT
    };
    1.0 / q
}

/// One channel of filtering; the variant selects the response.
#[derive(Debug, Clone)]
pub enum FilterCore {
    LowPass(SvfCore),
    HighPass(SvfCore),
    BandPass(SvfCore),
}

impl FilterCore {
    pub fn new(filter_type: FilterType, sample_rate: f32, cutoff: f32, resonance: f32) -> Self {
        let core = SvfCore::new(sample_rate, cutoff, resonance);
        match filter_type {
            FilterType::LowPass => FilterCore::LowPass(core),
            FilterType::HighPass => FilterCore::HighPass(core),
            FilterType::BandPass => FilterCore::BandPass(core),
        }
    }

    pub fn filter_type(&self) -> FilterType {
        match self {
            FilterCore::LowPass(_) => FilterType::LowPass,
            FilterCore::HighPass(_) => FilterType::HighPass,
            FilterCore::BandPass(_) => FilterType::BandPass,
        }
    }

    fn core_mut(&mut self) -> &mut SvfCore {
        match self {
            FilterCore::LowPass(core) | FilterCore::HighPass(core) | FilterCore::BandPass(core) => {
                core
            }
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32, g: f32, k: f32) -> f32 {
        let filter_type = self.filter_type();
        let core = self.core_mut();
        core.set_coefficients(g, k);
        let outputs = core.next_sample(input);
        let out = match filter_type {
            FilterType::LowPass => outputs.lowpass,
            FilterType::HighPass => outputs.highpass,
            FilterType::BandPass => outputs.bandpass,
        };
        if out.is_finite() {
            out
        } else {
            core.reset();
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.core_mut().reset();
    }
}

/// Per-voice stereo filter with its own envelope and wet/dry mix.
#[derive(Debug, Clone)]
pub struct StereoFilter {
    filter_type: FilterType,
    cutoff: f32,
    resonance: f32,
    wet_level: f32,
    env_depth: f32,
    sample_rate: f32,
    env_mod: f32,
    left: FilterCore,
    right: FilterCore,
    envelope: VoiceEnvelope,
}

impl StereoFilter {
    pub fn new(ctx: &RenderCtx) -> Self {
        let sample_rate = ctx.sample_rate;
        Self {
            filter_type: FilterType::LowPass,
            cutoff: CUTOFF_DEFAULT,
            resonance: RESONANCE_DEFAULT,
            wet_level: 1.0,
            env_depth: 0.0,
            sample_rate,
            env_mod: 0.0,
            left: FilterCore::new(FilterType::LowPass, sample_rate, CUTOFF_DEFAULT, RESONANCE_DEFAULT),
            right: FilterCore::new(FilterType::LowPass, sample_rate, CUTOFF_DEFAULT, RESONANCE_DEFAULT),
            envelope: VoiceEnvelope::new(),
        }
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    pub fn wet_level(&self) -> f32 {
        self.wet_level
    }

    pub fn env_depth(&self) -> f32 {
        self.env_depth
    }

    pub fn envelope(&self) -> &VoiceEnvelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut VoiceEnvelope {
        &mut self.envelope
    }

    /// Swaps in fresh cores of the new type.
    pub fn set_type(&mut self, filter_type: FilterType) {
        if filter_type == self.filter_type {
            return;
        }
        self.filter_type = filter_type;
        self.left = FilterCore::new(filter_type, self.sample_rate, self.cutoff, self.resonance);
        self.right = FilterCore::new(filter_type, self.sample_rate, self.cutoff, self.resonance);
    }

    /// Stores the requested cutoff; the rate limit is applied per sample so
    /// the request survives a trip through a lower sample rate.
    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = if cutoff.is_finite() {
            cutoff.clamp(CUTOFF_MIN, CUTOFF_MAX)
        } else {
            CUTOFF_DEFAULT
        };
    }

    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = 1.0 / compute_k(resonance);
    }

    pub fn set_wet_level(&mut self, wet: f32) {
        self.wet_level = clamp_unit(wet);
    }

    pub fn set_env_depth(&mut self, depth: f32) {
        self.env_depth = clamp_unit(depth);
    }

    pub fn set_sample_rate(&mut self, ctx: &RenderCtx) {
        self.sample_rate = ctx.sample_rate;
        self.left.reset();
        self.right.reset();
    }

    /// Advances the filter envelope; the result is the cutoff modulation.
    #[inline]
    pub fn tick(&mut self, tables: &EnvelopeTables) -> f32 {
        self.env_mod = self.envelope.process(self.env_depth, tables);
        self.env_mod
    }

    #[inline]
    pub fn effective_cutoff(&self, mod_depth: f32) -> f32 {
        let m = (self.env_mod + mod_depth).clamp(0.0, 1.0);
        let top = max_cutoff(self.sample_rate);
        let base = self.cutoff.min(top);
        base + (top - base) * m
    }

    #[inline]
    fn coefficients(&self, mod_depth: f32) -> (f32, f32) {
        (
            compute_g(self.effective_cutoff(mod_depth), self.sample_rate),
            compute_k(self.resonance),
        )
    }

    pub fn process_left(&mut self, input: f32) -> f32 {
        self.process_left_with_mod(input, 0.0)
    }

    pub fn process_right(&mut self, input: f32) -> f32 {
        self.process_right_with_mod(input, 0.0)
    }

    pub fn process_left_with_mod(&mut self, input: f32, mod_depth: f32) -> f32 {
        let (g, k) = self.coefficients(mod_depth);
        let wet = self.left.process(input, g, k);
        lerp(input, wet, self.wet_level)
    }

    pub fn process_right_with_mod(&mut self, input: f32, mod_depth: f32) -> f32 {
        let (g, k) = self.coefficients(mod_depth);
        let wet = self.right.process(input, g, k);
        lerp(input, wet, self.wet_level)
    }

    /// Both channels with one coefficient computation.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32, mod_depth: f32) -> (f32, f32) {
        let (g, k) = self.coefficients(mod_depth);
        let wet_l = self.left.process(left, g, k);
        let wet_r = self.right.process(right, g, k);
        (
            lerp(left, wet_l, self.wet_level),
            lerp(right, wet_r, self.wet_level),
        )
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.env_mod = 0.0;
    }
}

#[inline]
fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
