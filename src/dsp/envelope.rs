#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::context::{db_to_gain, lerp, ms_to_samples, RenderCtx};
use crate::MAX_SAMPLE_RATE;

/*
DAHDSR Envelope Tables
======================

Every operator (and the filter) owns one set of envelope curves shared by all
voices. The curves are precomputed lookup tables; a voice only carries a
phase and a sample counter and reads the shared table each sample.

Vocabulary
----------

  level       The envelope's output before velocity gain (0.0 to 1.0).

  phase       Delay, Attack, Hold, Decay, Sustain, Release, Retrig or Off.

  floor       MIN_LEVEL (1e-5, -100 dB). Exponential curves cannot reach
              zero, so every curve starts or ends at the floor instead.

  factor      The per-sample multiplier of an exponential segment.

  curve set   The tables for one operator: attack, decay and release.


The Shape: Exponential Segments
-------------------------------

  Level
    1.0 ┐      ╭──╮
        │     ╱    ╲_________
    S   │    │               ╲
        │    │                 ╲
    0.0 └────┴───────────────────⎯⎯──→ Time
        Delay A  Hold D  Sustain  Release

Each segment moves between two levels by repeated multiplication:

    factor = exp((ln(end) - ln(start)) / length)
    table[i] = start * factor^(i + 1)

so the last entry equals `end`. Attack runs floor → 1, decay runs
1 → sustain, and release is stored normalized (1 → floor). A voice scales the
release table by the level it was at when the note was released, so release
begins exactly where the previous phase left off.


Retrig and Kill-Quick
---------------------

Both are short fades computed at trigger time from the current level down to
the floor, using the same factor math. Retrig then restarts at Delay; a kill
ends in Off. Neither needs a table, so they work no matter what tables are
published at the time.


Swapping Tables Mid-Note
------------------------

Tables are rebuilt on the control thread and swapped in at a block boundary.
A voice that was halfway through a long attack may find the new attack table
shorter than its counter. An index past the end of a table means the phase is
complete, so the voice simply moves on.
*/

/// The floor every exponential segment starts or ends at.
pub const MIN_LEVEL: f32 = 1e-5;

pub const DELAY_MAX_MS: f32 = 4000.0;
pub const ATTACK_MAX_MS: f32 = 4000.0;
pub const HOLD_MAX_MS: f32 = 8000.0;
pub const DECAY_MAX_MS: f32 = 4000.0;
pub const RELEASE_MAX_MS: f32 = 4000.0;

/// Longest table any segment may produce.
pub const MAX_LUT_LEN: usize = (RELEASE_MAX_MS / 1000.0 * MAX_SAMPLE_RATE) as usize;

pub const DEFAULT_RETRIG_MS: f32 = 4.0;
pub const DEFAULT_KILL_FADE_MS: f32 = 5.0;

const VELOCITY_MIN_DB: f32 = -10.0;
const VELOCITY_CENTRE_DB: f32 = -6.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvelopeError {
    #[error("non-finite envelope parameters: {0:?}")]
    NonFinite(EnvelopeParams),
    #[error("invalid sample rate {0}")]
    SampleRate(f32),
    #[error("generated {0} curve contains non-finite values")]
    Curve(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Retrig,
    Off,
}

/// Names one field of [`EnvelopeParams`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    pub delay_ms: f32,
    pub attack_ms: f32,
    pub hold_ms: f32,
    pub decay_ms: f32,
    pub sustain: f32,
    pub release_ms: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            delay_ms: 0.0,
            attack_ms: 20.0,
            hold_ms: 0.0,
            decay_ms: 40.0,
            sustain: 0.6,
            release_ms: 80.0,
        }
    }
}

impl EnvelopeParams {
    pub fn dahdsr(
        delay_ms: f32,
        attack_ms: f32,
        hold_ms: f32,
        decay_ms: f32,
        sustain: f32,
        release_ms: f32,
    ) -> Self {
        let mut params = Self::default();
        params.set_delay(delay_ms);
        params.set_attack(attack_ms);
        params.set_hold(hold_ms);
        params.set_decay(decay_ms);
        params.set_sustain(sustain);
        params.set_release(release_ms);
        params
    }

    // `clamp` keeps NaN as NaN; the table build rejects it.
    pub fn set_delay(&mut self, ms: f32) {
        self.delay_ms = ms.clamp(0.0, DELAY_MAX_MS);
    }

    pub fn set_attack(&mut self, ms: f32) {
        self.attack_ms = ms.clamp(0.0, ATTACK_MAX_MS);
    }

    pub fn set_hold(&mut self, ms: f32) {
        self.hold_ms = ms.clamp(0.0, HOLD_MAX_MS);
    }

    pub fn set_decay(&mut self, ms: f32) {
        self.decay_ms = ms.clamp(0.0, DECAY_MAX_MS);
    }

    pub fn set_sustain(&mut self, level: f32) {
        self.sustain = level.clamp(0.0, 1.0);
    }

    pub fn set_release(&mut self, ms: f32) {
        self.release_ms = ms.clamp(0.0, RELEASE_MAX_MS);
    }

    pub fn set(&mut self, stage: EnvelopeStage, value: f32) {
        match stage {
            EnvelopeStage::Delay => self.set_delay(value),
            EnvelopeStage::Attack => self.set_attack(value),
            EnvelopeStage::Hold => self.set_hold(value),
            EnvelopeStage::Decay => self.set_decay(value),
            EnvelopeStage::Sustain => self.set_sustain(value),
            EnvelopeStage::Release => self.set_release(value),
        }
    }

    pub fn get(&self, stage: EnvelopeStage) -> f32 {
        match stage {
            EnvelopeStage::Delay => self.delay_ms,
            EnvelopeStage::Attack => self.attack_ms,
            EnvelopeStage::Hold => self.hold_ms,
            EnvelopeStage::Decay => self.decay_ms,
            EnvelopeStage::Sustain => self.sustain,
            EnvelopeStage::Release => self.release_ms,
        }
    }

    fn is_finite(&self) -> bool {
        [
            self.delay_ms,
            self.attack_ms,
            self.hold_ms,
            self.decay_ms,
            self.sustain,
            self.release_ms,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

#[inline]
fn floor_level(level: f32) -> f32 {
    // NaN compares false and lands on the floor too
    if level > MIN_LEVEL {
        level
    } else {
        MIN_LEVEL
    }
}

/// Per-sample multiplier that moves `start` to `end` in `length_samples`.
pub fn factor_for(start: f32, end: f32, length_samples: usize) -> f64 {
    let start = floor_level(start) as f64;
    let end = floor_level(end) as f64;
    let length = length_samples.max(1) as f64;
    ((end.ln() - start.ln()) / length).exp()
}

fn exponential_curve(start: f32, end: f32, len: usize) -> Vec<f32> {
    let factor = factor_for(start, end, len);
    let mut level = floor_level(start) as f64;
    let mut curve = Vec::with_capacity(len);
    for _ in 0..len {
        level *= factor;
        curve.push(level as f32);
    }
    if let Some(last) = curve.last_mut() {
        *last = floor_level(end);
    }
    curve
}

/// Gain for a note velocity in 0..1.
///
/// Velocity maps onto -10 dB..0 dB, skewed so that half velocity lands at
/// -6 dB, then blends toward unity as `tracking` falls to zero.
pub fn velocity_gain(velocity: f32, tracking: f32) -> f32 {
    let velocity = if velocity.is_finite() {
        velocity.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let tracking = if tracking.is_finite() {
        tracking.clamp(0.0, 1.0)
    } else {
        1.0
    };

    let min = db_to_gain(VELOCITY_MIN_DB);
    let centre = db_to_gain(VELOCITY_CENTRE_DB);
    let skew = 0.5_f32.ln() / ((centre - min) / (1.0 - min)).ln();
    let tracked = min + (1.0 - min) * velocity.powf(1.0 / skew);
    lerp(1.0, tracked, tracking)
}

/// One curve set: the precomputed tables for one operator or the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeTables {
    params: EnvelopeParams,
    sample_rate: f32,
    delay_len: usize,
    hold_len: usize,
    attack: Vec<f32>,
    decay: Vec<f32>,
    release: Vec<f32>,
}

impl EnvelopeTables {
    pub fn build(params: EnvelopeParams, sample_rate: f32) -> Result<Self, EnvelopeError> {
        if !params.is_finite() {
            return Err(EnvelopeError::NonFinite(params));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(EnvelopeError::SampleRate(sample_rate));
        }

        let tables = Self::compute(params, sample_rate);
        for (name, curve) in [
            ("attack", &tables.attack),
            ("decay", &tables.decay),
            ("release", &tables.release),
        ] {
            if curve.iter().any(|v| !v.is_finite()) {
                return Err(EnvelopeError::Curve(name));
            }
        }
        Ok(tables)
    }

    fn compute(params: EnvelopeParams, sample_rate: f32) -> Self {
        let sample_rate = sample_rate.min(MAX_SAMPLE_RATE);
        let table_len = |ms: f32| ms_to_samples(ms, sample_rate).min(MAX_LUT_LEN);

        Self {
            params,
            sample_rate,
            delay_len: ms_to_samples(params.delay_ms, sample_rate),
            hold_len: ms_to_samples(params.hold_ms, sample_rate),
            attack: exponential_curve(MIN_LEVEL, 1.0, table_len(params.attack_ms)),
            decay: exponential_curve(1.0, params.sustain, table_len(params.decay_ms)),
            release: exponential_curve(1.0, MIN_LEVEL, table_len(params.release_ms)),
        }
    }

    pub fn params(&self) -> &EnvelopeParams {
        &self.params
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn sustain(&self) -> f32 {
        self.params.sustain
    }

    /// Length of a phase in samples. Sustain and Off are open-ended and
    /// report zero, as do Retrig and kill fades which are not tabulated.
    pub fn phase_len(&self, phase: EnvelopePhase) -> usize {
        match phase {
            EnvelopePhase::Delay => self.delay_len,
            EnvelopePhase::Attack => self.attack.len(),
            EnvelopePhase::Hold => self.hold_len,
            EnvelopePhase::Decay => self.decay.len(),
            EnvelopePhase::Release => self.release.len(),
            EnvelopePhase::Sustain | EnvelopePhase::Retrig | EnvelopePhase::Off => 0,
        }
    }

    /// The same params rendered for another sample rate.
    pub fn rebuilt_for(&self, sample_rate: f32) -> Result<Self, EnvelopeError> {
        Self::build(self.params, sample_rate)
    }
}

impl Default for EnvelopeTables {
    fn default() -> Self {
        Self::compute(EnvelopeParams::default(), crate::DEFAULT_SAMPLE_RATE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Fade {
    level: f32,
    factor: f32,
    remaining: usize,
}

impl Fade {
    fn new(from: f32, samples: usize) -> Self {
        Self {
            level: from,
            factor: factor_for(from, MIN_LEVEL, samples) as f32,
            remaining: samples,
        }
    }

    /// Next level, or `None` once the floor has been reached.
    #[inline]
    fn next(&mut self) -> Option<f32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.level = if self.remaining == 0 {
            MIN_LEVEL
        } else {
            self.level * self.factor
        };
        Some(self.level)
    }
}

/// Per-voice reader over a shared [`EnvelopeTables`].
#[derive(Debug, Clone)]
pub struct VoiceEnvelope {
    phase: EnvelopePhase,
    index: usize,
    level: f32,
    velocity_gain: f32,
    next_velocity_gain: f32,
    release_start: f32,
    retrig_len: usize,
    fade: Option<Fade>,
}

impl Default for VoiceEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceEnvelope {
    pub fn new() -> Self {
        Self {
            phase: EnvelopePhase::Off,
            index: 0,
            level: 0.0,
            velocity_gain: 1.0,
            next_velocity_gain: 1.0,
            release_start: 0.0,
            retrig_len: ms_to_samples(DEFAULT_RETRIG_MS, crate::DEFAULT_SAMPLE_RATE),
            fade: None,
        }
    }

    /// Length of the fade used when a sounding envelope is retriggered.
    pub fn set_retrig(&mut self, retrig_ms: f32, ctx: &RenderCtx) {
        self.retrig_len = ctx.ms_to_samples(retrig_ms);
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != EnvelopePhase::Off
    }

    pub fn is_killing(&self) -> bool {
        self.phase == EnvelopePhase::Release && self.fade.is_some()
    }

    /// Level of the last processed sample, including velocity gain.
    pub fn last_level(&self) -> f32 {
        self.level * self.velocity_gain
    }

    pub fn trigger_on(&mut self, velocity: f32, tracking: f32) {
        self.next_velocity_gain = velocity_gain(velocity, tracking);

        if self.is_active() && self.level > MIN_LEVEL && self.retrig_len > 0 {
            self.fade = Some(Fade::new(self.level, self.retrig_len));
            self.enter(EnvelopePhase::Retrig);
        } else {
            self.fade = None;
            self.enter(EnvelopePhase::Delay);
        }
    }

    pub fn trigger_off(&mut self) {
        match self.phase {
            EnvelopePhase::Off | EnvelopePhase::Release => {}
            // already fading out; finish in Off instead of restarting
            EnvelopePhase::Retrig => self.phase = EnvelopePhase::Release,
            _ => self.begin_release(),
        }
    }

    /// Fades from the current level to the floor over `fade_ms`, then Off.
    pub fn kill_quick(&mut self, fade_ms: f32, ctx: &RenderCtx) {
        if !self.is_active() {
            return;
        }
        let samples = ctx.ms_to_samples(fade_ms);
        if self.level <= MIN_LEVEL || samples == 0 {
            self.fade = None;
            self.enter(EnvelopePhase::Off);
            return;
        }
        if let Some(fade) = self.fade {
            // never lengthen a fade that is already shorter
            if self.phase == EnvelopePhase::Release && fade.remaining <= samples {
                return;
            }
        }
        self.fade = Some(Fade::new(self.level, samples));
        self.phase = EnvelopePhase::Release;
    }

    /// Returns `input * level * velocity_gain` and advances one sample.
    #[inline]
    pub fn process(&mut self, input: f32, tables: &EnvelopeTables) -> f32 {
        self.level = self.next_level(tables);
        input * self.level * self.velocity_gain
    }

    fn enter(&mut self, phase: EnvelopePhase) {
        if phase == EnvelopePhase::Delay {
            self.velocity_gain = self.next_velocity_gain;
        }
        if phase == EnvelopePhase::Off {
            self.level = 0.0;
        }
        self.phase = phase;
        self.index = 0;
    }

    fn begin_release(&mut self) {
        if self.level <= MIN_LEVEL {
            self.enter(EnvelopePhase::Off);
        } else {
            self.release_start = self.level;
            self.enter(EnvelopePhase::Release);
        }
    }

    fn next_level(&mut self, tables: &EnvelopeTables) -> f32 {
        // Each arm either yields a level or moves strictly forward, so zero
        // length phases fall through within the same sample.
        loop {
            match self.phase {
                EnvelopePhase::Off => return 0.0,
                EnvelopePhase::Delay => {
                    if self.index < tables.delay_len {
                        self.index += 1;
                        return 0.0;
                    }
                    self.enter(EnvelopePhase::Attack);
                }
                EnvelopePhase::Attack => {
                    if let Some(&level) = tables.attack.get(self.index) {
                        self.index += 1;
                        return level;
                    }
                    self.enter(EnvelopePhase::Hold);
                }
                EnvelopePhase::Hold => {
                    if self.index < tables.hold_len {
                        self.index += 1;
                        return 1.0;
                    }
                    self.enter(EnvelopePhase::Decay);
                }
                EnvelopePhase::Decay => {
                    if let Some(&level) = tables.decay.get(self.index) {
                        self.index += 1;
                        return level;
                    }
                    self.enter(EnvelopePhase::Sustain);
                }
                EnvelopePhase::Sustain => return tables.sustain(),
                EnvelopePhase::Release => {
                    if let Some(fade) = self.fade.as_mut() {
                        if let Some(level) = fade.next() {
                            return level;
                        }
                        self.fade = None;
                        self.enter(EnvelopePhase::Off);
                        continue;
                    }
                    if let Some(&level) = tables.release.get(self.index) {
                        self.index += 1;
                        return self.release_start * level;
                    }
                    self.enter(EnvelopePhase::Off);
                }
                EnvelopePhase::Retrig => {
                    if let Some(level) = self.fade.as_mut().and_then(Fade::next) {
                        return level;
                    }
                    self.fade = None;
                    self.enter(EnvelopePhase::Delay);
                }
            }
        }
    }
}
