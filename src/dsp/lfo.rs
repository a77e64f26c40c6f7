//! Low Frequency Oscillators.

/*
Low Frequency Oscillators
=========================

An LFO is simply an oscillator running at sub-audio frequencies. Here it
never makes sound: it produces a unipolar control value that pushes an
operator's level or the filter cutoff upward.

Vocabulary
----------

  control-rate    Frequencies below hearing: 0.01 Hz to 20 Hz.

  depth           Scales the LFO output before it reaches its target.

  target          What the LFO moves. Encoded as one host index:

                      0          nothing
                      1..=N      operator (index - 1) level
                      N + 1      filter cutoff

  unipolar        Output is only positive: 0.0 to 1.0. Every target is
                  "pushed toward the top", so unipolar is the natural range.


Shapes
------

Sine, square, saw and triangle read 1024-entry unipolar tables from the
shared wavetable bank. These are the naive shapes; aliasing is irrelevant at
control rate and a square LFO should switch hard.

Noise is sample & hold: a new random value is drawn each time the phase
wraps, and held for the whole cycle.


Sync
----

FREE-RUNNING: phase carries on across notes.
SYNCED: note_on resets the phase, so every note hears the same sweep.


Bipolar to Unipolar Conversion
------------------------------

    unipolar = (bipolar + 1.0) * 0.5

    bipolar   unipolar
    -1.0      0.0
     0.0      0.5
    +1.0      1.0
*/

use std::sync::Arc;

use rand::{rngs::SmallRng, Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::context::RenderCtx;
use crate::dsp::oscillator::WaveShape;
use crate::dsp::wavetable::WavetableBank;
use crate::OPERATOR_COUNT;

pub const RATE_MIN: f32 = 0.01;
pub const RATE_MAX: f32 = 20.0;
pub const RATE_DEFAULT: f32 = 1.0;

/// Convert bipolar signal (-1.0 to +1.0) to unipolar (0.0 to 1.0).
#[inline]
pub fn bipolar_to_unipolar(bipolar: f32) -> f32 {
    (bipolar + 1.0) * 0.5
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LfoTarget {
    #[default]
    None,
    OperatorLevel(usize),
    FilterCutoff,
}

impl LfoTarget {
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => LfoTarget::None,
            i if i <= OPERATOR_COUNT => LfoTarget::OperatorLevel(i - 1),
            i if i == OPERATOR_COUNT + 1 => LfoTarget::FilterCutoff,
            _ => LfoTarget::None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            LfoTarget::None => 0,
            LfoTarget::OperatorLevel(op) if op < OPERATOR_COUNT => op + 1,
            LfoTarget::OperatorLevel(_) => 0,
            LfoTarget::FilterCutoff => OPERATOR_COUNT + 1,
        }
    }

    /// Out-of-range operator targets collapse to `None`.
    pub fn sanitized(self) -> Self {
        Self::from_index(self.index())
    }
}

#[derive(Debug, Clone)]
pub struct Lfo {
    bank: Arc<WavetableBank>,
    shape: WaveShape,
    rate: f32,
    depth: f32,
    sync: bool,
    target: LfoTarget,
    phase: f32,
    held: f32,
    rng: SmallRng,
}

impl Lfo {
    pub fn new(bank: Arc<WavetableBank>, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let held = bipolar_to_unipolar(rng.gen_range(-1.0..1.0));
        Self {
            bank,
            shape: WaveShape::Sine,
            rate: RATE_DEFAULT,
            depth: 0.0,
            sync: false,
            target: LfoTarget::None,
            phase: 0.0,
            held,
            rng,
        }
    }

    pub fn shape(&self) -> WaveShape {
        self.shape
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn target(&self) -> LfoTarget {
        self.target
    }

    pub fn set_shape(&mut self, shape: WaveShape) {
        self.shape = shape;
    }

    pub fn set_rate(&mut self, hz: f32) {
        self.rate = if hz.is_finite() {
            hz.clamp(RATE_MIN, RATE_MAX)
        } else {
            RATE_DEFAULT
        };
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.depth = if depth.is_finite() {
            depth.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    pub fn set_target(&mut self, target: LfoTarget) {
        self.target = target.sanitized();
    }

    pub fn note_on(&mut self) {
        if self.sync {
            self.phase = 0.0;
        }
    }

    /// Unipolar value for this sample, then advances the phase.
    #[inline]
    pub fn tick(&mut self, ctx: &RenderCtx) -> f32 {
        let value = match self.shape {
            WaveShape::Noise => self.held,
            shape => self.bank.lfo_sample(shape, self.phase),
        };

        self.phase += self.rate / ctx.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            self.held = bipolar_to_unipolar(self.rng.gen_range(-1.0..1.0));
        }
        value
    }

    /// `tick` scaled by depth.
    #[inline]
    pub fn modulation(&mut self, ctx: &RenderCtx) -> f32 {
        self.tick(ctx) * self.depth
    }
}
