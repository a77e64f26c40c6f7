use std::sync::Arc;

use rand::{rngs::SmallRng, Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::context::RenderCtx;
use crate::dsp::wavetable::WavetableBank;

/// Lowest frequency an oscillator will run at.
pub const MIN_OSC_HZ: f32 = 10.0;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveShape {
    #[default]
    Sine,
    Square,
    Saw,
    Triangle,
    Noise,
}

impl WaveShape {
    pub const ALL: [WaveShape; 5] = [
        WaveShape::Sine,
        WaveShape::Square,
        WaveShape::Saw,
        WaveShape::Triangle,
        WaveShape::Noise,
    ];

    /// Host choice index; anything past the end reads as noise.
    pub fn from_index(index: usize) -> Self {
        Self::ALL
            .get(index)
            .copied()
            .unwrap_or(WaveShape::Noise)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Clamps to [`MIN_OSC_HZ`, Nyquist]; non-finite input becomes the minimum.
#[inline]
pub fn clamp_frequency(hz: f32, ctx: &RenderCtx) -> f32 {
    if hz.is_finite() {
        hz.clamp(MIN_OSC_HZ, ctx.nyquist())
    } else {
        MIN_OSC_HZ
    }
}

/// Phase-accumulating oscillator reading the shared wavetable bank.
#[derive(Debug, Clone)]
pub struct Oscillator {
    bank: Arc<WavetableBank>,
    shape: WaveShape,
    phase: f32,
    rng: SmallRng,
}

impl Oscillator {
    pub fn new(bank: Arc<WavetableBank>) -> Self {
        Self::with_seed(bank, 0)
    }

    pub fn with_seed(bank: Arc<WavetableBank>, seed: u64) -> Self {
        Self {
            bank,
            shape: WaveShape::Sine,
            phase: 0.0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn shape(&self) -> WaveShape {
        self.shape
    }

    pub fn set_shape(&mut self, shape: WaveShape) {
        self.shape = shape;
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
    }

    /// One sample at `hz`, then advances the phase.
    #[inline]
    pub fn sample(&mut self, hz: f32, ctx: &RenderCtx) -> f32 {
        let increment = clamp_frequency(hz, ctx) / ctx.sample_rate;
        let phase = self.phase;

        self.phase += increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        match self.shape {
            WaveShape::Sine => self.bank.sine().sample(phase),
            WaveShape::Noise => self.rng.gen_range(-1.0..1.0),
            shape => match self.bank.set(shape) {
                Some(set) => set.table_for_increment(increment).sample(phase),
                None => 0.0,
            },
        }
    }
}
