use crate::{DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

/// Shared audio context for rendering.
///
/// Carries the stream parameters every DSP component needs. It is `Copy` so
/// voices can hold their own and the synth can replace it wholesale when the
/// host changes sample rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderCtx {
    pub sample_rate: f32,
    pub block_size: usize,
}

impl RenderCtx {
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        let sample_rate = if sample_rate.is_finite() {
            sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
        } else {
            DEFAULT_SAMPLE_RATE
        };

        Self {
            sample_rate,
            block_size: block_size.clamp(1, MAX_BLOCK_SIZE),
        }
    }

    #[inline]
    pub fn nyquist(&self) -> f32 {
        self.sample_rate * 0.5
    }

    #[inline]
    pub fn ms_to_samples(&self, ms: f32) -> usize {
        ms_to_samples(ms, self.sample_rate)
    }
}

impl Default for RenderCtx {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, 512)
    }
}

/// Milliseconds to a whole number of samples. Negative or non-finite input
/// yields zero.
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> usize {
    let samples = (ms / 1000.0) * sample_rate;
    if samples.is_finite() && samples > 0.0 {
        samples.round() as usize
    } else {
        0
    }
}

/// Equal temperament, A4 = 440 Hz.
pub fn midi_note_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
