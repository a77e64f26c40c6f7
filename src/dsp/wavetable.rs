use std::f32::consts::TAU;

use rustfft::{num_complex::Complex, FftPlanner};

use crate::dsp::lfo::bipolar_to_unipolar;
use crate::dsp::oscillator::WaveShape;
use crate::error::EngineError;

/*
Band-Limited Wavetables
=======================

A naive square or saw has partials all the way up. Played at a high pitch,
every partial above Nyquist folds back down as an inharmonic alias. The fix
is to keep one table per octave band, each containing only the harmonics
that stay below Nyquist for the pitches it serves.

Construction
------------

    naive shape ──FFT──→ spectrum ──keep 1..=limit──IFFT──→ table

for limit = 511, 255, 127, ... 1. A table with `limit` harmonics is safe while

    limit * increment < 0.5        (increment = hz / sample_rate)

so its valid range is [previous max, 0.5 / limit). The loudest table sets the
scale for the whole set, so switching bands never jumps in loudness and no
table peaks above 0.999.
*/

pub const TABLE_SIZE: usize = 1024;

const PEAK: f32 = 0.999;
const SILENT_BIN: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct Wavetable {
    samples: Vec<f32>,
    harmonics: usize,
    min_increment: f32,
    max_increment: f32,
}

impl Wavetable {
    fn sine() -> Self {
        let samples = (0..TABLE_SIZE)
            .map(|i| (TAU * i as f32 / TABLE_SIZE as f32).sin())
            .collect();
        Self {
            samples,
            harmonics: 1,
            min_increment: 0.0,
            max_increment: 0.5,
        }
    }

    /// Linear interpolation at `phase` in [0, 1).
    #[inline]
    pub fn sample(&self, phase: f32) -> f32 {
        read_interpolated(&self.samples, phase)
    }

    pub fn harmonics(&self) -> usize {
        self.harmonics
    }

    pub fn covers(&self, increment: f32) -> bool {
        increment >= self.min_increment && increment < self.max_increment
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

#[inline]
fn read_interpolated(table: &[f32], phase: f32) -> f32 {
    let len = table.len();
    if len == 0 {
        return 0.0;
    }
    let pos = phase.rem_euclid(1.0) * len as f32;
    let i0 = (pos as usize).min(len - 1);
    let i1 = (i0 + 1) % len;
    let frac = pos - i0 as f32;
    table[i0] + (table[i1] - table[i0]) * frac
}

/// One octave-banded family of tables for a single shape.
#[derive(Debug, Clone)]
pub struct WavetableSet {
    shape: WaveShape,
    tables: Vec<Wavetable>,
}

impl WavetableSet {
    pub fn build(shape: WaveShape, planner: &mut FftPlanner<f32>) -> Result<Self, EngineError> {
        let naive = naive_shape(shape).ok_or(EngineError::Wavetable { shape })?;

        let forward = planner.plan_fft_forward(TABLE_SIZE);
        let inverse = planner.plan_fft_inverse(TABLE_SIZE);

        let mut spectrum: Vec<Complex<f32>> =
            naive.iter().map(|&s| Complex::new(s, 0.0)).collect();
        forward.process(&mut spectrum);
        spectrum[0] = Complex::new(0.0, 0.0);
        spectrum[TABLE_SIZE / 2] = Complex::new(0.0, 0.0);

        let mut top = TABLE_SIZE / 2 - 1;
        while top > 0 && spectrum[top].norm() < SILENT_BIN {
            top -= 1;
        }
        if top == 0 {
            return Err(EngineError::Wavetable { shape });
        }

        let mut raw_tables = Vec::new();
        let mut limit = top;
        loop {
            let mut bins = vec![Complex::new(0.0, 0.0); TABLE_SIZE];
            for h in 1..=limit {
                bins[h] = spectrum[h];
                bins[TABLE_SIZE - h] = spectrum[TABLE_SIZE - h];
            }
            inverse.process(&mut bins);
            raw_tables.push((limit, bins.iter().map(|c| c.re).collect::<Vec<f32>>()));

            if limit == 1 {
                break;
            }
            limit /= 2;
        }

        let centered: Vec<(usize, Vec<f32>)> = raw_tables
            .into_iter()
            .map(|(harmonics, raw)| (harmonics, remove_offset(raw)))
            .collect();

        // one scale for the whole set, taken from its loudest table
        let peak = centered
            .iter()
            .flat_map(|(_, samples)| samples.iter())
            .fold(0.0f32, |acc, &x| acc.max(x.abs()));
        if !(peak.is_finite() && peak > 0.0) {
            return Err(EngineError::Wavetable { shape });
        }
        let scale = PEAK / peak;

        let mut min_increment = 0.0;
        let mut tables = Vec::with_capacity(centered.len());
        for (harmonics, samples) in centered {
            let max_increment = 0.5 / harmonics as f32;
            tables.push(Wavetable {
                samples: samples.into_iter().map(|x| x * scale).collect(),
                harmonics,
                min_increment,
                max_increment,
            });
            min_increment = max_increment;
        }

        Ok(Self { shape, tables })
    }

    pub fn shape(&self) -> WaveShape {
        self.shape
    }

    pub fn tables(&self) -> &[Wavetable] {
        &self.tables
    }

    /// Richest table whose partials stay below Nyquist at `increment`.
    #[inline]
    pub fn table_for_increment(&self, increment: f32) -> &Wavetable {
        // build() guarantees at least one table
        let last = self.tables.len() - 1;
        self.tables
            .iter()
            .find(|t| increment < t.max_increment)
            .unwrap_or(&self.tables[last])
    }

    pub fn table_for_hz(&self, hz: f32, sample_rate: f32) -> &Wavetable {
        self.table_for_increment(hz / sample_rate)
    }
}

fn remove_offset(mut samples: Vec<f32>) -> Vec<f32> {
    let (lo, hi) = samples
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    let offset = (hi + lo) * 0.5;
    for x in samples.iter_mut() {
        *x -= offset;
    }
    samples
}

fn naive_shape(shape: WaveShape) -> Option<Vec<f32>> {
    let n = TABLE_SIZE as f32;
    let samples = match shape {
        WaveShape::Square => (0..TABLE_SIZE)
            .map(|i| if i < TABLE_SIZE / 2 { -1.0 } else { 1.0 })
            .collect(),
        WaveShape::Saw => (0..TABLE_SIZE)
            .map(|i| -1.0 + 2.0 * i as f32 / n)
            .collect(),
        WaveShape::Triangle => (0..TABLE_SIZE)
            .map(|i| unipolar_shape(WaveShape::Triangle, i as f32 / n) * 2.0 - 1.0)
            .collect(),
        WaveShape::Sine | WaveShape::Noise => return None,
    };
    Some(samples)
}

/// Naive unipolar shapes at `phase` in [0, 1), as used by the LFO tables.
fn unipolar_shape(shape: WaveShape, phase: f32) -> f32 {
    match shape {
        WaveShape::Sine => bipolar_to_unipolar((TAU * phase).sin()),
        WaveShape::Square => {
            if phase < 0.5 {
                1.0
            } else {
                0.0
            }
        }
        WaveShape::Saw => phase,
        WaveShape::Triangle => {
            if phase < 0.5 {
                2.0 * phase
            } else {
                2.0 - 2.0 * phase
            }
        }
        WaveShape::Noise => 0.5,
    }
}

/// Every table the engine reads, built once and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct WavetableBank {
    sine: Wavetable,
    square: WavetableSet,
    saw: WavetableSet,
    triangle: WavetableSet,
    lfo: [Vec<f32>; 4],
}

impl WavetableBank {
    pub fn build() -> Result<Self, EngineError> {
        let mut planner = FftPlanner::new();
        let lfo_table = |shape| {
            (0..TABLE_SIZE)
                .map(|i| unipolar_shape(shape, i as f32 / TABLE_SIZE as f32))
                .collect::<Vec<f32>>()
        };

        Ok(Self {
            sine: Wavetable::sine(),
            square: WavetableSet::build(WaveShape::Square, &mut planner)?,
            saw: WavetableSet::build(WaveShape::Saw, &mut planner)?,
            triangle: WavetableSet::build(WaveShape::Triangle, &mut planner)?,
            lfo: [
                lfo_table(WaveShape::Sine),
                lfo_table(WaveShape::Square),
                lfo_table(WaveShape::Saw),
                lfo_table(WaveShape::Triangle),
            ],
        })
    }

    pub fn sine(&self) -> &Wavetable {
        &self.sine
    }

    /// The band-limited set for a shape. Sine and noise have none.
    pub fn set(&self, shape: WaveShape) -> Option<&WavetableSet> {
        match shape {
            WaveShape::Square => Some(&self.square),
            WaveShape::Saw => Some(&self.saw),
            WaveShape::Triangle => Some(&self.triangle),
            WaveShape::Sine | WaveShape::Noise => None,
        }
    }

    /// Unipolar 0..1 LFO value. Noise has no table and reads 0.5.
    #[inline]
    pub fn lfo_sample(&self, shape: WaveShape, phase: f32) -> f32 {
        let table = match shape {
            WaveShape::Sine => &self.lfo[0],
            WaveShape::Square => &self.lfo[1],
            WaveShape::Saw => &self.lfo[2],
            WaveShape::Triangle => &self.lfo[3],
            WaveShape::Noise => return 0.5,
        };
        if shape == WaveShape::Square {
            // hard edges; interpolation would smear the step
            let index = (phase.rem_euclid(1.0) * TABLE_SIZE as f32) as usize;
            return table[index.min(TABLE_SIZE - 1)];
        }
        read_interpolated(table, phase)
    }
}
