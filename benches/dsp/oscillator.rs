//! Benchmarks for wavetable oscillator reads.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion};
use hexfm::dsp::oscillator::{Oscillator, WaveShape};
use hexfm::dsp::wavetable::WavetableBank;
use hexfm::RenderCtx;

use crate::BLOCK_SIZES;

pub fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/oscillator");
    let ctx = RenderCtx::new(48_000.0, 512);
    let bank = Arc::new(WavetableBank::build().expect("wavetable bank"));

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        for shape in WaveShape::ALL {
            let mut osc = Oscillator::with_seed(bank.clone(), 1);
            osc.set_shape(shape);
            let name = format!("{shape:?}").to_lowercase();
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    for out in buffer.iter_mut() {
                        *out = osc.sample(black_box(440.0), &ctx);
                    }
                    black_box(&buffer);
                })
            });
        }

        // Table selection changes every sample under deep FM
        let mut osc = Oscillator::with_seed(bank.clone(), 1);
        osc.set_shape(WaveShape::Saw);
        let mut phase = 0.0f32;
        group.bench_with_input(BenchmarkId::new("saw_swept", size), &size, |b, _| {
            b.iter(|| {
                for out in buffer.iter_mut() {
                    phase = (phase + 0.01) % std::f32::consts::TAU;
                    *out = osc.sample(440.0 + 400.0 * phase.sin(), &ctx);
                }
                black_box(&buffer);
            })
        });
    }

    group.finish();
}
