//! Benchmarks for the stereo state-variable filter.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use hexfm::dsp::filter::{FilterType, StereoFilter};
use hexfm::RenderCtx;

use crate::BLOCK_SIZES;

pub fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/filter");
    let ctx = RenderCtx::new(48_000.0, 512);

    for &size in BLOCK_SIZES {
        // sawtooth-like ramp
        let input: Vec<f32> = (0..size)
            .map(|i| (i as f32 / size as f32) * 2.0 - 1.0)
            .collect();

        for (name, filter_type) in [
            ("lowpass", FilterType::LowPass),
            ("highpass", FilterType::HighPass),
            ("bandpass", FilterType::BandPass),
        ] {
            let mut filter = StereoFilter::new(&ctx);
            filter.set_type(filter_type);
            filter.set_cutoff(1000.0);
            filter.set_resonance(4.0);
            let mut buffer = input.clone();
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    for (out, &x) in buffer.iter_mut().zip(&input) {
                        let (left, _) = filter.process(black_box(x), x, 0.0);
                        *out = left;
                    }
                })
            });
        }

        // Cutoff recomputed every sample
        let mut filter = StereoFilter::new(&ctx);
        filter.set_cutoff(400.0);
        filter.set_resonance(8.0);
        let mut buffer = input.clone();
        group.bench_with_input(BenchmarkId::new("lowpass_modulated", size), &size, |b, _| {
            b.iter(|| {
                for (i, (out, &x)) in buffer.iter_mut().zip(&input).enumerate() {
                    let depth = i as f32 / size as f32;
                    let (left, _) = filter.process(black_box(x), x, depth);
                    *out = left;
                }
            })
        });
    }

    group.finish();
}
