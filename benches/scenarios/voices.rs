//! Benchmarks for full synth blocks.
//!
//! Each case holds notes on every voice so the whole pool renders.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use hexfm::dsp::oscillator::WaveShape;
use hexfm::{Synth, SynthConfig};

use crate::BLOCK_SIZES;

fn held_synth(polyphony: usize, routed: bool) -> Synth {
    let config = SynthConfig::default()
        .with_sample_rate(48_000.0)
        .with_polyphony(polyphony);
    let (mut synth, _handle, _telemetry) = Synth::new(config).expect("synth");

    for op in 0..6 {
        synth.set_audible(op, op % 2 == 0);
        synth.set_wave(op, WaveShape::ALL[op % 4]);
    }
    if routed {
        // three carrier/modulator pairs plus feedback on the last
        for (src, dst) in [(1, 0), (3, 2), (5, 4), (5, 5)] {
            synth.set_routing(src, dst, true);
            synth.set_mod_index(dst, 3.0);
        }
    }
    for v in 0..polyphony {
        synth.note_on(0, 36 + v as u8 * 3, 0.8);
    }
    synth
}

pub fn bench_voices(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/voices");

    for &size in BLOCK_SIZES {
        let mut left = vec![0.0f32; size];
        let mut right = vec![0.0f32; size];

        for (name, polyphony, routed) in [
            ("single", 1, false),
            ("single_routed", 1, true),
            ("pool_18", 18, false),
            ("pool_18_routed", 18, true),
        ] {
            let mut synth = held_synth(polyphony, routed);
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    left.fill(0.0);
                    right.fill(0.0);
                    synth.render_block(black_box(&mut left), black_box(&mut right), 0, size);
                })
            });
        }
    }

    group.finish();
}
