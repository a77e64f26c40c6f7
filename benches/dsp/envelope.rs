//! Benchmarks for DAHDSR envelope tables and per-voice readers.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use hexfm::dsp::envelope::{EnvelopeParams, EnvelopeTables, VoiceEnvelope};

use crate::BLOCK_SIZES;

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");
    let sr = 48_000.0;
    let tables = EnvelopeTables::build(EnvelopeParams::dahdsr(0.0, 100.0, 0.0, 100.0, 0.7, 300.0), sr)
        .expect("envelope tables");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Attack phase (table read)
        let mut env = VoiceEnvelope::new();
        env.trigger_on(1.0, 1.0);
        group.bench_with_input(BenchmarkId::new("attack", size), &size, |b, _| {
            b.iter(|| {
                for out in buffer.iter_mut() {
                    *out = env.process(black_box(1.0), &tables);
                }
            })
        });

        // Sustain phase (constant)
        let mut env = VoiceEnvelope::new();
        env.trigger_on(1.0, 1.0);
        for _ in 0..20_000 {
            env.process(1.0, &tables);
        }
        group.bench_with_input(BenchmarkId::new("sustain", size), &size, |b, _| {
            b.iter(|| {
                for out in buffer.iter_mut() {
                    *out = env.process(black_box(1.0), &tables);
                }
            })
        });
    }

    // Control-side cost of one curve set at the longest times
    let long = EnvelopeParams::dahdsr(0.0, 4000.0, 0.0, 4000.0, 0.5, 4000.0);
    group.bench_function("build_tables_4s", |b| {
        b.iter(|| EnvelopeTables::build(black_box(long), sr))
    });

    group.finish();
}
