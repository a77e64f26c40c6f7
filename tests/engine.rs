use hexfm::dsp::envelope::{EnvelopeParams, MIN_LEVEL};
use hexfm::dsp::oscillator::WaveShape;
use hexfm::synth::{CurveSlot, VoiceState, OUTPUT_LIMIT};
use hexfm::{EngineError, ScopeFrame, Synth, SynthConfig, SynthHandle, TelemetryReader};

const BLOCK: usize = 256;

fn engine(config: SynthConfig) -> (Synth, SynthHandle, TelemetryReader) {
    Synth::new(config).expect("valid config")
}

fn render(synth: &mut Synth, len: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0; len];
    let mut right = vec![0.0; len];
    synth.render_block(&mut left, &mut right, 0, len);
    (left, right)
}

fn render_ms(synth: &mut Synth, ms: f32) -> Vec<f32> {
    let total = (synth.ctx().sample_rate * ms / 1000.0) as usize;
    let mut out = Vec::with_capacity(total);
    let mut done = 0;
    while done < total {
        let len = BLOCK.min(total - done);
        let (left, _) = render(synth, len);
        out.extend(left);
        done += len;
    }
    out
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

#[test]
fn note_sounds_then_releases_to_silence() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    handle.set_audible(0, true).unwrap();
    handle.note_on(0, 69, 1.0).unwrap();

    let held = render_ms(&mut synth, 100.0);
    assert!(peak(&held) > 0.1, "peak {}", peak(&held));
    assert_eq!(synth.active_voice_count(), 1);

    handle.note_off(0, 69, 0.0, true).unwrap();
    let tail = render_ms(&mut synth, 20.0);
    assert!(peak(&tail) > 0.0);
    assert_eq!(synth.voice(0).unwrap().state(), VoiceState::Releasing);

    render_ms(&mut synth, 300.0);
    assert_eq!(synth.active_voice_count(), 0);
    let after = render_ms(&mut synth, 10.0);
    assert!(after.iter().all(|&s| s == 0.0));
}

#[test]
fn short_attack_peaks_on_time_and_release_reaches_the_floor() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default().with_polyphony(1));
    let params = EnvelopeParams::dahdsr(0.0, 10.0, 0.0, 0.0, 1.0, 50.0);
    for slot in CurveSlot::all() {
        handle.set_envelope_params(slot, params);
    }
    handle.set_wave(0, WaveShape::Sine).unwrap();
    handle.set_audible(0, true).unwrap();
    handle.commit().unwrap();
    handle.note_on(0, 69, 1.0).unwrap();

    // 10 ms at 44.1 kHz
    render(&mut synth, 441);
    let level = synth.voice(0).unwrap().operator(0).unwrap().envelope().last_level();
    assert!(level > 0.99, "level after attack {level}");

    let held = render_ms(&mut synth, 20.0);
    assert!(peak(&held) > 0.1);

    handle.note_off(0, 69, 0.0, true).unwrap();
    // 50 ms at 44.1 kHz
    render(&mut synth, 2205);
    let level = synth.voice(0).unwrap().operator(0).unwrap().envelope().last_level();
    assert!(level <= MIN_LEVEL * 1.01, "level after release {level}");

    render_ms(&mut synth, 5.0);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn hard_stop_silences_within_kill_fade() {
    let config = SynthConfig::default();
    let fade_ms = config.kill_fade_ms;
    let (mut synth, mut handle, _) = engine(config);
    handle.set_audible(0, true).unwrap();
    handle.note_on(0, 60, 1.0).unwrap();
    render_ms(&mut synth, 60.0);

    handle.note_off(0, 60, 0.0, false).unwrap();
    render_ms(&mut synth, fade_ms + 2.0);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn feedback_loop_stays_finite() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default().with_polyphony(2));
    for op in 0..2 {
        handle.set_audible(op, true).unwrap();
        handle.set_mod_index(op, 450.0).unwrap();
    }
    handle.set_routing(0, 1, true);
    handle.set_routing(1, 0, true);
    handle.set_resonance(35.0).unwrap();
    handle.note_on(0, 36, 1.0).unwrap();
    handle.note_on(0, 96, 1.0).unwrap();

    let bound = OUTPUT_LIMIT * 2.0;
    for _ in 0..10_000 {
        let (left, right) = render(&mut synth, 32);
        for s in left.iter().chain(&right) {
            assert!(s.is_finite());
            assert!(s.abs() <= bound);
        }
    }
}

#[test]
fn steal_pressure_never_exceeds_pool() {
    let (mut synth, mut handle, reader) = engine(SynthConfig::default().with_polyphony(4));
    handle.set_audible(0, true).unwrap();

    for i in 0..32u8 {
        handle.note_on(0, 40 + i, 0.8).unwrap();
        if i % 3 == 0 {
            handle.note_off(0, 40 + i, 0.0, true).unwrap();
        }
        render(&mut synth, 64);
        assert!(synth.active_voice_count() <= 4);
    }
    assert!(reader.voices_stolen() > 0);

    for i in 0..32u8 {
        handle.note_off(0, 40 + i, 0.0, true).unwrap();
    }
    render_ms(&mut synth, 400.0);
    assert_eq!(synth.active_voice_count(), 0);
    assert!(synth.voices().iter().all(|v| v.pending().is_none()));
}

#[test]
fn parameters_reach_the_audio_side_after_one_block() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    handle.set_cutoff(1234.0).unwrap();
    handle.set_resonance(100.0).unwrap();
    handle.set_wave(3, WaveShape::Saw).unwrap();
    handle.set_velocity_tracking(0.25).unwrap();
    assert_ne!(synth.cutoff(), 1234.0);

    render(&mut synth, 1);
    assert_eq!(synth.cutoff(), 1234.0);
    assert_eq!(synth.resonance(), 35.0);
    assert_eq!(synth.wave(3), Some(WaveShape::Saw));
    assert_eq!(synth.velocity_tracking(), 0.25);
}

#[test]
fn routed_modulator_bends_carrier_frequency() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default().with_polyphony(1));
    handle.set_audible(0, true).unwrap();
    handle.set_mod_index(0, 100.0).unwrap();
    handle.set_routing(1, 0, true);
    handle.note_on(0, 60, 1.0).unwrap();
    render(&mut synth, 2048);

    let base = synth.voice(0).unwrap().fundamental();
    let mut deviation = 0.0f32;
    for _ in 0..64 {
        render(&mut synth, 7);
        let hz = synth.voice(0).unwrap().operator(0).unwrap().last_frequency();
        deviation = deviation.max((hz - base).abs());
    }
    assert!(deviation > 1.0, "deviation {deviation}");

    // unrouted operators play the plain fundamental times ratio
    let op2 = synth.voice(0).unwrap().operator(2).unwrap().last_frequency();
    assert_eq!(op2, base);
}

#[test]
fn commit_publishes_tables_and_returns_old_ones() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    handle.set_operator_attack(0, 5.0);
    handle.set_filter_release(250.0);
    assert!(handle.has_pending_changes());
    assert_eq!(handle.commit().unwrap(), 2);
    assert!(!handle.has_pending_changes());

    render(&mut synth, 1);
    assert_eq!(synth.curves().operator(0).params().attack_ms, 5.0);
    assert_eq!(synth.curves().filter().params().release_ms, 250.0);
    assert_eq!(handle.collect_garbage(), 2);
}

#[test]
fn failed_build_keeps_last_good_curves() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    handle.set_operator_decay(2, 90.0);
    handle.commit().unwrap();
    render(&mut synth, 1);

    handle.set_operator_decay(2, f32::NAN);
    assert_eq!(handle.commit().unwrap(), 0);
    assert_eq!(handle.envelope(CurveSlot::Operator(2)).unwrap().decay_ms, 90.0);

    render(&mut synth, 1);
    assert_eq!(synth.curves().operator(2).params().decay_ms, 90.0);
}

#[test]
fn full_message_queue_reports_instead_of_blocking() {
    let config = SynthConfig {
        message_capacity: 4,
        ..SynthConfig::default()
    };
    let (mut synth, mut handle, _) = engine(config);
    for note in 0..4 {
        handle.note_on(0, 60 + note, 1.0).unwrap();
    }
    assert!(matches!(handle.note_on(0, 70, 1.0), Err(EngineError::QueueFull)));

    render(&mut synth, 1);
    assert_eq!(synth.active_voice_count(), 4);
    handle.note_on(0, 70, 1.0).unwrap();
}

#[test]
fn full_table_queue_keeps_changes_pending() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    let dirty_all = |handle: &mut SynthHandle, ms: f32| {
        for slot in CurveSlot::all() {
            handle.set_envelope(slot, hexfm::dsp::envelope::EnvelopeStage::Attack, ms);
        }
    };

    dirty_all(&mut handle, 10.0);
    assert_eq!(handle.commit().unwrap(), CurveSlot::COUNT);
    dirty_all(&mut handle, 11.0);
    assert_eq!(handle.commit().unwrap(), CurveSlot::COUNT);
    dirty_all(&mut handle, 12.0);
    assert!(matches!(handle.commit(), Err(EngineError::QueueFull)));
    assert!(handle.has_pending_changes());

    render(&mut synth, 1);
    assert_eq!(handle.commit().unwrap(), CurveSlot::COUNT);
    render(&mut synth, 1);
    assert_eq!(synth.curves().filter().params().attack_ms, 12.0);
}

#[test]
fn sample_rate_change_rebuilds_every_curve_set() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    synth.set_sample_rate(48_000.0, 512);
    assert!(!synth.curves().is_stale(48_000.0));

    assert_eq!(handle.commit().unwrap(), CurveSlot::COUNT);
    render(&mut synth, 1);
    assert!(!synth.curves().is_stale(48_000.0));
}

#[test]
fn scope_mirrors_last_triggered_voice() {
    let (mut synth, mut handle, mut reader) = engine(SynthConfig::default());
    handle.set_audible(0, true).unwrap();
    handle.note_on(0, 57, 1.0).unwrap();
    let (left, right) = render(&mut synth, BLOCK);

    let mut frames = Vec::new();
    assert_eq!(reader.drain_scope(&mut frames), BLOCK);
    let expected: Vec<ScopeFrame> = left
        .iter()
        .zip(&right)
        .map(|(&left, &right)| ScopeFrame { left, right })
        .collect();
    assert_eq!(frames, expected);
    assert_eq!(reader.drain_scope(&mut frames), 0);
}

#[test]
fn snapshot_tracks_voices() {
    let (mut synth, mut handle, reader) = engine(SynthConfig::default().with_polyphony(3));
    handle.note_on(0, 69, 1.0).unwrap();
    handle.note_on(0, 81, 1.0).unwrap();
    render(&mut synth, BLOCK);

    let snapshot = reader.snapshot();
    assert_eq!(snapshot.voices.len(), 3);
    assert_eq!(snapshot.voices_in_use, 2);
    assert_eq!(snapshot.last_triggered_voice, 1);
    assert!((snapshot.voices[0].fundamental - 440.0).abs() < 1e-3);
    assert!((snapshot.voices[1].fundamental - 880.0).abs() < 1e-2);
    assert!(snapshot.voices[0].operator_levels[0] > 0.0);
}

#[test]
fn same_seed_renders_identical_noise() {
    let noisy = |seed: u64| {
        let (mut synth, mut handle, _) = engine(SynthConfig::default().with_noise_seed(seed));
        handle.set_audible(0, true).unwrap();
        handle.set_wave(0, WaveShape::Noise).unwrap();
        handle.note_on(0, 60, 1.0).unwrap();
        render_ms(&mut synth, 30.0)
    };

    assert_eq!(noisy(7), noisy(7));
    assert_ne!(noisy(7), noisy(8));
}

#[test]
fn shorter_tables_swapped_mid_phase_finish_the_phase() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default().with_polyphony(1));
    handle.set_audible(0, true).unwrap();
    handle.set_operator_decay(0, 2000.0);
    handle.set_operator_release(0, 2000.0);
    handle.commit().unwrap();
    handle.note_on(0, 60, 1.0).unwrap();
    render_ms(&mut synth, 500.0);
    handle.note_off(0, 60, 0.0, true).unwrap();
    render_ms(&mut synth, 100.0);

    // the voice sits far into a long release; swap in a 1 ms one
    handle.set_operator_release(0, 1.0);
    handle.commit().unwrap();
    let out = render_ms(&mut synth, 200.0);
    assert!(out.iter().all(|s| s.is_finite()));
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn handle_rate_change_rebuilds_on_commit() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    handle.set_sample_rate(48_000.0);
    assert_eq!(handle.sample_rate(), 48_000.0);
    assert_eq!(handle.commit().unwrap(), CurveSlot::COUNT);

    synth.set_sample_rate(48_000.0, 512);
    render(&mut synth, 1);
    assert!(!synth.curves().is_stale(48_000.0));
    assert_eq!(handle.commit().unwrap(), 0);
}

#[test]
fn handle_rate_ahead_of_audio_settles_on_audio_rate() {
    let (mut synth, mut handle, _) = engine(SynthConfig::default());
    handle.set_sample_rate(48_000.0);
    assert_eq!(handle.commit().unwrap(), CurveSlot::COUNT);

    // the stream never moved; the 48 kHz tables land stale
    render(&mut synth, 1);
    assert_eq!(handle.commit().unwrap(), CurveSlot::COUNT);
    assert_eq!(handle.sample_rate(), 44_100.0);

    render(&mut synth, 1);
    assert!(!synth.curves().is_stale(44_100.0));
    assert_eq!(handle.commit().unwrap(), 0);
    render(&mut synth, 1);
    assert_eq!(handle.commit().unwrap(), 0);
}

#[test]
fn control_halves_move_across_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Synth>();
    assert_send::<SynthHandle>();
    assert_send::<TelemetryReader>();
}
