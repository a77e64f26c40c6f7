//! Demo patch, audio stream and control loop

use std::time::{Duration, Instant};

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use hexfm::dsp::envelope::EnvelopeParams;
use hexfm::dsp::filter::FilterType;
use hexfm::dsp::lfo::LfoTarget;
use hexfm::dsp::oscillator::WaveShape;
use hexfm::synth::CurveSlot;
use hexfm::{EngineError, Synth, SynthConfig, SynthHandle, MAX_BLOCK_SIZE, MAX_SAMPLE_RATE};

/// Arpeggio player builder
pub struct Demo {
    bpm: f64,
    notes: Vec<u8>,
    bars: usize,
}

impl Demo {
    pub fn new() -> Self {
        Self {
            bpm: 120.0,
            notes: vec![60, 64, 67, 72],
            bars: 2,
        }
    }

    /// Tempo in beats per minute; each note is a sixteenth.
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    pub fn notes(mut self, notes: &[u8]) -> Self {
        self.notes = notes.to_vec();
        self
    }

    pub fn bars(mut self, bars: usize) -> Self {
        self.bars = bars;
        self
    }

    /// Opens the stream and plays until the pattern ends
    pub fn run(self) -> EyreResult<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        if sample_rate > MAX_SAMPLE_RATE {
            return Err(eyre!("device rate {sample_rate} Hz is above {MAX_SAMPLE_RATE} Hz"));
        }
        info!(sample_rate, channels, "opened output device");

        let engine_config = SynthConfig::default()
            .with_sample_rate(sample_rate)
            .with_block_size(MAX_BLOCK_SIZE);
        let (mut synth, mut handle, mut telemetry) =
            Synth::new(engine_config).wrap_err("failed to build synth engine")?;

        load_patch(&mut handle).wrap_err("failed to load demo patch")?;

        let mut left = vec![0.0f32; MAX_BLOCK_SIZE];
        let mut right = vec![0.0f32; MAX_BLOCK_SIZE];

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                let total_frames = data.len() / channels;
                let mut frames_written = 0;

                while frames_written < total_frames {
                    let frames = (total_frames - frames_written).min(MAX_BLOCK_SIZE);
                    let (l, r) = (&mut left[..frames], &mut right[..frames]);
                    l.fill(0.0);
                    r.fill(0.0);
                    synth.render_block(l, r, 0, frames);

                    let out_off = frames_written * channels;
                    for i in 0..frames {
                        let frame = &mut data[out_off + i * channels..out_off + (i + 1) * channels];
                        for (ch, out) in frame.iter_mut().enumerate() {
                            *out = if ch % 2 == 0 { l[i] } else { r[i] };
                        }
                    }
                    frames_written += frames;
                }
            },
            |err| eprintln!("Audio error: {}", err),
            None,
        )?;

        stream.play()?;

        let step = Duration::from_secs_f64(60.0 / self.bpm / 4.0);
        let steps = self.notes.len() * self.bars;
        let mut scope = Vec::with_capacity(8192);
        let started = Instant::now();

        for i in 0..steps {
            let note = self.notes[i % self.notes.len()];
            let velocity = if i % 4 == 0 { 1.0 } else { 0.7 };
            handle.note_on(0, note, velocity)?;

            // slowly open the filter over the whole pattern
            let progress = i as f32 / steps.max(1) as f32;
            handle.set_cutoff(400.0 + 3600.0 * progress)?;

            std::thread::sleep(step.mul_f64(0.8));
            handle.note_off(0, note, 0.0, true)?;
            std::thread::sleep(step.mul_f64(0.2));

            if let Err(error) = handle.commit() {
                warn!(%error, "curve commit deferred");
            }
            handle.collect_garbage();

            let frames = telemetry.drain_scope(&mut scope);
            let peak = scope
                .iter()
                .fold(0.0f32, |acc, f| acc.max(f.left.abs()).max(f.right.abs()));
            scope.clear();
            info!(
                step = i,
                note,
                voices = telemetry.voices_in_use(),
                stolen = telemetry.voices_stolen(),
                frames,
                peak,
                "tick"
            );
        }

        handle.all_notes_off(true)?;
        std::thread::sleep(Duration::from_millis(800));
        info!(elapsed = ?started.elapsed(), "done");
        Ok(())
    }
}

impl Default for Demo {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-operator bell over a detuned square, through a resonant low-pass.
fn load_patch(handle: &mut SynthHandle) -> Result<(), EngineError> {
    handle.set_audible(0, true)?;
    handle.set_audible(2, true)?;
    handle.set_level(2, 0.35)?;
    handle.set_wave(2, WaveShape::Square)?;
    handle.set_ratio(2, 0.5)?;

    handle.set_ratio(1, 3.5)?;
    handle.set_mod_index(1, 2.5)?;
    handle.set_routing(1, 0, true);

    handle.set_filter_type(FilterType::LowPass)?;
    handle.set_resonance(4.0)?;
    handle.set_filter_env_depth(0.6)?;
    handle.set_wet_dry(1.0)?;

    handle.set_lfo_target(0, LfoTarget::OperatorLevel(2))?;
    handle.set_lfo_rate(0, 5.0)?;
    handle.set_lfo_depth(0, 0.3)?;
    handle.set_lfo_wave(0, WaveShape::Triangle)?;

    handle.set_envelope_params(CurveSlot::Operator(0), EnvelopeParams::dahdsr(0.0, 5.0, 0.0, 250.0, 0.4, 300.0));
    handle.set_envelope_params(CurveSlot::Operator(1), EnvelopeParams::dahdsr(0.0, 1.0, 0.0, 120.0, 0.1, 200.0));
    handle.set_envelope_params(CurveSlot::Operator(2), EnvelopeParams::dahdsr(0.0, 10.0, 0.0, 400.0, 0.5, 250.0));
    handle.set_envelope_params(CurveSlot::Filter, EnvelopeParams::dahdsr(0.0, 2.0, 0.0, 180.0, 0.2, 200.0));
    handle.commit()?;
    Ok(())
}
