use std::sync::Arc;

use crate::dsp::context::{midi_note_to_freq, RenderCtx};
use crate::dsp::envelope::{DEFAULT_KILL_FADE_MS, DEFAULT_RETRIG_MS};
use crate::dsp::filter::StereoFilter;
use crate::dsp::lfo::{Lfo, LfoTarget};
use crate::dsp::wavetable::WavetableBank;
use crate::synth::curves::CurveBank;
use crate::synth::message::ParamChange;
use crate::synth::operator::FmOperator;
use crate::synth::routing::RoutingGrid;
use crate::synth::telemetry::Telemetry;
use crate::{LFO_COUNT, MAX_BLOCK_SIZE, OPERATOR_COUNT};

/// Voice output is clamped to this magnitude.
pub const OUTPUT_LIMIT: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,      // Available for allocation
    Active,    // Note held
    Releasing, // Key released, envelopes in release
    Stealing,  // Fading out for a parked note
}

/// Note timing shared by every voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub retrig_ms: f32,
    pub kill_fade_ms: f32,
    pub velocity_tracking: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            retrig_ms: DEFAULT_RETRIG_MS,
            kill_fade_ms: DEFAULT_KILL_FADE_MS,
            velocity_tracking: 1.0,
        }
    }
}

/// Everything a voice reads but does not own while rendering a block.
pub struct RenderFrame<'a> {
    pub ctx: &'a RenderCtx,
    pub curves: &'a CurveBank,
    pub routing: RoutingGrid,
    pub settings: &'a VoiceSettings,
    pub telemetry: &'a Telemetry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingNote {
    pub channel: u8,
    pub note: u8,
    pub velocity: f32,
    pub age: u64,
}

/// One polyphonic voice: six operators, four LFOs and a stereo filter.
#[derive(Debug, Clone)]
pub struct Voice {
    index: usize,
    operators: [FmOperator; OPERATOR_COUNT],
    lfos: [Lfo; LFO_COUNT],
    filter: StereoFilter,
    fundamental: f32,
    note: u8,
    channel: u8,
    velocity: f32,
    age: u64,
    state: VoiceState,
    pending: Option<PendingNote>,
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
    block_len: usize,
}

impl Voice {
    pub fn new(
        index: usize,
        bank: &Arc<WavetableBank>,
        ctx: &RenderCtx,
        settings: &VoiceSettings,
        seed: u64,
    ) -> Self {
        let mut voice = Self {
            index,
            operators: std::array::from_fn(|i| {
                FmOperator::new(i, bank.clone(), seed.wrapping_add(i as u64))
            }),
            lfos: std::array::from_fn(|i| {
                Lfo::new(bank.clone(), seed.wrapping_add((OPERATOR_COUNT + i) as u64))
            }),
            filter: StereoFilter::new(ctx),
            fundamental: 0.0,
            note: 0,
            channel: 0,
            velocity: 0.0,
            age: 0,
            state: VoiceState::Free,
            pending: None,
            scratch_left: vec![0.0; MAX_BLOCK_SIZE],
            scratch_right: vec![0.0; MAX_BLOCK_SIZE],
            block_len: 0,
        };
        voice.set_sample_rate(ctx, settings);
        voice
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Free
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn fundamental(&self) -> f32 {
        self.fundamental
    }

    pub fn pending(&self) -> Option<&PendingNote> {
        self.pending.as_ref()
    }

    pub fn operator(&self, op: usize) -> Option<&FmOperator> {
        self.operators.get(op)
    }

    pub fn operator_mut(&mut self, op: usize) -> Option<&mut FmOperator> {
        self.operators.get_mut(op)
    }

    pub fn lfo(&self, lfo: usize) -> Option<&Lfo> {
        self.lfos.get(lfo)
    }

    pub fn filter(&self) -> &StereoFilter {
        &self.filter
    }

    /// Sounding this note on this channel, and not already being stolen.
    pub fn is_playing(&self, channel: u8, note: u8) -> bool {
        matches!(self.state, VoiceState::Active | VoiceState::Releasing)
            && self.channel == channel
            && self.note == note
    }

    pub fn any_envelope_active(&self) -> bool {
        self.filter.envelope().is_active()
            || self.operators.iter().any(|op| op.envelope().is_active())
    }

    /// The last rendered block, for the scope.
    pub fn last_block(&self) -> (&[f32], &[f32]) {
        (
            &self.scratch_left[..self.block_len],
            &self.scratch_right[..self.block_len],
        )
    }

    /// Host sample rate changed. Filters reset; fades re-derive.
    pub fn set_sample_rate(&mut self, ctx: &RenderCtx, settings: &VoiceSettings) {
        self.filter.set_sample_rate(ctx);
        self.filter.envelope_mut().set_retrig(settings.retrig_ms, ctx);
        for op in self.operators.iter_mut() {
            op.envelope_mut().set_retrig(settings.retrig_ms, ctx);
        }
    }

    pub fn start_note(
        &mut self,
        note: u8,
        velocity: f32,
        channel: u8,
        age: u64,
        settings: &VoiceSettings,
    ) {
        self.note = note;
        self.channel = channel;
        self.velocity = velocity;
        self.age = age;
        self.fundamental = midi_note_to_freq(note);
        self.pending = None;

        for op in self.operators.iter_mut() {
            op.envelope_mut()
                .trigger_on(velocity, settings.velocity_tracking);
        }
        self.filter
            .envelope_mut()
            .trigger_on(velocity, settings.velocity_tracking);
        for lfo in self.lfos.iter_mut() {
            lfo.note_on();
        }
        self.state = VoiceState::Active;
    }

    pub fn stop_note(&mut self, allow_tail_off: bool, settings: &VoiceSettings, ctx: &RenderCtx) {
        match self.state {
            VoiceState::Active => {
                for op in self.operators.iter_mut() {
                    op.envelope_mut().trigger_off();
                }
                self.filter.envelope_mut().trigger_off();
                self.state = VoiceState::Releasing;
                if !allow_tail_off {
                    self.kill_quick(settings, ctx);
                }
            }
            VoiceState::Releasing if !allow_tail_off => self.kill_quick(settings, ctx),
            VoiceState::Stealing => self.pending = None,
            _ => {}
        }
    }

    /// Fades every envelope to the floor over the configured kill time.
    pub fn kill_quick(&mut self, settings: &VoiceSettings, ctx: &RenderCtx) {
        for op in self.operators.iter_mut() {
            op.envelope_mut().kill_quick(settings.kill_fade_ms, ctx);
        }
        self.filter
            .envelope_mut()
            .kill_quick(settings.kill_fade_ms, ctx);
    }

    /// Kills the current note and parks `pending` to start once silent.
    pub fn steal(&mut self, pending: PendingNote, settings: &VoiceSettings, ctx: &RenderCtx) {
        self.kill_quick(settings, ctx);
        self.pending = Some(pending);
        self.state = VoiceState::Stealing;
    }

    /// Drops a parked note. Returns whether there was one.
    pub fn cancel_pending(&mut self, channel: u8, note: u8) -> bool {
        match self.pending {
            Some(p) if p.channel == channel && p.note == note => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.state = VoiceState::Free;
        self.pending = None;
        self.filter.reset();
    }

    pub fn apply(&mut self, change: &ParamChange) {
        match *change {
            ParamChange::Ratio { op, value } => self.with_op(op, |o| o.set_ratio(value)),
            ParamChange::ModIndex { op, value } => self.with_op(op, |o| o.set_mod_index(value)),
            ParamChange::Pan { op, value } => self.with_op(op, |o| o.set_pan(value)),
            ParamChange::Level { op, value } => self.with_op(op, |o| o.set_level(value)),
            ParamChange::Audible { op, value } => self.with_op(op, |o| o.set_audible(value)),
            ParamChange::Wave { op, shape } => self.with_op(op, |o| o.set_shape(shape)),
            ParamChange::Cutoff(hz) => self.filter.set_cutoff(hz),
            ParamChange::Resonance(q) => self.filter.set_resonance(q),
            ParamChange::WetDry(wet) => self.filter.set_wet_level(wet),
            ParamChange::FilterEnvDepth(depth) => self.filter.set_env_depth(depth),
            ParamChange::FilterType(filter_type) => self.filter.set_type(filter_type),
            ParamChange::LfoRate { lfo, value } => self.with_lfo(lfo, |l| l.set_rate(value)),
            ParamChange::LfoDepth { lfo, value } => self.with_lfo(lfo, |l| l.set_depth(value)),
            ParamChange::LfoSync { lfo, value } => self.with_lfo(lfo, |l| l.set_sync(value)),
            ParamChange::LfoWave { lfo, shape } => self.with_lfo(lfo, |l| l.set_shape(shape)),
            ParamChange::LfoTarget { lfo, target } => self.with_lfo(lfo, |l| l.set_target(target)),
            // held by the synth, read at note-on
            ParamChange::VelocityTracking(_) => {}
        }
    }

    fn with_op(&mut self, op: usize, f: impl FnOnce(&mut FmOperator)) {
        if let Some(op) = self.operators.get_mut(op) {
            f(op);
        }
    }

    fn with_lfo(&mut self, lfo: usize, f: impl FnOnce(&mut Lfo)) {
        if let Some(lfo) = self.lfos.get_mut(lfo) {
            f(lfo);
        }
    }

    /// Renders `len` samples and adds them into `left`/`right` at `start`.
    pub fn render(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        start: usize,
        len: usize,
        frame: &RenderFrame,
    ) {
        let end = (start + len).min(left.len()).min(right.len());
        let len = end.saturating_sub(start).min(MAX_BLOCK_SIZE);
        self.block_len = len;
        if len == 0 {
            return;
        }

        let ctx = frame.ctx;
        for i in 0..len {
            if self.state == VoiceState::Stealing && !self.any_envelope_active() {
                match self.pending.take() {
                    Some(p) => {
                        self.start_note(p.note, p.velocity, p.channel, p.age, frame.settings);
                        frame.telemetry.set_fundamental(self.index, self.fundamental);
                    }
                    None => self.clear(),
                }
            }
            if self.state == VoiceState::Free {
                self.scratch_left[i] = 0.0;
                self.scratch_right[i] = 0.0;
                continue;
            }

            for op in self.operators.iter_mut() {
                op.clear_offset();
            }
            frame.routing.apply(&mut self.operators);

            self.filter.tick(frame.curves.filter());

            let mut level_mod = [0.0f32; OPERATOR_COUNT];
            let mut cutoff_mod = 0.0f32;
            for lfo in self.lfos.iter_mut() {
                let value = lfo.modulation(ctx);
                match lfo.target() {
                    LfoTarget::None => {}
                    LfoTarget::OperatorLevel(op) => {
                        if let Some(m) = level_mod.get_mut(op) {
                            *m = (*m + value).min(1.0);
                        }
                    }
                    LfoTarget::FilterCutoff => cutoff_mod += value,
                }
            }

            let mut sum_left = 0.0;
            let mut sum_right = 0.0;
            for (op, level) in self.operators.iter_mut().zip(level_mod) {
                op.tick_with_level_mod(self.fundamental, level, frame.curves.operator(op.index()), ctx);
                if op.is_audible() {
                    sum_left += op.last_left();
                    sum_right += op.last_right();
                }
            }

            let (out_left, out_right) = self.filter.process(sum_left, sum_right, cutoff_mod);
            self.scratch_left[i] = bounded(out_left);
            self.scratch_right[i] = bounded(out_right);
        }

        for (o, v) in left[start..end].iter_mut().zip(&self.scratch_left[..len]) {
            *o += v;
        }
        for (o, v) in right[start..end].iter_mut().zip(&self.scratch_right[..len]) {
            *o += v;
        }

        if self.state != VoiceState::Free {
            let levels = std::array::from_fn(|op| self.operators[op].envelope().last_level());
            frame
                .telemetry
                .publish_voice(self.index, levels, self.filter.envelope().last_level());
        }

        if matches!(self.state, VoiceState::Active | VoiceState::Releasing)
            && !self.any_envelope_active()
        {
            self.clear();
        }
    }
}

#[inline]
fn bounded(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT)
    } else {
        0.0
    }
}
