use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};
use tracing::{debug, warn};

use crate::dsp::context::RenderCtx;
use crate::dsp::envelope::{EnvelopeParams, EnvelopeStage, EnvelopeTables};
use crate::dsp::filter::FilterType;
use crate::dsp::lfo::LfoTarget;
use crate::dsp::oscillator::WaveShape;
use crate::error::EngineError;
use crate::synth::curves::CurveSlot;
use crate::synth::message::{ParamChange, SynthMessage, TableUpdate};
use crate::synth::routing::{RoutingGrid, SharedRouting};

/// State both halves of the engine touch without messages.
///
/// `sample_rate` is the rate the control side builds tables for;
/// `audio_rate` is the rate the audio side actually renders at.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub routing: SharedRouting,
    sample_rate: AtomicU32,
    audio_rate: AtomicU32,
    tables_stale: AtomicBool,
}

impl SharedState {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            routing: SharedRouting::default(),
            sample_rate: AtomicU32::new(sample_rate.to_bits()),
            audio_rate: AtomicU32::new(sample_rate.to_bits()),
            tables_stale: AtomicBool::new(false),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate.load(Ordering::Acquire))
    }

    pub fn set_sample_rate(&self, sample_rate: f32) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Release);
    }

    pub fn audio_rate(&self) -> f32 {
        f32::from_bits(self.audio_rate.load(Ordering::Acquire))
    }

    /// Called by the audio side when its stream changes. The control side
    /// follows, so the next commit builds for the new rate.
    pub fn set_audio_rate(&self, sample_rate: f32) {
        self.audio_rate.store(sample_rate.to_bits(), Ordering::Release);
        self.set_sample_rate(sample_rate);
    }

    /// The audio side installed a table rendered for another rate.
    pub fn mark_stale(&self) {
        self.tables_stale.store(true, Ordering::Release);
    }

    fn take_stale(&self) -> bool {
        self.tables_stale.swap(false, Ordering::AcqRel)
    }
}

/// Control-side half of the engine.
///
/// Owns the envelope parameters, builds curve tables off the audio thread
/// and queues note and parameter messages. Every queueing call fails with
/// [`EngineError::QueueFull`] rather than blocking.
pub struct SynthHandle {
    messages: Producer<SynthMessage>,
    tables: Producer<TableUpdate>,
    garbage: Consumer<Box<EnvelopeTables>>,
    shared: Arc<SharedState>,
    envelopes: [EnvelopeParams; CurveSlot::COUNT],
    last_good: [EnvelopeParams; CurveSlot::COUNT],
    dirty: [bool; CurveSlot::COUNT],
    built_rate: f32,
}

impl SynthHandle {
    pub(crate) fn new(
        messages: Producer<SynthMessage>,
        tables: Producer<TableUpdate>,
        garbage: Consumer<Box<EnvelopeTables>>,
        shared: Arc<SharedState>,
    ) -> Self {
        let built_rate = shared.sample_rate();
        Self {
            messages,
            tables,
            garbage,
            shared,
            envelopes: [EnvelopeParams::default(); CurveSlot::COUNT],
            last_good: [EnvelopeParams::default(); CurveSlot::COUNT],
            dirty: [false; CurveSlot::COUNT],
            built_rate,
        }
    }

    pub fn send(&mut self, message: SynthMessage) -> Result<(), EngineError> {
        self.messages
            .push(message)
            .map_err(|_| EngineError::QueueFull)
    }

    pub fn note_on(&mut self, channel: u8, note: u8, velocity: f32) -> Result<(), EngineError> {
        self.send(SynthMessage::NoteOn {
            channel,
            note,
            velocity,
        })
    }

    pub fn note_off(
        &mut self,
        channel: u8,
        note: u8,
        velocity: f32,
        allow_tail_off: bool,
    ) -> Result<(), EngineError> {
        self.send(SynthMessage::NoteOff {
            channel,
            note,
            velocity,
            allow_tail_off,
        })
    }

    pub fn all_notes_off(&mut self, allow_tail_off: bool) -> Result<(), EngineError> {
        self.send(SynthMessage::AllNotesOff { allow_tail_off })
    }

    pub fn apply(&mut self, change: ParamChange) -> Result<(), EngineError> {
        self.send(SynthMessage::Param(change))
    }

    pub fn set_ratio(&mut self, op: usize, value: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::Ratio { op, value })
    }

    pub fn set_mod_index(&mut self, op: usize, value: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::ModIndex { op, value })
    }

    pub fn set_pan(&mut self, op: usize, value: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::Pan { op, value })
    }

    pub fn set_level(&mut self, op: usize, value: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::Level { op, value })
    }

    pub fn set_audible(&mut self, op: usize, value: bool) -> Result<(), EngineError> {
        self.apply(ParamChange::Audible { op, value })
    }

    pub fn set_wave(&mut self, op: usize, shape: WaveShape) -> Result<(), EngineError> {
        self.apply(ParamChange::Wave { op, shape })
    }

    pub fn set_cutoff(&mut self, hz: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::Cutoff(hz))
    }

    pub fn set_resonance(&mut self, q: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::Resonance(q))
    }

    pub fn set_wet_dry(&mut self, wet: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::WetDry(wet))
    }

    pub fn set_filter_env_depth(&mut self, depth: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::FilterEnvDepth(depth))
    }

    pub fn set_filter_type(&mut self, filter_type: FilterType) -> Result<(), EngineError> {
        self.apply(ParamChange::FilterType(filter_type))
    }

    pub fn set_lfo_rate(&mut self, lfo: usize, hz: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::LfoRate { lfo, value: hz })
    }

    pub fn set_lfo_depth(&mut self, lfo: usize, depth: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::LfoDepth { lfo, value: depth })
    }

    pub fn set_lfo_sync(&mut self, lfo: usize, sync: bool) -> Result<(), EngineError> {
        self.apply(ParamChange::LfoSync { lfo, value: sync })
    }

    pub fn set_lfo_wave(&mut self, lfo: usize, shape: WaveShape) -> Result<(), EngineError> {
        self.apply(ParamChange::LfoWave { lfo, shape })
    }

    pub fn set_lfo_target(&mut self, lfo: usize, target: LfoTarget) -> Result<(), EngineError> {
        self.apply(ParamChange::LfoTarget { lfo, target })
    }

    pub fn set_velocity_tracking(&mut self, tracking: f32) -> Result<(), EngineError> {
        self.apply(ParamChange::VelocityTracking(tracking))
    }

    /// Routing is a single atomic word; no queue involved.
    pub fn set_routing(&self, src: usize, dst: usize, on: bool) {
        self.shared.routing.set(src, dst, on);
    }

    pub fn store_routing(&self, grid: RoutingGrid) {
        self.shared.routing.store(grid);
    }

    pub fn routing(&self) -> RoutingGrid {
        self.shared.routing.load()
    }

    pub fn envelope(&self, slot: CurveSlot) -> Option<EnvelopeParams> {
        slot.index().map(|i| self.envelopes[i])
    }

    /// Updates one envelope field; takes effect on the next [`commit`](Self::commit).
    pub fn set_envelope(&mut self, slot: CurveSlot, stage: EnvelopeStage, value: f32) {
        if let Some(i) = slot.index() {
            self.envelopes[i].set(stage, value);
            self.dirty[i] = true;
        }
    }

    pub fn set_envelope_params(&mut self, slot: CurveSlot, params: EnvelopeParams) {
        if let Some(i) = slot.index() {
            let mut clamped = EnvelopeParams::default();
            for stage in STAGES {
                clamped.set(stage, params.get(stage));
            }
            self.envelopes[i] = clamped;
            self.dirty[i] = true;
        }
    }

    pub fn set_operator_delay(&mut self, op: usize, ms: f32) {
        self.set_envelope(CurveSlot::Operator(op), EnvelopeStage::Delay, ms);
    }

    pub fn set_operator_attack(&mut self, op: usize, ms: f32) {
        self.set_envelope(CurveSlot::Operator(op), EnvelopeStage::Attack, ms);
    }

    pub fn set_operator_hold(&mut self, op: usize, ms: f32) {
        self.set_envelope(CurveSlot::Operator(op), EnvelopeStage::Hold, ms);
    }

    pub fn set_operator_decay(&mut self, op: usize, ms: f32) {
        self.set_envelope(CurveSlot::Operator(op), EnvelopeStage::Decay, ms);
    }

    pub fn set_operator_sustain(&mut self, op: usize, level: f32) {
        self.set_envelope(CurveSlot::Operator(op), EnvelopeStage::Sustain, level);
    }

    pub fn set_operator_release(&mut self, op: usize, ms: f32) {
        self.set_envelope(CurveSlot::Operator(op), EnvelopeStage::Release, ms);
    }

    pub fn set_filter_delay(&mut self, ms: f32) {
        self.set_envelope(CurveSlot::Filter, EnvelopeStage::Delay, ms);
    }

    pub fn set_filter_attack(&mut self, ms: f32) {
        self.set_envelope(CurveSlot::Filter, EnvelopeStage::Attack, ms);
    }

    pub fn set_filter_hold(&mut self, ms: f32) {
        self.set_envelope(CurveSlot::Filter, EnvelopeStage::Hold, ms);
    }

    pub fn set_filter_decay(&mut self, ms: f32) {
        self.set_envelope(CurveSlot::Filter, EnvelopeStage::Decay, ms);
    }

    pub fn set_filter_sustain(&mut self, level: f32) {
        self.set_envelope(CurveSlot::Filter, EnvelopeStage::Sustain, level);
    }

    pub fn set_filter_release(&mut self, ms: f32) {
        self.set_envelope(CurveSlot::Filter, EnvelopeStage::Release, ms);
    }

    /// The host is moving to `sample_rate`; the next commit rebuilds every
    /// curve set for it. If the audio side is still rendering at another
    /// rate when those tables land, it flags them stale and the following
    /// commit rebuilds once more at the rate the audio side reports.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        let rate = RenderCtx::new(sample_rate, 1).sample_rate;
        self.shared.set_sample_rate(rate);
    }

    pub fn sample_rate(&self) -> f32 {
        self.shared.sample_rate()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.dirty.iter().any(|&d| d)
    }

    /// Drops tables the audio thread has handed back.
    pub fn collect_garbage(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(tables) = self.garbage.pop() {
            drop(tables);
            freed += 1;
        }
        freed
    }

    /// Rebuilds every dirty curve set and publishes it. Returns how many
    /// sets were sent.
    ///
    /// A set that fails to build is logged and reverted to its last good
    /// parameters; the audio thread keeps the tables it already has.
    pub fn commit(&mut self) -> Result<usize, EngineError> {
        self.collect_garbage();

        let stale = self.shared.take_stale();
        if stale {
            // the audio side is the authority on what it renders at
            self.shared.set_sample_rate(self.shared.audio_rate());
        }
        let rate = self.shared.sample_rate();
        if stale || rate != self.built_rate {
            debug!(sample_rate = rate, stale, "rebuilding all curve sets");
            self.dirty = [true; CurveSlot::COUNT];
            self.built_rate = rate;
        }

        let mut published = 0;
        for slot in CurveSlot::all() {
            let Some(i) = slot.index() else { continue };
            if !self.dirty[i] {
                continue;
            }

            let tables = match EnvelopeTables::build(self.envelopes[i], rate) {
                Ok(tables) => tables,
                Err(error) => {
                    warn!(?slot, %error, "envelope rebuild failed, keeping last good curves");
                    self.envelopes[i] = self.last_good[i];
                    self.dirty[i] = false;
                    continue;
                }
            };

            let update = TableUpdate {
                slot,
                tables: Box::new(tables),
            };
            if self.tables.push(update).is_err() {
                // still dirty; the next commit retries
                return Err(EngineError::QueueFull);
            }
            self.last_good[i] = self.envelopes[i];
            self.dirty[i] = false;
            published += 1;
        }

        if published > 0 {
            debug!(published, "published envelope curve sets");
        }
        Ok(published)
    }
}

const STAGES: [EnvelopeStage; 6] = [
    EnvelopeStage::Delay,
    EnvelopeStage::Attack,
    EnvelopeStage::Hold,
    EnvelopeStage::Decay,
    EnvelopeStage::Sustain,
    EnvelopeStage::Release,
];
