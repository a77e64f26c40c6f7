use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use crate::config::{StealPolicy, SynthConfig};
use crate::dsp::context::{midi_note_to_freq, RenderCtx};
use crate::dsp::envelope::EnvelopeTables;
use crate::dsp::filter::FilterType;
use crate::dsp::lfo::LfoTarget;
use crate::dsp::oscillator::WaveShape;
use crate::dsp::wavetable::WavetableBank;
use crate::error::EngineError;
use crate::io::midi::{midi_to_synth, MidiEvent};
use crate::synth::curves::{CurveBank, CurveSlot};
use crate::synth::handle::{SharedState, SynthHandle};
use crate::synth::message::{ParamChange, SynthMessage, TableUpdate};
use crate::synth::routing::RoutingGrid;
use crate::synth::telemetry::{ScopeWriter, Telemetry, TelemetryReader};
use crate::synth::voice::{PendingNote, RenderFrame, Voice, VoiceSettings, VoiceState};
use crate::MAX_BLOCK_SIZE;

/// Table updates in flight; one per curve set twice over.
const TABLE_QUEUE_CAPACITY: usize = CurveSlot::COUNT * 2;
/// Seeds of neighbouring voices are this far apart.
const VOICE_SEED_STRIDE: u64 = 0x9E37_79B9;

/// Audio-thread half of the engine: a fixed pool of voices.
///
/// Nothing reachable from [`render_block`](Self::render_block) or the
/// transport calls allocates, locks or logs.
pub struct Synth {
    config: SynthConfig,
    ctx: RenderCtx,
    settings: VoiceSettings,
    voices: Vec<Voice>,
    curves: CurveBank,
    shared: Arc<SharedState>,
    messages: Consumer<SynthMessage>,
    table_updates: Consumer<TableUpdate>,
    garbage: Producer<Box<EnvelopeTables>>,
    telemetry: Arc<Telemetry>,
    scope: ScopeWriter,
    note_counter: u64,
    last_triggered: usize,
}

impl Synth {
    pub fn new(config: SynthConfig) -> Result<(Synth, SynthHandle, TelemetryReader), EngineError> {
        config.validate()?;

        let ctx = RenderCtx::new(config.sample_rate, config.block_size);
        let settings = VoiceSettings {
            retrig_ms: config.retrig_ms,
            kill_fade_ms: config.kill_fade_ms,
            velocity_tracking: config.velocity_tracking,
        };
        let bank = Arc::new(WavetableBank::build()?);
        let curves = CurveBank::new(ctx.sample_rate)?;

        let voices = (0..config.polyphony)
            .map(|i| {
                let seed = config
                    .noise_seed
                    .wrapping_add(VOICE_SEED_STRIDE.wrapping_mul(i as u64));
                Voice::new(i, &bank, &ctx, &settings, seed)
            })
            .collect();

        let (message_tx, message_rx) = RingBuffer::new(config.message_capacity);
        let (table_tx, table_rx) = RingBuffer::new(TABLE_QUEUE_CAPACITY);
        let (garbage_tx, garbage_rx) = RingBuffer::new(TABLE_QUEUE_CAPACITY);
        let (scope_tx, scope_rx) = RingBuffer::new(config.scope_capacity);

        let shared = Arc::new(SharedState::new(ctx.sample_rate));
        let telemetry = Arc::new(Telemetry::new(config.polyphony));

        debug!(
            polyphony = config.polyphony,
            sample_rate = ctx.sample_rate,
            block_size = ctx.block_size,
            "synth engine created"
        );

        let synth = Synth {
            config,
            ctx,
            settings,
            voices,
            curves,
            shared: shared.clone(),
            messages: message_rx,
            table_updates: table_rx,
            garbage: garbage_tx,
            telemetry: telemetry.clone(),
            scope: ScopeWriter::new(scope_tx),
            note_counter: 0,
            last_triggered: 0,
        };
        let handle = SynthHandle::new(message_tx, table_tx, garbage_rx, shared);
        let reader = TelemetryReader::new(telemetry, scope_rx);
        Ok((synth, handle, reader))
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn ctx(&self) -> &RenderCtx {
        &self.ctx
    }

    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_free()).count()
    }

    pub fn last_triggered_voice(&self) -> usize {
        self.last_triggered
    }

    // ---- transport ----

    pub fn note_on(&mut self, channel: u8, note: u8, velocity: f32) {
        let velocity = if velocity.is_finite() {
            velocity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.note_counter += 1;
        let age = self.note_counter;

        let index = if let Some(i) = self.voices.iter().position(|v| v.is_playing(channel, note)) {
            // same key again: retrigger in place
            self.voices[i].start_note(note, velocity, channel, age, &self.settings);
            i
        } else if let Some(i) = self.voices.iter().position(Voice::is_free) {
            self.voices[i].start_note(note, velocity, channel, age, &self.settings);
            i
        } else {
            let i = self.pick_victim();
            let pending = PendingNote {
                channel,
                note,
                velocity,
                age,
            };
            self.voices[i].steal(pending, &self.settings, &self.ctx);
            self.telemetry.record_steal();
            i
        };

        self.last_triggered = index;
        self.telemetry.set_last_triggered(index);
        if self.voices[index].state() == VoiceState::Active {
            self.telemetry
                .set_fundamental(index, midi_note_to_freq(note));
        }
    }

    fn pick_victim(&self) -> usize {
        let oldest = |state: Option<VoiceState>| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| match state {
                    Some(s) => v.state() == s,
                    None => v.state() != VoiceState::Stealing,
                })
                .min_by_key(|(_, v)| v.age())
                .map(|(i, _)| i)
        };

        let choice = match self.config.steal_policy {
            StealPolicy::OldestReleased => oldest(Some(VoiceState::Releasing)).or_else(|| oldest(None)),
            StealPolicy::Oldest => oldest(None),
        };

        // Every voice is already fading for a parked note: replace the
        // parked note on the one stolen first.
        choice.unwrap_or_else(|| {
            self.voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.pending().map_or(v.age(), |p| p.age))
                .map_or(0, |(i, _)| i)
        })
    }

    pub fn note_off(&mut self, channel: u8, note: u8, _velocity: f32, allow_tail_off: bool) {
        for voice in self.voices.iter_mut() {
            if voice.is_playing(channel, note) {
                voice.stop_note(allow_tail_off, &self.settings, &self.ctx);
            } else if voice.state() == VoiceState::Stealing {
                voice.cancel_pending(channel, note);
            }
        }
    }

    pub fn all_notes_off(&mut self, allow_tail_off: bool) {
        for voice in self.voices.iter_mut() {
            voice.stop_note(allow_tail_off, &self.settings, &self.ctx);
        }
    }

    pub fn handle_midi(&mut self, event: MidiEvent) {
        if let Some(message) = midi_to_synth(event, None) {
            self.dispatch(message);
        }
    }

    /// Host stream parameters changed. Rebuilds curve tables for the new
    /// rate, so call it outside the render callback.
    pub fn set_sample_rate(&mut self, sample_rate: f32, block_size: usize) {
        self.ctx = RenderCtx::new(sample_rate, block_size);
        for voice in self.voices.iter_mut() {
            voice.set_sample_rate(&self.ctx, &self.settings);
        }
        if let Err(error) = self.curves.rebuild_for_rate(self.ctx.sample_rate) {
            warn!(%error, "could not rebuild curve tables for new sample rate");
        }
        self.shared.set_audio_rate(self.ctx.sample_rate);
        debug!(sample_rate = self.ctx.sample_rate, block_size = self.ctx.block_size, "stream changed");
    }

    // ---- parameters ----

    pub fn apply(&mut self, change: ParamChange) {
        if let ParamChange::VelocityTracking(tracking) = change {
            self.settings.velocity_tracking = if tracking.is_finite() {
                tracking.clamp(0.0, 1.0)
            } else {
                1.0
            };
            return;
        }
        for voice in self.voices.iter_mut() {
            voice.apply(&change);
        }
    }

    pub fn set_ratio(&mut self, op: usize, value: f32) {
        self.apply(ParamChange::Ratio { op, value });
    }

    pub fn set_mod_index(&mut self, op: usize, value: f32) {
        self.apply(ParamChange::ModIndex { op, value });
    }

    pub fn set_pan(&mut self, op: usize, value: f32) {
        self.apply(ParamChange::Pan { op, value });
    }

    pub fn set_level(&mut self, op: usize, value: f32) {
        self.apply(ParamChange::Level { op, value });
    }

    pub fn set_audible(&mut self, op: usize, value: bool) {
        self.apply(ParamChange::Audible { op, value });
    }

    pub fn set_wave(&mut self, op: usize, shape: WaveShape) {
        self.apply(ParamChange::Wave { op, shape });
    }

    pub fn set_cutoff(&mut self, hz: f32) {
        self.apply(ParamChange::Cutoff(hz));
    }

    pub fn set_resonance(&mut self, q: f32) {
        self.apply(ParamChange::Resonance(q));
    }

    pub fn set_wet_dry(&mut self, wet: f32) {
        self.apply(ParamChange::WetDry(wet));
    }

    pub fn set_filter_env_depth(&mut self, depth: f32) {
        self.apply(ParamChange::FilterEnvDepth(depth));
    }

    pub fn set_filter_type(&mut self, filter_type: FilterType) {
        self.apply(ParamChange::FilterType(filter_type));
    }

    pub fn set_lfo_rate(&mut self, lfo: usize, hz: f32) {
        self.apply(ParamChange::LfoRate { lfo, value: hz });
    }

    pub fn set_lfo_depth(&mut self, lfo: usize, depth: f32) {
        self.apply(ParamChange::LfoDepth { lfo, value: depth });
    }

    pub fn set_lfo_sync(&mut self, lfo: usize, sync: bool) {
        self.apply(ParamChange::LfoSync { lfo, value: sync });
    }

    pub fn set_lfo_wave(&mut self, lfo: usize, shape: WaveShape) {
        self.apply(ParamChange::LfoWave { lfo, shape });
    }

    pub fn set_lfo_target(&mut self, lfo: usize, target: LfoTarget) {
        self.apply(ParamChange::LfoTarget { lfo, target });
    }

    pub fn set_velocity_tracking(&mut self, tracking: f32) {
        self.apply(ParamChange::VelocityTracking(tracking));
    }

    pub fn set_routing(&mut self, src: usize, dst: usize, on: bool) {
        self.shared.routing.set(src, dst, on);
    }

    pub fn routing(&self) -> RoutingGrid {
        self.shared.routing.load()
    }

    /// Swaps in an operator's curve set, returning the previous one.
    pub fn set_operator_envelope(
        &mut self,
        op: usize,
        tables: Box<EnvelopeTables>,
    ) -> Box<EnvelopeTables> {
        self.curves.install(CurveSlot::Operator(op), tables)
    }

    pub fn set_filter_envelope(&mut self, tables: Box<EnvelopeTables>) -> Box<EnvelopeTables> {
        self.curves.install(CurveSlot::Filter, tables)
    }

    pub fn curves(&self) -> &CurveBank {
        &self.curves
    }

    // Getters read the first voice; every voice holds the same globals.

    fn first(&self) -> &Voice {
        &self.voices[0]
    }

    pub fn ratio(&self, op: usize) -> Option<f32> {
        self.first().operator(op).map(|o| o.ratio())
    }

    pub fn mod_index(&self, op: usize) -> Option<f32> {
        self.first().operator(op).map(|o| o.mod_index())
    }

    pub fn pan(&self, op: usize) -> Option<f32> {
        self.first().operator(op).map(|o| o.pan())
    }

    pub fn level(&self, op: usize) -> Option<f32> {
        self.first().operator(op).map(|o| o.level())
    }

    pub fn audible(&self, op: usize) -> Option<bool> {
        self.first().operator(op).map(|o| o.is_audible())
    }

    pub fn wave(&self, op: usize) -> Option<WaveShape> {
        self.first().operator(op).map(|o| o.shape())
    }

    pub fn cutoff(&self) -> f32 {
        self.first().filter().cutoff()
    }

    pub fn resonance(&self) -> f32 {
        self.first().filter().resonance()
    }

    pub fn wet_dry(&self) -> f32 {
        self.first().filter().wet_level()
    }

    pub fn filter_env_depth(&self) -> f32 {
        self.first().filter().env_depth()
    }

    pub fn filter_type(&self) -> FilterType {
        self.first().filter().filter_type()
    }

    pub fn lfo_rate(&self, lfo: usize) -> Option<f32> {
        self.first().lfo(lfo).map(|l| l.rate())
    }

    pub fn lfo_depth(&self, lfo: usize) -> Option<f32> {
        self.first().lfo(lfo).map(|l| l.depth())
    }

    pub fn lfo_sync(&self, lfo: usize) -> Option<bool> {
        self.first().lfo(lfo).map(|l| l.sync())
    }

    pub fn lfo_wave(&self, lfo: usize) -> Option<WaveShape> {
        self.first().lfo(lfo).map(|l| l.shape())
    }

    pub fn lfo_target(&self, lfo: usize) -> Option<LfoTarget> {
        self.first().lfo(lfo).map(|l| l.target())
    }

    pub fn velocity_tracking(&self) -> f32 {
        self.settings.velocity_tracking
    }

    // ---- rendering ----

    fn process_messages(&mut self) {
        while let Ok(message) = self.messages.pop() {
            self.dispatch(message);
        }
    }

    fn dispatch(&mut self, message: SynthMessage) {
        match message {
            SynthMessage::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity),
            SynthMessage::NoteOff {
                channel,
                note,
                velocity,
                allow_tail_off,
            } => self.note_off(channel, note, velocity, allow_tail_off),
            SynthMessage::AllNotesOff { allow_tail_off } => self.all_notes_off(allow_tail_off),
            SynthMessage::Param(change) => self.apply(change),
        }
    }

    fn install_tables(&mut self) {
        // Only take what can be handed back; a full return ring leaves the
        // rest queued for the next block.
        while self.garbage.slots() > 0 {
            let Ok(update) = self.table_updates.pop() else {
                break;
            };
            if update.tables.sample_rate() != self.ctx.sample_rate {
                self.shared.mark_stale();
            }
            let old = self.curves.install(update.slot, update.tables);
            // slots() was checked above
            let _ = self.garbage.push(old);
        }
    }

    /// Renders `len` samples into `left`/`right` starting at `start`,
    /// adding to what is already there.
    pub fn render_block(&mut self, left: &mut [f32], right: &mut [f32], start: usize, len: usize) {
        self.process_messages();
        self.install_tables();

        let end = (start + len).min(left.len()).min(right.len());
        let routing = self.shared.routing.load();

        let Self {
            ctx,
            settings,
            voices,
            curves,
            telemetry,
            scope,
            last_triggered,
            ..
        } = self;
        let frame = RenderFrame {
            ctx,
            curves,
            routing,
            settings,
            telemetry,
        };

        let mut offset = start;
        while offset < end {
            let chunk = (end - offset).min(MAX_BLOCK_SIZE);
            for voice in voices.iter_mut() {
                if voice.is_free() {
                    continue;
                }
                voice.render(left, right, offset, chunk, &frame);
                if voice.index() == *last_triggered {
                    let (l, r) = voice.last_block();
                    scope.push_block(l, r);
                }
            }
            offset += chunk;
        }

        let in_use = voices.iter().filter(|v| !v.is_free()).count();
        telemetry.set_voices_in_use(in_use);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::EnvelopeParams;

    fn synth(polyphony: usize) -> (Synth, SynthHandle, TelemetryReader) {
        Synth::new(SynthConfig::default().with_polyphony(polyphony)).unwrap()
    }

    fn render(synth: &mut Synth, len: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; len];
        let mut right = vec![0.0; len];
        synth.render_block(&mut left, &mut right, 0, len);
        (left, right)
    }

    #[test]
    fn rejects_invalid_config() {
        let result = Synth::new(SynthConfig::default().with_polyphony(0));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn allocates_free_voices_first() {
        let (mut synth, _, _) = synth(4);
        synth.note_on(0, 60, 1.0);
        synth.note_on(0, 64, 1.0);
        assert_eq!(synth.active_voice_count(), 2);
        assert_eq!(synth.last_triggered_voice(), 1);
    }

    #[test]
    fn restrike_reuses_voice() {
        let (mut synth, _, _) = synth(4);
        synth.note_on(0, 60, 1.0);
        render(&mut synth, 512);
        synth.note_on(0, 60, 0.5);
        assert_eq!(synth.active_voice_count(), 1);
        assert_eq!(synth.last_triggered_voice(), 0);

        // another channel is a different note
        synth.note_on(1, 60, 1.0);
        assert_eq!(synth.active_voice_count(), 2);
    }

    #[test]
    fn steals_oldest_released_first() {
        let (mut synth, _, reader) = synth(2);
        synth.note_on(0, 60, 1.0);
        synth.note_on(0, 62, 1.0);
        render(&mut synth, 256);
        synth.note_off(0, 62, 0.0, true);

        synth.note_on(0, 64, 1.0);
        let voice = synth.voice(1).unwrap();
        assert_eq!(voice.state(), VoiceState::Stealing);
        assert_eq!(voice.pending().map(|p| p.note), Some(64));
        assert_eq!(reader.voices_stolen(), 1);
    }

    #[test]
    fn oldest_policy_ignores_release() {
        let (mut synth, _, _) =
            Synth::new(SynthConfig::default().with_polyphony(2).with_steal_policy(StealPolicy::Oldest))
                .unwrap();
        synth.note_on(0, 60, 1.0);
        synth.note_on(0, 62, 1.0);
        render(&mut synth, 256);
        synth.note_off(0, 62, 0.0, true);

        synth.note_on(0, 64, 1.0);
        assert_eq!(synth.voice(0).unwrap().state(), VoiceState::Stealing);
    }

    #[test]
    fn note_off_cancels_parked_note() {
        let (mut synth, _, _) = synth(1);
        synth.note_on(0, 60, 1.0);
        render(&mut synth, 256);
        synth.note_on(0, 64, 1.0);
        synth.note_off(0, 64, 0.0, true);
        assert!(synth.voice(0).unwrap().pending().is_none());
        render(&mut synth, 1024);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn messages_apply_at_block_start() {
        let (mut synth, mut handle, _) = synth(2);
        handle.set_cutoff(1234.0).unwrap();
        handle.set_ratio(2, 3.0).unwrap();
        handle.note_on(0, 60, 1.0).unwrap();
        assert_eq!(synth.active_voice_count(), 0);

        render(&mut synth, 64);
        assert_eq!(synth.cutoff(), 1234.0);
        assert_eq!(synth.ratio(2), Some(3.0));
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn direct_envelope_swap_returns_old() {
        let (mut synth, _, _) = synth(1);
        let params = EnvelopeParams::dahdsr(0.0, 5.0, 0.0, 5.0, 0.9, 5.0);
        let tables = Box::new(EnvelopeTables::build(params, 44_100.0).unwrap());
        let old = synth.set_operator_envelope(0, tables);
        assert_eq!(*old.params(), EnvelopeParams::default());
        assert_eq!(*synth.curves().operator(0).params(), params);
    }

    #[test]
    fn midi_note_on_with_zero_velocity_releases() {
        let (mut synth, _, _) = synth(2);
        synth.handle_midi(MidiEvent::NoteOn {
            channel: 0,
            key: 60,
            velocity: 100,
        });
        assert_eq!(synth.voice(0).unwrap().state(), VoiceState::Active);
        synth.handle_midi(MidiEvent::NoteOn {
            channel: 0,
            key: 60,
            velocity: 0,
        });
        assert_eq!(synth.voice(0).unwrap().state(), VoiceState::Releasing);
    }

    #[test]
    fn renders_into_an_offset_window() {
        let (mut synth, _, _) = synth(1);
        synth.set_audible(0, true);
        synth.note_on(0, 69, 1.0);
        let mut left = vec![0.0; 512];
        let mut right = vec![0.0; 512];
        synth.render_block(&mut left, &mut right, 256, 256);
        assert!(left[..256].iter().all(|&s| s == 0.0));
        assert!(left[256..].iter().any(|&s| s != 0.0));
    }
}
