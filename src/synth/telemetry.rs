//! Lock-free telemetry from the audio thread.
//!
//! Levels and counters are individually atomic; a reader sees each value
//! fresh but there is no consistency across fields. The scope ring carries
//! recent stereo frames of the most recently triggered voice and drops
//! frames when the reader falls behind.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};

use crate::OPERATOR_COUNT;

/// An `f32` stored as bits in an `AtomicU32`.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScopeFrame {
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Default)]
struct VoiceSlot {
    operator_levels: [AtomicF32; OPERATOR_COUNT],
    filter_level: AtomicF32,
    fundamental: AtomicF32,
}

/// Audio-thread side of the telemetry feed.
#[derive(Debug)]
pub struct Telemetry {
    voices: Box<[VoiceSlot]>,
    last_triggered: AtomicUsize,
    voices_in_use: AtomicUsize,
    voices_stolen: AtomicU64,
}

impl Telemetry {
    pub fn new(polyphony: usize) -> Self {
        Self {
            voices: (0..polyphony).map(|_| VoiceSlot::default()).collect(),
            last_triggered: AtomicUsize::new(0),
            voices_in_use: AtomicUsize::new(0),
            voices_stolen: AtomicU64::new(0),
        }
    }

    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    pub(crate) fn publish_voice(
        &self,
        voice: usize,
        operator_levels: [f32; OPERATOR_COUNT],
        filter_level: f32,
    ) {
        if let Some(slot) = self.voices.get(voice) {
            for (atomic, level) in slot.operator_levels.iter().zip(operator_levels) {
                atomic.set(level);
            }
            slot.filter_level.set(filter_level);
        }
    }

    pub(crate) fn set_fundamental(&self, voice: usize, hz: f32) {
        if let Some(slot) = self.voices.get(voice) {
            slot.fundamental.set(hz);
        }
    }

    pub(crate) fn set_last_triggered(&self, voice: usize) {
        self.last_triggered.store(voice, Ordering::Relaxed);
    }

    pub(crate) fn set_voices_in_use(&self, count: usize) {
        self.voices_in_use.store(count, Ordering::Relaxed);
    }

    pub(crate) fn record_steal(&self) {
        self.voices_stolen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn operator_level(&self, voice: usize, op: usize) -> f32 {
        self.voices
            .get(voice)
            .and_then(|slot| slot.operator_levels.get(op))
            .map_or(0.0, AtomicF32::get)
    }

    pub fn filter_level(&self, voice: usize) -> f32 {
        self.voices.get(voice).map_or(0.0, |slot| slot.filter_level.get())
    }

    pub fn fundamental(&self, voice: usize) -> f32 {
        self.voices.get(voice).map_or(0.0, |slot| slot.fundamental.get())
    }

    pub fn last_triggered_voice(&self) -> usize {
        self.last_triggered.load(Ordering::Relaxed)
    }

    pub fn voices_in_use(&self) -> usize {
        self.voices_in_use.load(Ordering::Relaxed)
    }

    pub fn voices_stolen(&self) -> u64 {
        self.voices_stolen.load(Ordering::Relaxed)
    }
}

/// Pushes scope frames; full ring means the frame is dropped.
pub struct ScopeWriter {
    producer: Producer<ScopeFrame>,
}

impl ScopeWriter {
    pub fn new(producer: Producer<ScopeFrame>) -> Self {
        Self { producer }
    }

    pub fn push_block(&mut self, left: &[f32], right: &[f32]) {
        for (&left, &right) in left.iter().zip(right) {
            if self.producer.push(ScopeFrame { left, right }).is_err() {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceTelemetry {
    pub operator_levels: [f32; OPERATOR_COUNT],
    pub filter_level: f32,
    pub fundamental: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub voices: Vec<VoiceTelemetry>,
    pub last_triggered_voice: usize,
    pub voices_in_use: usize,
    pub voices_stolen: u64,
}

/// UI side of the telemetry feed.
pub struct TelemetryReader {
    shared: Arc<Telemetry>,
    scope: Consumer<ScopeFrame>,
}

impl TelemetryReader {
    pub fn new(shared: Arc<Telemetry>, scope: Consumer<ScopeFrame>) -> Self {
        Self { shared, scope }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.shared
    }

    pub fn operator_level(&self, voice: usize, op: usize) -> f32 {
        self.shared.operator_level(voice, op)
    }

    pub fn filter_level(&self, voice: usize) -> f32 {
        self.shared.filter_level(voice)
    }

    pub fn fundamental(&self, voice: usize) -> f32 {
        self.shared.fundamental(voice)
    }

    pub fn last_triggered_voice(&self) -> usize {
        self.shared.last_triggered_voice()
    }

    pub fn voices_in_use(&self) -> usize {
        self.shared.voices_in_use()
    }

    pub fn voices_stolen(&self) -> u64 {
        self.shared.voices_stolen()
    }

    /// Moves every queued scope frame into `out`; returns how many.
    pub fn drain_scope(&mut self, out: &mut Vec<ScopeFrame>) -> usize {
        let available = self.scope.slots();
        if available == 0 {
            return 0;
        }
        match self.scope.read_chunk(available) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                out.extend_from_slice(first);
                out.extend_from_slice(second);
                chunk.commit_all();
                available
            }
            Err(_) => 0,
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let t = &self.shared;
        TelemetrySnapshot {
            voices: (0..t.polyphony())
                .map(|v| VoiceTelemetry {
                    operator_levels: std::array::from_fn(|op| t.operator_level(v, op)),
                    filter_level: t.filter_level(v),
                    fundamental: t.fundamental(v),
                })
                .collect(),
            last_triggered_voice: t.last_triggered_voice(),
            voices_in_use: t.voices_in_use(),
            voices_stolen: t.voices_stolen(),
        }
    }
}
