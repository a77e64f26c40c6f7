#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::envelope::EnvelopeTables;
use crate::dsp::filter::FilterType;
use crate::dsp::lfo::LfoTarget;
use crate::dsp::oscillator::WaveShape;
use crate::synth::curves::CurveSlot;

/// Control-to-audio messages, drained at the top of every block.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SynthMessage {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: f32,
    },
    NoteOff {
        channel: u8,
        note: u8,
        velocity: f32,
        allow_tail_off: bool,
    },
    AllNotesOff {
        allow_tail_off: bool,
    },
    Param(ParamChange),
}

/// One global parameter change, broadcast to every voice.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ParamChange {
    Ratio { op: usize, value: f32 },
    ModIndex { op: usize, value: f32 },
    Pan { op: usize, value: f32 },
    Level { op: usize, value: f32 },
    Audible { op: usize, value: bool },
    Wave { op: usize, shape: WaveShape },
    Cutoff(f32),
    Resonance(f32),
    WetDry(f32),
    FilterEnvDepth(f32),
    FilterType(FilterType),
    LfoRate { lfo: usize, value: f32 },
    LfoDepth { lfo: usize, value: f32 },
    LfoSync { lfo: usize, value: bool },
    LfoWave { lfo: usize, shape: WaveShape },
    LfoTarget { lfo: usize, target: LfoTarget },
    VelocityTracking(f32),
}

/// A freshly built curve set on its way to the audio thread.
#[derive(Debug)]
pub struct TableUpdate {
    pub slot: CurveSlot,
    pub tables: Box<EnvelopeTables>,
}
