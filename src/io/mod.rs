// Purpose - external interfaces, format conversions

pub mod midi;

pub use midi::{midi_to_synth, MidiEvent};
