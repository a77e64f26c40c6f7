use crate::synth::message::SynthMessage;

/// A decoded channel voice message.
///
/// Pitch bend and program change are decoded for callers that route them
/// elsewhere; [`midi_to_synth`] drops them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: i16 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiEvent {
    /// Parses one channel voice message. Running status, system messages
    /// and truncated input yield `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status < 0x80 || status >= 0xF0 {
            return None;
        }
        let channel = status & 0x0F;
        let byte = |i: usize| data.get(i).copied().filter(|b| *b < 0x80);

        let event = match status & 0xF0 {
            0x80 => MidiEvent::NoteOff {
                channel,
                key: byte(0)?,
                velocity: byte(1)?,
            },
            0x90 => MidiEvent::NoteOn {
                channel,
                key: byte(0)?,
                velocity: byte(1)?,
            },
            0xB0 => MidiEvent::ControlChange {
                channel,
                controller: byte(0)?,
                value: byte(1)?,
            },
            0xC0 => MidiEvent::ProgramChange {
                channel,
                program: byte(0)?,
            },
            0xE0 => {
                let raw = (byte(1)? as i16) << 7 | byte(0)? as i16;
                MidiEvent::PitchBend {
                    channel,
                    value: raw - 8192,
                }
            }
            _ => return None,
        };
        Some(event)
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => channel,
        }
    }
}

/// Note messages for the engine. `channel_filter` of `None` accepts every
/// channel; a note-on with zero velocity is a note-off. CC 123 and CC 120
/// release or cut every note. The engine has no pitch bend or program
/// handling, so those and all other controllers map to `None`.
pub fn midi_to_synth(midi: MidiEvent, channel_filter: Option<u8>) -> Option<SynthMessage> {
    if channel_filter.is_some_and(|c| c != midi.channel()) {
        return None;
    }
    match midi {
        MidiEvent::NoteOn {
            channel,
            key,
            velocity,
        } if velocity > 0 => Some(SynthMessage::NoteOn {
            channel,
            note: key,
            velocity: velocity as f32 / 127.0,
        }),
        MidiEvent::NoteOn { channel, key, .. } => Some(SynthMessage::NoteOff {
            channel,
            note: key,
            velocity: 0.0,
            allow_tail_off: true,
        }),
        MidiEvent::NoteOff {
            channel,
            key,
            velocity,
        } => Some(SynthMessage::NoteOff {
            channel,
            note: key,
            velocity: velocity as f32 / 127.0,
            allow_tail_off: true,
        }),
        MidiEvent::ControlChange { controller: 123, .. } => {
            Some(SynthMessage::AllNotesOff { allow_tail_off: true })
        }
        MidiEvent::ControlChange { controller: 120, .. } => {
            Some(SynthMessage::AllNotesOff {
                allow_tail_off: false,
            })
        }
        MidiEvent::ControlChange { .. }
        | MidiEvent::PitchBend { .. }
        | MidiEvent::ProgramChange { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_messages() {
        assert_eq!(
            MidiEvent::from_bytes(&[0x92, 60, 100]),
            Some(MidiEvent::NoteOn {
                channel: 2,
                key: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiEvent::from_bytes(&[0xE0, 0x00, 0x40]),
            Some(MidiEvent::PitchBend {
                channel: 0,
                value: 0
            })
        );
        assert_eq!(MidiEvent::from_bytes(&[0x90, 60]), None);
        assert_eq!(MidiEvent::from_bytes(&[0xF8]), None);
        assert_eq!(MidiEvent::from_bytes(&[60, 100]), None);
    }

    #[test]
    fn converts_notes() {
        let on = MidiEvent::NoteOn {
            channel: 1,
            key: 64,
            velocity: 127,
        };
        assert_eq!(
            midi_to_synth(on, None),
            Some(SynthMessage::NoteOn {
                channel: 1,
                note: 64,
                velocity: 1.0
            })
        );
        assert_eq!(midi_to_synth(on, Some(0)), None);

        let silent = MidiEvent::NoteOn {
            channel: 0,
            key: 64,
            velocity: 0,
        };
        assert!(matches!(
            midi_to_synth(silent, Some(0)),
            Some(SynthMessage::NoteOff { note: 64, .. })
        ));
    }

    #[test]
    fn bend_and_program_are_ignored() {
        let bend = MidiEvent::from_bytes(&[0xE3, 0x7F, 0x7F]).unwrap();
        assert_eq!(
            bend,
            MidiEvent::PitchBend {
                channel: 3,
                value: 8191
            }
        );
        assert_eq!(midi_to_synth(bend, None), None);

        let program = MidiEvent::from_bytes(&[0xC3, 5]).unwrap();
        assert_eq!(
            program,
            MidiEvent::ProgramChange {
                channel: 3,
                program: 5
            }
        );
        assert_eq!(midi_to_synth(program, Some(3)), None);

        let sustain = MidiEvent::from_bytes(&[0xB3, 64, 127]).unwrap();
        assert_eq!(midi_to_synth(sustain, None), None);
    }
}
