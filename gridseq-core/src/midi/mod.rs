//! MIDI message model, raw byte encoding/decoding and the midir transport.

pub mod input;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use input::MidiInputPort;
pub use transport::{output_ports, MidiPortInfo, MidiSender, MidirSender};

/// Messages the sequencer sends or listens for.
/// Channels are 0-based wire channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    /// Song Position Pointer, in MIDI beats (sixteenths).
    SongPosition(u16),
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSense,
}

impl MidiMessage {
    /// Encode as raw wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { channel, note } => vec![0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::SongPosition(position) => {
                vec![0xF2, (position & 0x7F) as u8, ((position >> 7) & 0x7F) as u8]
            }
            MidiMessage::TimingClock => vec![0xF8],
            MidiMessage::Start => vec![0xFA],
            MidiMessage::Continue => vec![0xFB],
            MidiMessage::Stop => vec![0xFC],
            MidiMessage::ActiveSense => vec![0xFE],
        }
    }
}

/// Parse raw bytes into a [`MidiMessage`]. Unknown or truncated input is `None`.
pub fn parse_midi_message(data: &[u8]) -> Option<MidiMessage> {
    let status = *data.first()?;

    match status {
        0xF2 => {
            if data.len() >= 3 {
                let position = (data[1] as u16 & 0x7F) | ((data[2] as u16 & 0x7F) << 7);
                return Some(MidiMessage::SongPosition(position));
            }
            return None;
        }
        0xF8 => return Some(MidiMessage::TimingClock),
        0xFA => return Some(MidiMessage::Start),
        0xFB => return Some(MidiMessage::Continue),
        0xFC => return Some(MidiMessage::Stop),
        0xFE => return Some(MidiMessage::ActiveSense),
        0xF0..=0xFF => return None,
        _ => {}
    }

    let channel = status & 0x0F;
    match status & 0xF0 {
        0x80 if data.len() >= 3 => Some(MidiMessage::NoteOff {
            channel,
            note: data[1],
        }),
        // Note On with velocity 0 is a Note Off
        0x90 if data.len() >= 3 => {
            if data[2] == 0 {
                Some(MidiMessage::NoteOff {
                    channel,
                    note: data[1],
                })
            } else {
                Some(MidiMessage::NoteOn {
                    channel,
                    note: data[1],
                    velocity: data[2],
                })
            }
        }
        0xB0 if data.len() >= 3 => Some(MidiMessage::ControlChange {
            channel,
            controller: data[1],
            value: data[2],
        }),
        0xC0 if data.len() >= 2 => Some(MidiMessage::ProgramChange {
            channel,
            program: data[1],
        }),
        _ => None,
    }
}
