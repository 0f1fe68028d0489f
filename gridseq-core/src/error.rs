use thiserror::Error;

use crate::midi::MidiMessage;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot send {message:?}: {reason}")]
    Send { message: MidiMessage, reason: String },
    #[error("no MIDI port matching {0:?}")]
    PortNotFound(String),
    #[error("MIDI connection failed: {0}")]
    Connect(String),
    #[error("note {note} on channel {channel} is already registered")]
    DuplicateNote { channel: u8, note: u8 },
    #[error("clock thread is gone")]
    ClockClosed,
    #[error("engine thread is gone")]
    EngineClosed,
    #[error("cannot spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
