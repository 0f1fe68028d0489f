//! # gridseq-core
//!
//! Playback engine for the gridseq step sequencer. A clock thread produces
//! beats, the engine thread moves the playheads and walks the arrangement,
//! and the note scheduler turns the resulting cells into timed MIDI sends.
//!
//! ```text
//! editor ──ModelMsg──▶ engine ◀──ClockEvent── clock (standalone | transmitter | receiver)
//!    ▲                   │
//!    └────EngineEvent────┤
//!                        ▼
//!                 note scheduler ──▶ MidiSender
//! ```

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod line_state;
pub mod midi;
pub mod scheduler;
pub mod timing;

pub use clock::{spawn_clock, ClockCommand, ClockEvent, ClockHandle, ClockMode, ClockSettings};
pub use config::Config;
pub use dispatcher::{dispatch_beat, finishes_next_beat, BeatOutcome, EngineState};
pub use engine::{Engine, EngineEvent, ModelMsg, PlayedMsg};
pub use error::{EngineError, Result};
pub use line_state::advance_lines;
pub use midi::{MidiMessage, MidiSender, MidirSender};
pub use scheduler::{NoteRegistry, NoteScheduler, NoteSettings};
