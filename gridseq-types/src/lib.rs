//! # gridseq-types
//!
//! Shared data model for the gridseq step sequencer: grid cells, overlay
//! layers, the arrangement tree and the play state the engine mutates.
//! Nothing in here touches MIDI or threads.

pub mod arrangement;
pub mod definition;
pub mod euclid;
pub mod grid;
pub mod overlay;
pub mod overlay_key;
pub mod play_state;

pub use arrangement::{ArrCursor, Arrangement, Group, Node, Section};
pub use definition::{AccentTarget, Definition, LineDefinition, Part, PatternAccents, ACCENT_LEVELS};
pub use euclid::euclidean_rhythm;
pub use grid::{Action, GridKey, MessageType, Note, Pattern, Ratchet};
pub use overlay::{Overlay, OverlayStack, ResolvedNote};
pub use overlay_key::{OverlayKey, ROOT};
pub use play_state::{init_line_states, GroupPlayState, LineState, LoopMode, OneShotReset, PlayState};
