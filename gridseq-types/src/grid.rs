//! Grid primitives: cell addresses, notes, ratchets and line actions.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Address of a single grid cell. Ordered line-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GridKey {
    pub line: u8,
    pub beat: u8,
}

impl GridKey {
    pub fn new(line: u8, beat: u8) -> Self {
        Self { line, beat }
    }
}

/// Cells of one layer. Absent keys are silent.
pub type Pattern = BTreeMap<GridKey, Note>;

/// Maximum number of ratchet hits in one beat.
pub const MAX_RATCHETS: u8 = 8;

/// Sub-beat repetition of a note.
///
/// `hits` is a bitmask over hit slots `0..=length`; `length` is the hit count
/// minus one and `span` stretches the whole ratchet over `span + 1` beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Ratchet {
    pub hits: u8,
    pub length: u8,
    pub span: u8,
}

impl Ratchet {
    /// Time between two hit slots for a beat of the given length.
    pub fn interval(&self, beat: Duration) -> Duration {
        beat * (self.span as u32 + 1) / (self.length as u32 + 1)
    }

    pub fn hit_at(&self, index: u8) -> bool {
        index < MAX_RATCHETS && self.hits & (1 << index) != 0
    }

    pub fn toggle(&mut self, index: u8) {
        if index < MAX_RATCHETS {
            self.hits ^= 1 << index;
        }
    }

    /// Change the slot count, dropping hits past the new end.
    pub fn set_length(&mut self, length: u8) {
        let length = length.min(MAX_RATCHETS - 1);
        let keep: u16 = (1u16 << (length + 1)) - 1;
        self.hits &= keep as u8;
        self.length = length;
    }
}

/// Playback modifiers attached to a cell.
///
/// Only the line-state machine reads the `Line*` variants; `SpecificValue`
/// marks a CC or program change whose accent index is the literal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Action {
    #[default]
    Nothing,
    LineReset,
    LineReverse,
    LineSkipBeat,
    Reset,
    LineBounce,
    LineDelay,
    LineResetAll,
    LineBounceAll,
    LineSkipBeatAll,
    SpecificValue,
}

impl Action {
    /// Actions that touch every line and end processing for the tick.
    pub fn is_all_lines(self) -> bool {
        matches!(
            self,
            Action::LineResetAll | Action::LineBounceAll | Action::LineSkipBeatAll
        )
    }
}

/// What a line sends when one of its cells plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    Note,
    ControlChange,
    ProgramChange,
}

/// Content of one cell. `Note::default()` is the empty sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Note {
    pub accent_index: u8,
    pub ratchets: Ratchet,
    pub action: Action,
    pub gate_index: u16,
    pub wait_index: u8,
}

impl Note {
    /// A freshly placed note: middle accent, single hit.
    pub fn init() -> Self {
        Self {
            accent_index: 5,
            ratchets: Ratchet {
                hits: 1,
                length: 0,
                span: 0,
            },
            ..Self::default()
        }
    }

    pub fn action(action: Action) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_ratcheted(&self) -> bool {
        self.ratchets.length > 0
    }
}
