//! The sequence the engine plays: parts, line setup, accents and tempo.

use serde::{Deserialize, Serialize};

use crate::arrangement::{ArrCursor, Arrangement};
use crate::grid::MessageType;
use crate::overlay::OverlayStack;

/// Number of accent levels, index 0 being "no accent".
pub const ACCENT_LEVELS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccentTarget {
    #[default]
    Velocity,
    Note,
}

/// Accent curve: level 1 plays at `start`, each further level `diff` lower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternAccents {
    pub diff: u8,
    pub start: u8,
    pub target: AccentTarget,
    pub data: Vec<u8>,
}

impl PatternAccents {
    pub fn new(start: u8, diff: u8, target: AccentTarget) -> Self {
        let mut accents = Self {
            diff,
            start,
            target,
            data: Vec::new(),
        };
        accents.recalc();
        accents
    }

    /// Rebuild `data` from `start` and `diff`, clamped to the MIDI range.
    pub fn recalc(&mut self) {
        self.data = (0..ACCENT_LEVELS)
            .map(|level| {
                if level == 0 {
                    0
                } else {
                    let value = self.start as i32 - self.diff as i32 * (level as i32 - 1);
                    value.clamp(0, 127) as u8
                }
            })
            .collect();
    }

    pub fn value(&self, index: u8) -> u8 {
        self.data.get(index as usize).copied().unwrap_or(0)
    }
}

impl Default for PatternAccents {
    fn default() -> Self {
        Self::new(120, 15, AccentTarget::Velocity)
    }
}

/// Per-line output setup. `channel` is 1-based, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDefinition {
    pub channel: u8,
    /// Note number, CC number or program number, by `msg_type`.
    pub note: u8,
    pub msg_type: MessageType,
}

impl LineDefinition {
    pub fn note(channel: u8, note: u8) -> Self {
        Self {
            channel,
            note,
            msg_type: MessageType::Note,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub beats: u8,
    pub overlays: OverlayStack,
}

impl Part {
    pub fn new(name: impl Into<String>, beats: u8) -> Self {
        Self {
            name: name.into(),
            beats,
            overlays: OverlayStack::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub parts: Vec<Part>,
    pub lines: Vec<LineDefinition>,
    pub accents: PatternAccents,
    pub tempo: u32,
    pub subdivisions: u32,
    /// Line whose wrap to beat 0 counts a key-cycle.
    pub keyline: u8,
    pub arrangement: Arrangement,
}

impl Definition {
    /// One part of `beats` beats, `line_count` note lines counting up from
    /// `base_note` on `channel`.
    pub fn new(line_count: u8, channel: u8, base_note: u8, beats: u8) -> Self {
        Self {
            parts: vec![Part::new("Part 1", beats)],
            lines: (0..line_count)
                .map(|i| LineDefinition::note(channel, base_note.saturating_add(i)))
                .collect(),
            accents: PatternAccents::default(),
            tempo: 120,
            subdivisions: 2,
            keyline: 0,
            arrangement: Arrangement::single(0),
        }
    }

    /// The part under the cursor's section.
    pub fn current_part(&self, cursor: &ArrCursor) -> Option<&Part> {
        let section = cursor.section(&self.arrangement)?;
        self.parts.get(section.part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accent_curve() {
        let accents = PatternAccents::default();
        assert_eq!(accents.data, vec![0, 120, 105, 90, 75, 60, 45, 30, 15]);
        assert_eq!(accents.value(1), 120);
        assert_eq!(accents.value(42), 0);
    }

    #[test]
    fn accent_curve_clamps() {
        let accents = PatternAccents::new(40, 10, AccentTarget::Note);
        assert_eq!(accents.data, vec![0, 40, 30, 20, 10, 0, 0, 0, 0]);

        let accents = PatternAccents::new(200, 0, AccentTarget::Velocity);
        assert!(accents.data[1..].iter().all(|&v| v == 127));
    }

    #[test]
    fn new_definition_lines_ascend() {
        let definition = Definition::new(4, 10, 36, 16);
        let notes: Vec<_> = definition.lines.iter().map(|l| l.note).collect();
        assert_eq!(notes, vec![36, 37, 38, 39]);
        assert!(definition.lines.iter().all(|l| l.channel == 10));
        assert_eq!(definition.parts[0].beats, 16);
    }

    #[test]
    fn current_part_follows_cursor() {
        let definition = Definition::new(1, 1, 60, 8);
        let cursor = ArrCursor::new(&definition.arrangement);
        assert_eq!(definition.current_part(&cursor).map(|p| p.beats), Some(8));
    }
}
