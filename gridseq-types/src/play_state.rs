use serde::{Deserialize, Serialize};

use crate::grid::{Action, GridKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupPlayState {
    #[default]
    Play,
    Mute,
    Solo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Walk the arrangement and stop at its end.
    #[default]
    AllSections,
    /// Freeze the key-cycle so the current overlay repeats.
    LoopOverlay,
    /// Keep cycling overlays but never leave the current section.
    LoopPart,
    /// Walk the arrangement and start over at its end.
    LoopWholeSequence,
}

/// Resume point armed by a reverse, consumed on the next wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneShotReset {
    pub location: u8,
    pub trigger_beat: u8,
    pub trigger_action: Action,
    pub direction: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineState {
    pub index: u8,
    pub current_beat: u8,
    pub direction: i8,
    pub reset: Option<OneShotReset>,
    /// A delay cell already held this line back once.
    pub held: bool,
    pub group_play_state: GroupPlayState,
}

impl LineState {
    pub fn new(index: u8, start_beat: u8) -> Self {
        Self {
            index,
            current_beat: start_beat,
            direction: 1,
            reset: None,
            held: false,
            group_play_state: GroupPlayState::Play,
        }
    }

    pub fn grid_key(&self) -> GridKey {
        GridKey::new(self.index, self.current_beat)
    }

    pub fn is_solo(&self) -> bool {
        self.group_play_state == GroupPlayState::Solo
    }

    pub fn is_muted(&self) -> bool {
        self.group_play_state == GroupPlayState::Mute
    }
}

/// Fresh line states at `start_beat`, keeping mute/solo from `previous`.
pub fn init_line_states(count: usize, previous: &[LineState], start_beat: u8) -> Vec<LineState> {
    (0..count)
        .map(|i| {
            let mut state = LineState::new(i as u8, start_beat);
            if let Some(old) = previous.get(i) {
                state.group_play_state = old.group_play_state;
            }
            state
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayState {
    pub playing: bool,
    pub record_pre_roll_beats: u8,
    /// Set after the first beat of a run so the start beat itself is heard.
    pub allow_advance: bool,
    pub loop_mode: LoopMode,
    pub line_states: Vec<LineState>,
    pub has_solo: bool,
}

impl PlayState {
    pub fn new(line_count: usize) -> Self {
        Self {
            line_states: init_line_states(line_count, &[], 0),
            ..Self::default()
        }
    }

    pub fn set_group_play_state(&mut self, line: usize, state: GroupPlayState) {
        if let Some(line_state) = self.line_states.get_mut(line) {
            line_state.group_play_state = state;
        }
        self.has_solo = self.line_states.iter().any(LineState::is_solo);
    }

    /// Restart every line at `start_beat`.
    pub fn reinit_lines(&mut self, count: usize, start_beat: u8) {
        self.line_states = init_line_states(count, &self.line_states, start_beat);
        self.has_solo = self.line_states.iter().any(LineState::is_solo);
    }

    /// Grid cells audible this beat: soloed lines, or every unmuted line when
    /// nothing is soloed.
    pub fn audible_keys(&self) -> impl Iterator<Item = GridKey> + '_ {
        self.line_states
            .iter()
            .filter(move |ls| ls.is_solo() || (!ls.is_muted() && !self.has_solo))
            .map(LineState::grid_key)
    }
}
