//! What happens on one beat: move the playheads, walk the arrangement and
//! pick the cells to sound. No I/O here; the engine thread acts on the
//! returned [`BeatOutcome`].

use std::collections::BTreeSet;

use gridseq_types::{ArrCursor, Definition, GridKey, LoopMode, Pattern, PlayState};

use crate::clock::ClockMode;
use crate::line_state::advance_lines;

/// Everything a beat reads and mutates. Owned by the engine thread.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub play_state: PlayState,
    pub definition: Definition,
    pub cursor: ArrCursor,
    /// A receiver never ends playback itself; its transmitter does.
    pub clock_mode: ClockMode,
}

impl EngineState {
    pub fn new(definition: Definition) -> Self {
        let cursor = ArrCursor::new(&definition.arrangement);
        let mut play_state = PlayState::new(definition.lines.len());
        let start_beat = cursor
            .section(&definition.arrangement)
            .map_or(0, |s| s.start_beat);
        play_state.reinit_lines(definition.lines.len(), start_beat);
        Self {
            play_state,
            definition,
            cursor,
            clock_mode: ClockMode::default(),
        }
    }

    fn should_advance(&self) -> bool {
        let ps = &self.play_state;
        ps.playing && ps.record_pre_roll_beats == 0 && ps.allow_advance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeatOutcome {
    /// Sound these cells now.
    Play(Pattern),
    /// A pre-roll beat was counted off in silence.
    PreRoll,
    /// The arrangement ran out and playback stopped.
    Finished,
    /// Not playing.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Stayed,
    Moved,
    Looped,
    Finished,
    Unplayable,
}

/// Move the playheads one beat and walk the arrangement when the section
/// completes.
fn advance(state: &mut EngineState) -> Advance {
    let EngineState {
        play_state,
        definition,
        cursor,
        clock_mode,
    } = state;
    let arrangement = &definition.arrangement;
    let line_count = definition.lines.len();

    let Some(part) = definition.current_part(cursor) else {
        return Advance::Unplayable;
    };

    let actions = part.overlays.combined_action_pattern(cursor.key_cycles() as i32);
    advance_lines(&mut play_state.line_states, &actions, part.beats);

    let keyline_wrapped = play_state
        .line_states
        .get(definition.keyline as usize)
        .is_some_and(|ls| ls.current_beat == 0);
    if keyline_wrapped && play_state.loop_mode != LoopMode::LoopOverlay {
        cursor.increment_cycles();
    }

    let completes = match play_state.loop_mode {
        LoopMode::LoopOverlay | LoopMode::LoopPart => false,
        LoopMode::AllSections | LoopMode::LoopWholeSequence => cursor.section_done(arrangement),
    };
    if !completes {
        return Advance::Stayed;
    }

    let advance = if cursor.play_move(arrangement) {
        Advance::Moved
    } else if play_state.loop_mode == LoopMode::LoopWholeSequence
        || *clock_mode == ClockMode::Receiver
    {
        cursor.reset(arrangement);
        Advance::Looped
    } else {
        play_state.playing = false;
        play_state.allow_advance = false;
        play_state.reinit_lines(line_count, 0);
        cursor.reset(arrangement);
        return Advance::Finished;
    };
    let start_beat = cursor.section(arrangement).map_or(0, |s| s.start_beat);
    play_state.reinit_lines(line_count, start_beat);
    advance
}

/// Run one beat against `state`.
pub fn dispatch_beat(state: &mut EngineState) -> BeatOutcome {
    if state.should_advance() {
        match advance(state) {
            Advance::Stayed => {}
            Advance::Moved => {
                log::debug!(target: "engine", "moved to section {:?}", state.cursor.path())
            }
            Advance::Looped => log::debug!(target: "engine", "arrangement done, looping"),
            Advance::Finished => {
                log::info!(target: "engine", "arrangement done, stopping");
                return BeatOutcome::Finished;
            }
            Advance::Unplayable => {
                log::warn!(target: "engine", "cursor {:?} is not on a playable section", state.cursor.path());
                return BeatOutcome::Idle;
            }
        }
    }

    let EngineState {
        play_state,
        definition,
        cursor,
        ..
    } = state;

    if !play_state.playing {
        return BeatOutcome::Idle;
    }

    let Some(part) = definition.current_part(cursor) else {
        log::warn!(target: "engine", "cursor {:?} is not on a playable section", cursor.path());
        return BeatOutcome::Idle;
    };
    let keys: BTreeSet<GridKey> = play_state.audible_keys().collect();
    let pattern = part
        .overlays
        .current_beat_pattern(cursor.key_cycles() as i32, &keys);

    if play_state.record_pre_roll_beats > 0 {
        play_state.record_pre_roll_beats -= 1;
        return BeatOutcome::PreRoll;
    }

    play_state.allow_advance = true;
    BeatOutcome::Play(pattern)
}

/// Whether the next beat will end playback. Checked after a played beat so
/// a transmitter can hold back the pulses that would start it.
pub fn finishes_next_beat(state: &EngineState) -> bool {
    if !state.should_advance() {
        return false;
    }
    let mut ahead = state.clone();
    advance(&mut ahead) == Advance::Finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridseq_types::{Group, GroupPlayState, Node, Note, OverlayKey, Section};

    fn state(beats: u8, lines: u8) -> EngineState {
        let mut state = EngineState::new(Definition::new(lines, 1, 60, beats));
        state.play_state.playing = true;
        state
    }

    fn played_keys(outcome: &BeatOutcome) -> Vec<GridKey> {
        match outcome {
            BeatOutcome::Play(pattern) => pattern.keys().copied().collect(),
            other => panic!("expected a played beat, got {:?}", other),
        }
    }

    #[test]
    fn first_beat_plays_without_advancing() {
        let mut state = state(4, 1);
        state.definition.parts[0]
            .overlays
            .root_mut()
            .set_note(GridKey::new(0, 0), Note::init());

        let outcome = dispatch_beat(&mut state);
        assert_eq!(played_keys(&outcome), vec![GridKey::new(0, 0)]);
        assert_eq!(state.play_state.line_states[0].current_beat, 0);
        assert!(state.play_state.allow_advance);

        let outcome = dispatch_beat(&mut state);
        assert_eq!(outcome, BeatOutcome::Play(Pattern::new()));
        assert_eq!(state.play_state.line_states[0].current_beat, 1);
    }

    #[test]
    fn keyline_wrap_counts_key_cycle() {
        let mut state = state(2, 2);
        state.definition.arrangement.root.children[0] = Node::Section(Section {
            cycles: 0,
            ..Section::new(0)
        });
        assert_eq!(state.cursor.key_cycles(), 1);
        for _ in 0..3 {
            dispatch_beat(&mut state);
        }
        assert_eq!(state.cursor.key_cycles(), 2);
    }

    #[test]
    fn overlay_takes_over_on_matching_cycle() {
        let mut state = state(1, 1);
        state.definition.arrangement.root.children[0] = Node::Section(Section {
            cycles: 0,
            ..Section::new(0)
        });
        let overlays = &mut state.definition.parts[0].overlays;
        overlays.root_mut().set_note(GridKey::new(0, 0), Note::init());
        let mut accented = Note::init();
        accented.accent_index = 1;
        overlays
            .ensure(OverlayKey::new(2, 2, 1, 0))
            .set_note(GridKey::new(0, 0), accented);

        let accents: Vec<u8> = (0..4)
            .map(|_| match dispatch_beat(&mut state) {
                BeatOutcome::Play(pattern) => pattern[&GridKey::new(0, 0)].accent_index,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(accents, vec![5, 1, 5, 1]);
    }

    fn two_sections(cycles: u32) -> Definition {
        let mut definition = Definition::new(1, 1, 60, 2);
        definition.parts.push(gridseq_types::Part::new("Part 2", 2));
        definition.arrangement.root = Group::new(
            vec![
                Node::Section(Section { cycles, ..Section::new(0) }),
                Node::Section(Section { cycles, ..Section::new(1) }),
            ],
            1,
        );
        definition
    }

    #[test]
    fn sections_advance_then_playback_finishes() {
        let mut state = EngineState::new(two_sections(1));
        state.play_state.playing = true;

        let mut parts = Vec::new();
        let mut outcome = BeatOutcome::Idle;
        for _ in 0..10 {
            outcome = dispatch_beat(&mut state);
            if outcome == BeatOutcome::Finished {
                break;
            }
            parts.push(state.cursor.section(&state.definition.arrangement).map(|s| s.part));
        }
        assert_eq!(outcome, BeatOutcome::Finished);
        assert_eq!(parts, vec![Some(0), Some(0), Some(1), Some(1)]);
        assert!(!state.play_state.playing);
        assert_eq!(state.play_state.line_states[0].current_beat, 0);
        assert_eq!(dispatch_beat(&mut state), BeatOutcome::Idle);
    }

    #[test]
    fn whole_sequence_loop_restarts() {
        let mut state = EngineState::new(two_sections(1));
        state.play_state.playing = true;
        state.play_state.loop_mode = LoopMode::LoopWholeSequence;

        let parts: Vec<_> = (0..8)
            .map(|_| {
                assert!(matches!(dispatch_beat(&mut state), BeatOutcome::Play(_)));
                state.cursor.section(&state.definition.arrangement).map(|s| s.part)
            })
            .collect();
        assert_eq!(
            parts,
            vec![Some(0), Some(0), Some(1), Some(1), Some(0), Some(0), Some(1), Some(1)]
        );
    }

    #[test]
    fn receiver_keeps_playing_past_the_end() {
        let mut state = EngineState::new(two_sections(1));
        state.play_state.playing = true;
        state.clock_mode = ClockMode::Receiver;

        let parts: Vec<_> = (0..6)
            .map(|_| {
                assert!(matches!(dispatch_beat(&mut state), BeatOutcome::Play(_)));
                state.cursor.section(&state.definition.arrangement).map(|s| s.part)
            })
            .collect();
        assert_eq!(parts, vec![Some(0), Some(0), Some(1), Some(1), Some(0), Some(0)]);
        assert!(state.play_state.playing);
    }

    #[test]
    fn looks_ahead_to_the_final_beat() {
        let mut state = EngineState::new(two_sections(1));
        state.play_state.playing = true;

        let mut ahead = Vec::new();
        loop {
            if dispatch_beat(&mut state) == BeatOutcome::Finished {
                break;
            }
            ahead.push(finishes_next_beat(&state));
        }
        assert_eq!(ahead, vec![false, false, false, true]);
        assert!(!finishes_next_beat(&state));

        let mut state = EngineState::new(two_sections(1));
        state.play_state.playing = true;
        state.clock_mode = ClockMode::Receiver;
        for _ in 0..8 {
            dispatch_beat(&mut state);
            assert!(!finishes_next_beat(&state));
        }
    }

    #[test]
    fn loop_part_never_leaves_section() {
        let mut state = EngineState::new(two_sections(1));
        state.play_state.playing = true;
        state.play_state.loop_mode = LoopMode::LoopPart;
        for _ in 0..9 {
            dispatch_beat(&mut state);
        }
        assert_eq!(state.cursor.path(), &[0]);
        assert_eq!(state.cursor.key_cycles(), 5);
    }

    #[test]
    fn loop_overlay_freezes_key_cycles() {
        let mut state = EngineState::new(two_sections(1));
        state.play_state.playing = true;
        state.play_state.loop_mode = LoopMode::LoopOverlay;
        for _ in 0..9 {
            dispatch_beat(&mut state);
        }
        assert_eq!(state.cursor.path(), &[0]);
        assert_eq!(state.cursor.key_cycles(), 1);
    }

    #[test]
    fn solo_and_mute_pick_audible_lines() {
        let mut state = state(4, 3);
        let root = state.definition.parts[0].overlays.root_mut();
        for line in 0..3 {
            root.set_note(GridKey::new(line, 0), Note::init());
        }

        state.play_state.set_group_play_state(0, GroupPlayState::Mute);
        let outcome = dispatch_beat(&mut state);
        assert_eq!(
            played_keys(&outcome),
            vec![GridKey::new(1, 0), GridKey::new(2, 0)]
        );

        state.play_state.allow_advance = false;
        state.play_state.set_group_play_state(2, GroupPlayState::Solo);
        let outcome = dispatch_beat(&mut state);
        assert_eq!(played_keys(&outcome), vec![GridKey::new(2, 0)]);
    }

    #[test]
    fn pre_roll_is_silent_and_holds_position() {
        let mut state = state(4, 1);
        state.play_state.record_pre_roll_beats = 2;
        assert_eq!(dispatch_beat(&mut state), BeatOutcome::PreRoll);
        assert_eq!(dispatch_beat(&mut state), BeatOutcome::PreRoll);
        assert_eq!(state.play_state.line_states[0].current_beat, 0);
        assert!(matches!(dispatch_beat(&mut state), BeatOutcome::Play(_)));
        assert_eq!(state.play_state.line_states[0].current_beat, 0);
        dispatch_beat(&mut state);
        assert_eq!(state.play_state.line_states[0].current_beat, 1);
    }

    #[test]
    fn stopped_state_is_idle() {
        let mut state = EngineState::new(Definition::new(1, 1, 60, 4));
        assert_eq!(dispatch_beat(&mut state), BeatOutcome::Idle);
    }
}
