//! Per-line playhead movement. Each tick every line moves one step in its
//! direction, then reacts to the action under its new position.

use gridseq_types::{Action, GridKey, LineState, OneShotReset, Pattern};

enum Step {
    Done,
    /// Take one more step this tick.
    Skip,
    /// An action that moves every line.
    AllLines(Action),
}

fn action_at(actions: &Pattern, line: u8, beat: u8) -> Action {
    actions
        .get(&GridKey::new(line, beat))
        .map(|note| note.action)
        .unwrap_or_default()
}

/// `beat` moved `steps` against `direction`, kept on the grid.
fn step_back(beat: u8, direction: i8, steps: i16, beats: u8) -> u8 {
    let moved = beat as i16 - direction as i16 * steps;
    moved.clamp(0, beats as i16 - 1) as u8
}

fn step(state: &mut LineState, actions: &Pattern, beats: u8) -> Step {
    let advanced = state.current_beat as i16 + state.direction as i16;

    if advanced < 0 || advanced >= beats as i16 {
        let resume = state.reset.take().filter(|reset| {
            reset.location < beats
                && action_at(actions, state.index, reset.trigger_beat) == reset.trigger_action
        });
        match resume {
            Some(reset) => {
                state.current_beat = reset.location;
                state.direction = reset.direction;
            }
            None => {
                state.current_beat = 0;
                state.direction = 1;
            }
        }
    } else {
        state.current_beat = advanced as u8;
    }

    let landed = state.current_beat;
    let direction = state.direction;
    let action = action_at(actions, state.index, landed);
    if action != Action::LineDelay {
        state.held = false;
    }

    match action {
        Action::Nothing | Action::SpecificValue => {}
        Action::LineReset | Action::Reset => state.current_beat = 0,
        Action::LineReverse => {
            state.current_beat = step_back(landed, direction, 2, beats);
            state.direction = -direction;
            let resume_at = landed as i16 + direction as i16;
            state.reset = (0..beats as i16).contains(&resume_at).then(|| OneShotReset {
                location: resume_at as u8,
                trigger_beat: landed,
                trigger_action: Action::LineReverse,
                direction,
            });
        }
        Action::LineBounce => {
            state.current_beat = step_back(landed, direction, 1, beats);
            state.direction = -direction;
        }
        Action::LineDelay => {
            if state.held {
                state.held = false;
            } else {
                state.current_beat = step_back(landed, direction, 1, beats);
                state.held = true;
            }
        }
        Action::LineSkipBeat => return Step::Skip,
        Action::LineResetAll | Action::LineBounceAll | Action::LineSkipBeatAll => {
            return Step::AllLines(action)
        }
    }
    Step::Done
}

/// Move one line `steps` times, following skip cells. Skips are bounded by
/// the part length so a row of skip cells cannot spin forever.
///
/// Returns the first every-line action landed on when `follow_all` is set;
/// otherwise such cells are passed over.
fn advance_line(
    state: &mut LineState,
    actions: &Pattern,
    beats: u8,
    steps: u32,
    follow_all: bool,
) -> Option<Action> {
    let budget = steps + beats as u32;
    let mut remaining = steps;
    let mut taken = 0;

    while remaining > 0 && taken < budget {
        remaining -= 1;
        taken += 1;
        match step(state, actions, beats) {
            Step::Done => {}
            Step::Skip => remaining += 1,
            Step::AllLines(action) if follow_all => return Some(action),
            Step::AllLines(_) => {}
        }
    }
    None
}

/// Advance every line one beat. `actions` holds only cells with an action.
///
/// Lines move in index order; an every-line action applies to all lines at
/// once and ends the tick.
pub fn advance_lines(line_states: &mut [LineState], actions: &Pattern, beats: u8) {
    if beats == 0 {
        return;
    }

    for i in 0..line_states.len() {
        if let Some(action) = advance_line(&mut line_states[i], actions, beats, 1, true) {
            apply_all_lines(line_states, i, action, actions, beats);
            return;
        }
    }
}

fn apply_all_lines(
    line_states: &mut [LineState],
    trigger: usize,
    action: Action,
    actions: &Pattern,
    beats: u8,
) {
    match action {
        Action::LineResetAll => {
            for state in line_states.iter_mut() {
                state.current_beat = 0;
                state.direction = 1;
                state.reset = None;
                state.held = false;
            }
        }
        Action::LineBounceAll => {
            for (j, state) in line_states.iter_mut().enumerate() {
                if j <= trigger {
                    state.current_beat = step_back(state.current_beat, state.direction, 1, beats);
                }
                state.direction = -state.direction;
            }
        }
        Action::LineSkipBeatAll => {
            // lines past the trigger have not taken this tick's step yet
            for (j, state) in line_states.iter_mut().enumerate() {
                let steps = if j <= trigger { 1 } else { 2 };
                advance_line(state, actions, beats, steps, false);
            }
        }
        other => log::warn!(target: "engine", "{:?} is not an every-line action", other),
    }
}
