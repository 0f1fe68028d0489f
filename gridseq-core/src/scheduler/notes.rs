//! Turning resolved cells into timed MIDI sends.

use std::time::Duration;

use gridseq_types::{
    AccentTarget, Action, Definition, GridKey, LineDefinition, MessageType, Note, Pattern,
};

use super::registry::{NoteId, NoteKey};
use crate::midi::MidiMessage;

/// Note-on delay per wait index, in percent of a beat.
pub const WAIT_PERCENT: [u32; 8] = [0, 8, 16, 24, 32, 40, 48, 54];

/// Velocity used when accents move pitch instead.
const FIXED_VELOCITY: u8 = 96;

/// Shortest gate, also the first gate-table entry.
const SHORT_GATE: Duration = Duration::from_millis(20);

/// One entry of the gate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Fixed(Duration),
    /// Length in eighths of a beat.
    Eighths(u32),
}

impl Gate {
    pub fn length(self, beat: Duration) -> Duration {
        match self {
            Gate::Fixed(d) => d,
            Gate::Eighths(n) => beat * n / 8,
        }
    }
}

/// Eight short gates (fixed 20 ms, then 1/8 to 7/8 of a beat) followed by
/// long gates in eighth steps from one beat up to `max_gate_length` beats.
pub fn gate_table(max_gate_length: u8) -> Vec<Gate> {
    let mut gates = vec![Gate::Fixed(SHORT_GATE)];
    gates.extend((1..8).map(Gate::Eighths));
    for beats in 1..max_gate_length.max(1) as u32 {
        gates.extend((0..8).map(|eighth| Gate::Eighths(beats * 8 + eighth)));
    }
    gates
}

#[derive(Debug, Clone)]
pub struct NoteSettings {
    /// Gate of every ratchet hit.
    pub ratchet_gate: Duration,
    pub gates: Vec<Gate>,
}

impl NoteSettings {
    pub fn new(ratchet_gate: Duration, max_gate_length: u8) -> Self {
        Self {
            ratchet_gate,
            gates: gate_table(max_gate_length),
        }
    }

    /// Indices past the table play the longest gate.
    pub fn gate_length(&self, gate_index: u16, beat: Duration) -> Duration {
        self.gates
            .get(gate_index as usize)
            .or_else(|| self.gates.last())
            .map_or(SHORT_GATE, |gate| gate.length(beat))
    }
}

impl Default for NoteSettings {
    fn default() -> Self {
        Self::new(SHORT_GATE, 32)
    }
}

pub fn delay(wait_index: u8, beat: Duration) -> Duration {
    let percent = WAIT_PERCENT[(wait_index as usize).min(WAIT_PERCENT.len() - 1)];
    beat * percent / 100
}

/// A send waiting for its time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Send(MidiMessage),
    NoteOn { id: NoteId, key: NoteKey, velocity: u8 },
    /// Dropped if `id` no longer holds `key` when it comes due.
    NoteOff { id: NoteId, key: NoteKey },
}

/// Pitch and velocity for a note line at `accent_index`.
pub fn note_values(line: &LineDefinition, accent_index: u8, definition: &Definition) -> (u8, u8) {
    let accent = definition.accents.value(accent_index);
    match definition.accents.target {
        AccentTarget::Velocity => (line.note, accent),
        AccentTarget::Note => (line.note.saturating_add(accent).min(127), FIXED_VELOCITY),
    }
}

/// CC value: a literal for `SpecificValue` cells, otherwise the accent level
/// scaled so level 1 sends 127.
pub fn cc_value(note: &Note, levels: usize) -> u8 {
    if note.action == Action::SpecificValue {
        return note.accent_index.min(127);
    }
    let levels = levels.max(2) as u32;
    let index = note.accent_index as u32;
    (levels.saturating_sub(index) * 127 / (levels - 1)).min(127) as u8
}

pub fn program_value(line: &LineDefinition, note: &Note) -> u8 {
    if note.action == Action::SpecificValue {
        note.accent_index.min(127)
    } else {
        line.note.saturating_sub(1)
    }
}

/// Hands out note ids for one scheduler.
#[derive(Debug, Default)]
pub struct IdSource(NoteId);

impl IdSource {
    pub fn next(&mut self) -> NoteId {
        self.0 += 1;
        self.0
    }
}

/// Timed tasks for every cell of `pattern`, offsets relative to the beat.
///
/// A note's on is always listed before its off. CC and program change lines
/// are listed before note lines so a program change lands ahead of the notes
/// it should apply to.
pub fn plan_beat(
    pattern: &Pattern,
    definition: &Definition,
    beat: Duration,
    settings: &NoteSettings,
    ids: &mut IdSource,
) -> Vec<(Duration, Task)> {
    let (notes, meta): (Vec<_>, Vec<_>) = pattern
        .iter()
        .filter(|(_, note)| !note.is_empty())
        .filter_map(|(key, note)| match definition.lines.get(key.line as usize) {
            Some(line) => Some((*key, note, line)),
            None => {
                log::warn!(target: "scheduler", "no line definition for {:?}", key);
                None
            }
        })
        .partition(|(_, _, line)| line.msg_type == MessageType::Note);

    let mut tasks = Vec::new();
    for (key, note, line) in meta.into_iter().chain(notes) {
        plan_note(key, note, line, definition, beat, settings, ids, &mut tasks);
    }
    tasks
}

#[allow(clippy::too_many_arguments)]
fn plan_note(
    key: GridKey,
    note: &Note,
    line: &LineDefinition,
    definition: &Definition,
    beat: Duration,
    settings: &NoteSettings,
    ids: &mut IdSource,
    tasks: &mut Vec<(Duration, Task)>,
) {
    let channel = line.channel.saturating_sub(1) & 0x0F;
    let hits: Vec<(Duration, Duration)> = if note.is_ratcheted() {
        let interval = note.ratchets.interval(beat);
        (0..=note.ratchets.length)
            .filter(|&i| note.ratchets.hit_at(i))
            .map(|i| (interval * i as u32, settings.ratchet_gate))
            .collect()
    } else {
        vec![(
            delay(note.wait_index, beat),
            settings.gate_length(note.gate_index, beat),
        )]
    };

    match line.msg_type {
        MessageType::Note => {
            let (pitch, velocity) = note_values(line, note.accent_index, definition);
            let note_key = NoteKey::new(channel, pitch);
            for (offset, gate) in hits {
                let id = ids.next();
                tasks.push((offset, Task::NoteOn { id, key: note_key, velocity }));
                tasks.push((offset + gate, Task::NoteOff { id, key: note_key }));
            }
        }
        MessageType::ControlChange => {
            let message = MidiMessage::ControlChange {
                channel,
                controller: line.note,
                value: cc_value(note, definition.accents.data.len()),
            };
            tasks.extend(hits.into_iter().map(|(offset, _)| (offset, Task::Send(message))));
        }
        MessageType::ProgramChange => {
            let message = MidiMessage::ProgramChange {
                channel,
                program: program_value(line, note),
            };
            tasks.extend(hits.into_iter().map(|(offset, _)| (offset, Task::Send(message))));
        }
    }
    log::trace!(target: "scheduler", "planned {:?}", key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridseq_types::Ratchet;

    const BEAT: Duration = Duration::from_millis(400);

    fn definition() -> Definition {
        Definition::new(3, 10, 36, 8)
    }

    fn single(key: GridKey, note: Note) -> Pattern {
        [(key, note)].into_iter().collect()
    }

    #[test]
    fn gate_table_layout() {
        let gates = gate_table(3);
        assert_eq!(gates.len(), 8 + 2 * 8);
        assert_eq!(gates[0], Gate::Fixed(SHORT_GATE));
        assert_eq!(gates[4].length(BEAT), Duration::from_millis(200));
        assert_eq!(gates[8].length(BEAT), BEAT);
        assert_eq!(gates[9].length(BEAT), Duration::from_millis(450));
        assert_eq!(gates[16].length(BEAT), BEAT * 2);
    }

    #[test]
    fn gate_index_past_table_clamps() {
        let settings = NoteSettings::new(SHORT_GATE, 2);
        let longest = settings.gate_length(15, BEAT);
        assert_eq!(settings.gate_length(500, BEAT), longest);
        assert_eq!(settings.gate_length(0, BEAT), SHORT_GATE);
    }

    #[test]
    fn wait_delays() {
        assert_eq!(delay(0, BEAT), Duration::ZERO);
        assert_eq!(delay(2, Duration::from_millis(1000)), Duration::from_millis(160));
        assert_eq!(delay(7, Duration::from_millis(1000)), Duration::from_millis(540));
        assert_eq!(delay(200, Duration::from_millis(1000)), Duration::from_millis(540));
    }

    #[test]
    fn plain_note_plans_on_then_off() {
        let mut note = Note::init();
        note.gate_index = 4;
        note.wait_index = 1;
        let tasks = plan_beat(
            &single(GridKey::new(1, 0), note),
            &definition(),
            BEAT,
            &NoteSettings::default(),
            &mut IdSource::default(),
        );
        let key = NoteKey::new(9, 37);
        assert_eq!(
            tasks,
            vec![
                (Duration::from_millis(32), Task::NoteOn { id: 1, key, velocity: 60 }),
                (Duration::from_millis(232), Task::NoteOff { id: 1, key }),
            ]
        );
    }

    #[test]
    fn accent_can_move_pitch() {
        let mut definition = definition();
        definition.accents = gridseq_types::PatternAccents::new(12, 2, AccentTarget::Note);
        let line = definition.lines[0];
        assert_eq!(note_values(&line, 2, &definition), (46, FIXED_VELOCITY));
    }

    #[test]
    fn ratchet_hits_spread_over_beat() {
        let mut note = Note::init();
        note.ratchets = Ratchet {
            hits: 0b1011,
            length: 3,
            span: 0,
        };
        note.wait_index = 5;
        let tasks = plan_beat(
            &single(GridKey::new(0, 0), note),
            &definition(),
            BEAT,
            &NoteSettings::default(),
            &mut IdSource::default(),
        );
        let ons: Vec<_> = tasks
            .iter()
            .filter(|(_, t)| matches!(t, Task::NoteOn { .. }))
            .map(|(at, _)| *at)
            .collect();
        assert_eq!(
            ons,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300)
            ]
        );
        assert_eq!(tasks[1].0, Duration::from_millis(20));
    }

    #[test]
    fn control_change_values() {
        let mut definition = definition();
        definition.lines[2] = LineDefinition {
            channel: 1,
            note: 74,
            msg_type: MessageType::ControlChange,
        };
        let mut note = Note::init();
        note.accent_index = 1;
        let tasks = plan_beat(
            &single(GridKey::new(2, 0), note),
            &definition,
            BEAT,
            &NoteSettings::default(),
            &mut IdSource::default(),
        );
        assert_eq!(
            tasks,
            vec![(
                Duration::ZERO,
                Task::Send(MidiMessage::ControlChange {
                    channel: 0,
                    controller: 74,
                    value: 127
                })
            )]
        );

        note.accent_index = 8;
        assert_eq!(cc_value(&note, 9), 15);
        note.action = Action::SpecificValue;
        note.accent_index = 42;
        assert_eq!(cc_value(&note, 9), 42);
    }

    #[test]
    fn program_change_values() {
        let line = LineDefinition {
            channel: 2,
            note: 5,
            msg_type: MessageType::ProgramChange,
        };
        let mut note = Note::init();
        assert_eq!(program_value(&line, &note), 4);
        note.action = Action::SpecificValue;
        note.accent_index = 3;
        assert_eq!(program_value(&line, &note), 3);
    }

    #[test]
    fn empty_cells_and_unknown_lines_are_skipped() {
        let mut pattern = single(GridKey::new(0, 0), Note::default());
        pattern.insert(GridKey::new(9, 0), Note::init());
        let tasks = plan_beat(
            &pattern,
            &definition(),
            BEAT,
            &NoteSettings::default(),
            &mut IdSource::default(),
        );
        assert!(tasks.is_empty());
    }

    #[test]
    fn action_cell_sounds_at_zero_accent() {
        let tasks = plan_beat(
            &single(GridKey::new(0, 0), Note::action(Action::LineReset)),
            &definition(),
            BEAT,
            &NoteSettings::default(),
            &mut IdSource::default(),
        );
        assert_eq!(tasks.len(), 2);
        assert!(matches!(
            tasks[0],
            (Duration::ZERO, Task::NoteOn { velocity: 0, key, .. }) if key == NoteKey::new(9, 36)
        ));
        assert_eq!(tasks[1].0, SHORT_GATE);
    }

    #[test]
    fn program_change_goes_out_before_notes() {
        let mut definition = definition();
        definition.lines[1] = LineDefinition {
            channel: 10,
            note: 8,
            msg_type: MessageType::ProgramChange,
        };
        let pattern: Pattern = [
            (GridKey::new(0, 0), Note::init()),
            (GridKey::new(1, 0), Note::init()),
        ]
        .into_iter()
        .collect();

        let tasks = plan_beat(
            &pattern,
            &definition,
            BEAT,
            &NoteSettings::default(),
            &mut IdSource::default(),
        );
        let at_start: Vec<&Task> = tasks
            .iter()
            .filter(|(at, _)| *at == Duration::ZERO)
            .map(|(_, task)| task)
            .collect();
        assert_eq!(at_start.len(), 2);
        assert_eq!(
            at_start[0],
            &Task::Send(MidiMessage::ProgramChange {
                channel: 9,
                program: 7
            })
        );
        assert!(matches!(at_start[1], Task::NoteOn { .. }));
    }
}
