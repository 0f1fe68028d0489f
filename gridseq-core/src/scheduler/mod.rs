//! Note scheduler: one thread holding a deadline-ordered queue of pending
//! sends, fired as they come due.
//!
//! Stopping playback does not cancel queued sends. The only cancellation is
//! the registry check on note-offs: an off whose note-on was taken over by a
//! later note on the same key is dropped.

pub mod notes;
pub mod registry;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};

use gridseq_types::{Definition, Pattern};

use crate::error::{EngineError, Result};
use crate::midi::{MidiMessage, MidiSender};

pub use notes::{NoteSettings, Task};
pub use registry::{NoteId, NoteKey, NoteRegistry};

enum SchedulerMsg {
    Schedule(Vec<(Instant, Task)>),
    Quit,
}

struct Pending {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest deadline, then the first queued.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct NoteScheduler {
    tasks: Sender<SchedulerMsg>,
    thread: Option<JoinHandle<()>>,
    registry: NoteRegistry,
    settings: NoteSettings,
    ids: notes::IdSource,
}

impl NoteScheduler {
    /// Start the scheduler thread. Send failures are reported on `errors`.
    pub fn spawn(
        out: Arc<dyn MidiSender>,
        settings: NoteSettings,
        errors: Sender<EngineError>,
    ) -> Result<Self> {
        let registry = NoteRegistry::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread_registry = registry.clone();
        let thread = thread::Builder::new()
            .name("note-scheduler".into())
            .spawn(move || run(rx, out, thread_registry, errors))?;
        Ok(Self {
            tasks: tx,
            thread: Some(thread),
            registry,
            settings,
            ids: notes::IdSource::default(),
        })
    }

    pub fn registry(&self) -> &NoteRegistry {
        &self.registry
    }

    /// Queue every cell of `pattern` for a beat starting now.
    pub fn play_beat(&mut self, beat: Duration, pattern: &Pattern, definition: &Definition) {
        let planned = notes::plan_beat(pattern, definition, beat, &self.settings, &mut self.ids);
        if planned.is_empty() {
            return;
        }
        let now = Instant::now();
        let timed = planned
            .into_iter()
            .map(|(offset, task)| (now + offset, task))
            .collect();
        if self.tasks.send(SchedulerMsg::Schedule(timed)).is_err() {
            log::warn!(target: "scheduler", "scheduler thread is gone, dropping beat");
        }
    }
}

impl Drop for NoteScheduler {
    fn drop(&mut self) {
        let _ = self.tasks.send(SchedulerMsg::Quit);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(
    rx: Receiver<SchedulerMsg>,
    out: Arc<dyn MidiSender>,
    registry: NoteRegistry,
    errors: Sender<EngineError>,
) {
    let mut queue: BinaryHeap<Pending> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        let timer = match queue.peek() {
            Some(next) => crossbeam_channel::at(next.deadline),
            None => crossbeam_channel::never(),
        };

        select! {
            recv(rx) -> msg => match msg {
                Ok(SchedulerMsg::Schedule(tasks)) => {
                    for (deadline, task) in tasks {
                        seq += 1;
                        queue.push(Pending { deadline, seq, task });
                    }
                }
                Ok(SchedulerMsg::Quit) | Err(_) => break,
            },
            recv(timer) -> _ => {
                let now = Instant::now();
                while queue.peek().is_some_and(|p| p.deadline <= now) {
                    if let Some(pending) = queue.pop() {
                        fire(pending.task, out.as_ref(), &registry, &errors);
                    }
                }
            }
        }
    }
}

/// Send one due task. A note-on for a key that is still sounding first
/// sends an off for the old holder.
fn fire(task: Task, out: &dyn MidiSender, registry: &NoteRegistry, errors: &Sender<EngineError>) {
    match task {
        Task::Send(message) => send(out, message, errors),
        Task::NoteOn { id, key, velocity } => {
            if registry.remove(key).is_some() {
                send(out, note_off(key), errors);
            }
            if let Err(e) = registry.add(key, id) {
                let _ = errors.send(e);
            }
            send(
                out,
                MidiMessage::NoteOn {
                    channel: key.channel,
                    note: key.note,
                    velocity,
                },
                errors,
            );
        }
        Task::NoteOff { id, key } => {
            if registry.remove_if_current(key, id) {
                send(out, note_off(key), errors);
            } else {
                log::trace!(target: "scheduler", "dropping stale off for note {} ({})", key.note, id);
            }
        }
    }
}

fn note_off(key: NoteKey) -> MidiMessage {
    MidiMessage::NoteOff {
        channel: key.channel,
        note: key.note,
    }
}

fn send(out: &dyn MidiSender, message: MidiMessage, errors: &Sender<EngineError>) {
    if let Err(e) = out.send(message) {
        log::warn!(target: "scheduler", "{}", e);
        let _ = errors.send(e);
    }
}
