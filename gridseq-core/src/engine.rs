//! The engine thread: sole owner of the play state, definition and cursor.
//!
//! The editor pushes whole snapshots in; the clock pushes beats in; after
//! every beat a [`PlayedMsg`] goes back out with the state as it now stands.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};

use gridseq_types::{ArrCursor, Definition, LoopMode, PlayState};

use crate::clock::{ClockCommand, ClockEvent};
use crate::dispatcher::{dispatch_beat, finishes_next_beat, BeatOutcome, EngineState};
use crate::error::{EngineError, Result};
use crate::scheduler::NoteScheduler;

pub enum ModelMsg {
    /// Replace the engine's state with the editor's.
    Update(EngineState),
    Quit,
}

/// State after a beat, for the editor.
#[derive(Debug, Clone)]
pub struct PlayedMsg {
    /// Playback ended on its own; the editor should show it stopped.
    pub perform_stop: bool,
    pub play_state: PlayState,
    pub definition: Definition,
    pub cursor: ArrCursor,
}

#[derive(Debug)]
pub enum EngineEvent {
    Played(PlayedMsg),
    /// The transmitter we follow started; the editor should start playing.
    RemoteStart { loop_mode: LoopMode },
    RemoteStop,
    TransmitterConnected(bool),
    /// A send failed somewhere downstream. Playback carries on.
    Error(EngineError),
}

pub struct Engine {
    updates: Sender<ModelMsg>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Start the engine thread. `clock` drives the beat source whose events
    /// arrive on `clock_events`; asynchronous send failures arrive on `errors`.
    pub fn spawn(
        initial: EngineState,
        scheduler: NoteScheduler,
        clock: Sender<ClockCommand>,
        clock_events: Receiver<ClockEvent>,
        errors: Receiver<EngineError>,
        events: Sender<EngineEvent>,
    ) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name("engine".into())
            .spawn(move || {
                let mut engine = EngineThread {
                    state: initial,
                    scheduler,
                    clock,
                    events,
                };
                engine.run(rx, clock_events, errors);
            })?;
        Ok(Self {
            updates: tx,
            thread: Some(thread),
        })
    }

    pub fn update(&self, state: EngineState) -> Result<()> {
        self.updates
            .send(ModelMsg::Update(state))
            .map_err(|_| EngineError::EngineClosed)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.updates.send(ModelMsg::Quit);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct EngineThread {
    state: EngineState,
    scheduler: NoteScheduler,
    clock: Sender<ClockCommand>,
    events: Sender<EngineEvent>,
}

impl EngineThread {
    fn run(
        &mut self,
        updates: Receiver<ModelMsg>,
        clock_events: Receiver<ClockEvent>,
        mut errors: Receiver<EngineError>,
    ) {
        loop {
            let mut errors_closed = false;
            select! {
                recv(updates) -> msg => match msg {
                    Ok(ModelMsg::Update(next)) => self.apply_update(next),
                    Ok(ModelMsg::Quit) | Err(_) => break,
                },
                recv(clock_events) -> event => {
                    let forwarded = match event {
                        Ok(ClockEvent::Beat { interval }) => self.beat(interval),
                        Ok(ClockEvent::RemoteStart { loop_mode }) => {
                            self.emit(EngineEvent::RemoteStart { loop_mode })
                        }
                        Ok(ClockEvent::RemoteStop) => self.emit(EngineEvent::RemoteStop),
                        Ok(ClockEvent::TransmitterConnected(connected)) => {
                            self.emit(EngineEvent::TransmitterConnected(connected))
                        }
                        Err(_) => {
                            log::warn!(target: "engine", "clock event channel closed");
                            false
                        }
                    };
                    if !forwarded {
                        break;
                    }
                },
                recv(errors) -> error => match error {
                    Ok(e) => {
                        log::warn!(target: "engine", "{}", e);
                        if !self.emit(EngineEvent::Error(e)) {
                            break;
                        }
                    }
                    Err(_) => errors_closed = true,
                },
            }
            if errors_closed {
                errors = crossbeam_channel::never();
            }
        }
        log::debug!(target: "engine", "engine thread exiting");
    }

    fn apply_update(&mut self, next: EngineState) {
        let was_playing = self.state.play_state.playing;
        let old_tempo = (self.state.definition.tempo, self.state.definition.subdivisions);
        self.state = next;

        let line_count = self.state.definition.lines.len();
        if self.state.play_state.line_states.len() != line_count {
            log::debug!(target: "engine", "line count changed to {}", line_count);
            self.state.play_state.reinit_lines(line_count, 0);
        }

        let definition = &self.state.definition;
        let command = match (was_playing, self.state.play_state.playing) {
            (false, true) => {
                log::info!(target: "engine", "start at {} bpm", definition.tempo);
                Some(ClockCommand::Start {
                    tempo: definition.tempo,
                    subdivisions: definition.subdivisions,
                    loop_mode: self.state.play_state.loop_mode,
                })
            }
            (true, false) => {
                log::info!(target: "engine", "stop");
                Some(ClockCommand::Stop)
            }
            _ if old_tempo != (definition.tempo, definition.subdivisions) => {
                Some(ClockCommand::Tempo {
                    tempo: definition.tempo,
                    subdivisions: definition.subdivisions,
                })
            }
            _ => None,
        };
        if let Some(command) = command {
            self.command_clock(command);
        }
    }

    /// Returns false once nobody is listening for events.
    fn beat(&mut self, interval: Duration) -> bool {
        let perform_stop = match dispatch_beat(&mut self.state) {
            BeatOutcome::Play(pattern) => {
                self.scheduler
                    .play_beat(interval, &pattern, &self.state.definition);
                if finishes_next_beat(&self.state) {
                    self.command_clock(ClockCommand::AnticipatoryStop);
                }
                false
            }
            BeatOutcome::Finished => {
                self.command_clock(ClockCommand::Stop);
                true
            }
            BeatOutcome::PreRoll | BeatOutcome::Idle => false,
        };

        self.emit(EngineEvent::Played(PlayedMsg {
            perform_stop,
            play_state: self.state.play_state.clone(),
            definition: self.state.definition.clone(),
            cursor: self.state.cursor.clone(),
        }))
    }

    fn command_clock(&self, command: ClockCommand) {
        if self.clock.send(command).is_err() {
            log::warn!(target: "clock", "{}, dropping {:?}", EngineError::ClockClosed, command);
        }
    }

    fn emit(&self, event: EngineEvent) -> bool {
        self.events.send(event).is_ok()
    }
}
