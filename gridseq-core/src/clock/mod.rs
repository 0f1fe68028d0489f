//! Beat sources. Each mode runs on its own thread, takes [`ClockCommand`]s
//! and reports [`ClockEvent`]s; the engine cannot tell them apart beyond
//! the remote start/stop a receiver forwards.

mod receiver;
mod standalone;
mod transmitter;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use gridseq_types::LoopMode;

use crate::error::{EngineError, Result};
use crate::midi::{MidiInputPort, MidiMessage, MidiSender, MidirSender};
use crate::timing::Timing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Local timer only.
    #[default]
    Standalone,
    /// Local timer, also broadcasting MIDI clock on a virtual port.
    Transmitter,
    /// Follow MIDI clock from a transmitter.
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCommand {
    Start {
        tempo: u32,
        subdivisions: u32,
        loop_mode: LoopMode,
    },
    Stop,
    /// Stop at the end of the current beat.
    AnticipatoryStop,
    Tempo {
        tempo: u32,
        subdivisions: u32,
    },
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Time to play the next beat; `interval` is the length of that beat.
    Beat { interval: Duration },
    /// The transmitter we follow started.
    RemoteStart { loop_mode: LoopMode },
    /// The transmitter we follow stopped.
    RemoteStop,
    /// The incoming clock appeared or went silent.
    TransmitterConnected(bool),
}

#[derive(Debug, Clone)]
pub struct ClockSettings {
    pub mode: ClockMode,
    pub tempo: u32,
    pub subdivisions: u32,
    pub transmitter_port: String,
    pub receiver_timeout: Duration,
    pub active_sense_interval: Duration,
}

impl ClockSettings {
    pub fn new(mode: ClockMode, tempo: u32, subdivisions: u32) -> Self {
        Self {
            mode,
            tempo,
            subdivisions,
            transmitter_port: "gridseq-transmitter".to_string(),
            receiver_timeout: Duration::from_millis(330),
            active_sense_interval: Duration::from_millis(300),
        }
    }

    fn timing(&self) -> Timing {
        Timing::new(self.tempo, self.subdivisions)
    }
}

/// Owner of a running clock thread. Dropping it quits the thread.
pub struct ClockHandle {
    mode: ClockMode,
    commands: Sender<ClockCommand>,
    thread: Option<JoinHandle<()>>,
    _input: Option<MidiInputPort>,
}

/// Open whatever ports `settings.mode` needs and start the clock.
pub fn spawn_clock(
    settings: ClockSettings,
    events: Sender<ClockEvent>,
    errors: Sender<EngineError>,
) -> Result<ClockHandle> {
    match settings.mode {
        ClockMode::Standalone => ClockHandle::standalone(settings, events),
        ClockMode::Transmitter => {
            let out: Arc<dyn MidiSender> =
                Arc::new(MidirSender::virtual_port(&settings.transmitter_port)?);
            ClockHandle::transmitter(settings, out, events, errors)
        }
        ClockMode::Receiver => {
            let (midi_tx, midi_rx) = crossbeam_channel::unbounded();
            let input = MidiInputPort::connect(&settings.transmitter_port, midi_tx)?;
            let mut handle = ClockHandle::receiver(settings, midi_rx, events)?;
            handle._input = Some(input);
            Ok(handle)
        }
    }
}

impl ClockHandle {
    pub fn standalone(settings: ClockSettings, events: Sender<ClockEvent>) -> Result<Self> {
        let timing = settings.timing();
        Self::spawn(ClockMode::Standalone, "clock-standalone", move |commands| {
            standalone::run(commands, events, timing)
        })
    }

    pub fn transmitter(
        settings: ClockSettings,
        out: Arc<dyn MidiSender>,
        events: Sender<ClockEvent>,
        errors: Sender<EngineError>,
    ) -> Result<Self> {
        let timing = settings.timing();
        let active_sense = settings.active_sense_interval;
        Self::spawn(ClockMode::Transmitter, "clock-transmitter", move |commands| {
            transmitter::run(commands, events, errors, out, timing, active_sense)
        })
    }

    /// Follow clock messages arriving on `midi`.
    pub fn receiver(
        settings: ClockSettings,
        midi: Receiver<MidiMessage>,
        events: Sender<ClockEvent>,
    ) -> Result<Self> {
        let timing = settings.timing();
        let timeout = settings.receiver_timeout;
        Self::spawn(ClockMode::Receiver, "clock-receiver", move |commands| {
            receiver::run(commands, midi, events, timing, timeout)
        })
    }

    fn spawn<F>(mode: ClockMode, name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Receiver<ClockCommand>) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name(name.into())
            .spawn(move || body(rx))?;
        Ok(Self {
            mode,
            commands: tx,
            thread: Some(thread),
            _input: None,
        })
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// A sender other threads can use to drive this clock.
    pub fn commands(&self) -> Sender<ClockCommand> {
        self.commands.clone()
    }

    pub fn send(&self, command: ClockCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::ClockClosed)
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(ClockCommand::Quit);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Loop mode travels to receivers as the Song Position Pointer sent before Start.
pub fn loop_mode_position(loop_mode: LoopMode) -> u16 {
    match loop_mode {
        LoopMode::AllSections => 0,
        LoopMode::LoopOverlay => 1,
        LoopMode::LoopPart => 2,
        LoopMode::LoopWholeSequence => 3,
    }
}

pub fn loop_mode_from_position(position: u16) -> LoopMode {
    match position {
        1 => LoopMode::LoopOverlay,
        2 => LoopMode::LoopPart,
        3 => LoopMode::LoopWholeSequence,
        _ => LoopMode::AllSections,
    }
}
