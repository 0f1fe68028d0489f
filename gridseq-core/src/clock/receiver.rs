use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};

use gridseq_types::LoopMode;

use super::{loop_mode_from_position, ClockCommand, ClockEvent};
use crate::midi::MidiMessage;
use crate::timing::Timing;

/// Tracks whether the transmitter is still talking to us.
struct Watchdog {
    timeout: Duration,
    deadline: Instant,
    connected: bool,
}

impl Watchdog {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
            connected: false,
        }
    }

    /// Returns the new state if this message changed it.
    fn feed(&mut self, now: Instant) -> Option<bool> {
        self.deadline = now + self.timeout;
        if self.connected {
            None
        } else {
            self.connected = true;
            Some(true)
        }
    }

    fn expire(&mut self, now: Instant) -> Option<bool> {
        self.deadline = now + self.timeout;
        if self.connected {
            self.connected = false;
            Some(false)
        } else {
            None
        }
    }
}

/// Count incoming MIDI clock pulses into beats. Start and Stop come from the
/// transmitter, so the engine's own start/stop commands are ignored here.
pub(super) fn run(
    commands: Receiver<ClockCommand>,
    midi: Receiver<MidiMessage>,
    events: Sender<ClockEvent>,
    mut timing: Timing,
    timeout: Duration,
) {
    let mut watchdog = Watchdog::new(timeout);
    let mut loop_mode = LoopMode::AllSections;

    loop {
        let mut outgoing = Vec::new();

        select! {
            recv(midi) -> message => {
                let Ok(message) = message else {
                    log::warn!(target: "clock", "clock input closed");
                    break;
                };
                let now = Instant::now();
                if let Some(connected) = watchdog.feed(now) {
                    outgoing.push(ClockEvent::TransmitterConnected(connected));
                }
                match message {
                    MidiMessage::SongPosition(position) => {
                        loop_mode = loop_mode_from_position(position);
                    }
                    MidiMessage::Start => {
                        timing.start(now);
                        outgoing.push(ClockEvent::RemoteStart { loop_mode });
                    }
                    MidiMessage::Stop => {
                        timing.stop();
                        outgoing.push(ClockEvent::RemoteStop);
                    }
                    MidiMessage::TimingClock => {
                        if timing.is_started() {
                            if timing.on_beat_pulse() {
                                outgoing.push(ClockEvent::Beat { interval: timing.tick_interval() });
                            }
                            timing.advance_pulse();
                        }
                    }
                    MidiMessage::ActiveSense => {}
                    other => log::debug!(target: "clock", "receiver ignoring {:?}", other),
                }
            }
            recv(commands) -> command => match command {
                Ok(ClockCommand::Tempo { tempo, subdivisions }) => {
                    timing.set_tempo(tempo, subdivisions);
                }
                Ok(ClockCommand::Start { tempo, subdivisions, .. }) => {
                    // the transmitter decides when to start; keep the tempo for beat lengths
                    timing.set_tempo(tempo, subdivisions);
                }
                Ok(ClockCommand::Stop) | Ok(ClockCommand::AnticipatoryStop) => {}
                Ok(ClockCommand::Quit) | Err(_) => break,
            },
            recv(crossbeam_channel::at(watchdog.deadline)) -> _ => {
                if let Some(connected) = watchdog.expire(Instant::now()) {
                    log::warn!(target: "clock", "transmitter went silent");
                    outgoing.push(ClockEvent::TransmitterConnected(connected));
                }
            }
        }

        for event in outgoing {
            if events.send(event).is_err() {
                return;
            }
        }
    }
    log::debug!(target: "clock", "receiver clock exiting");
}
