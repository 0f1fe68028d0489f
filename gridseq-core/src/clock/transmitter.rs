use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};

use super::{loop_mode_position, ClockCommand, ClockEvent};
use crate::error::EngineError;
use crate::midi::{MidiMessage, MidiSender};
use crate::timing::Timing;

struct Transmitter {
    out: Arc<dyn MidiSender>,
    errors: Sender<EngineError>,
}

impl Transmitter {
    fn send(&self, message: MidiMessage) {
        if let Err(e) = self.out.send(message) {
            log::warn!(target: "clock", "transmitter send failed: {}", e);
            let _ = self.errors.send(e);
        }
    }
}

/// Pulse timer at 24 PPQN. Every pulse goes out as MIDI clock and every
/// `24 / subdivisions`th pulse is also a beat for the engine.
pub(super) fn run(
    commands: Receiver<ClockCommand>,
    events: Sender<ClockEvent>,
    errors: Sender<EngineError>,
    out: Arc<dyn MidiSender>,
    mut timing: Timing,
    active_sense: Duration,
) {
    let transmitter = Transmitter { out, errors };
    let mut next_pulse: Option<Instant> = None;
    let mut next_sense = Instant::now();

    loop {
        let pulse_timer = match next_pulse {
            Some(at) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        };

        select! {
            recv(commands) -> command => match command {
                Ok(ClockCommand::Start { tempo, subdivisions, loop_mode }) => {
                    let now = Instant::now();
                    timing.set_tempo(tempo, subdivisions);
                    timing.start(now);
                    next_pulse = Some(now);
                    transmitter.send(MidiMessage::SongPosition(loop_mode_position(loop_mode)));
                    transmitter.send(MidiMessage::Start);
                    log::info!(target: "clock", "transmitter start at {} bpm", tempo);
                }
                Ok(ClockCommand::Stop) => {
                    let was_started = timing.is_started();
                    timing.stop();
                    next_pulse = None;
                    if was_started {
                        transmitter.send(MidiMessage::Stop);
                    }
                }
                Ok(ClockCommand::AnticipatoryStop) => {
                    if timing.is_started() {
                        timing.anticipate_stop();
                    }
                }
                Ok(ClockCommand::Tempo { tempo, subdivisions }) => {
                    timing.set_tempo(tempo, subdivisions);
                }
                Ok(ClockCommand::Quit) | Err(_) => break,
            },
            recv(pulse_timer) -> _ => {
                if !timing.is_started() {
                    next_pulse = None;
                    continue;
                }
                if !timing.pulse_allowed() {
                    // the held-back pulse still gives the engine its final beat
                    let final_beat = timing.on_beat_pulse();
                    let interval = timing.tick_interval();
                    timing.stop();
                    next_pulse = None;
                    transmitter.send(MidiMessage::Stop);
                    if final_beat && events.send(ClockEvent::Beat { interval }).is_err() {
                        break;
                    }
                    continue;
                }

                transmitter.send(MidiMessage::TimingClock);
                if timing.on_beat_pulse() {
                    let interval = timing.tick_interval();
                    if events.send(ClockEvent::Beat { interval }).is_err() {
                        break;
                    }
                }

                let now = Instant::now();
                next_pulse = Some(now + timing.pulse_delay(now));
                timing.advance_pulse();
            }
            recv(crossbeam_channel::at(next_sense)) -> _ => {
                if !timing.is_started() {
                    transmitter.send(MidiMessage::ActiveSense);
                }
                next_sense = Instant::now() + active_sense;
            }
        }
    }
    log::debug!(target: "clock", "transmitter clock exiting");
}
