use std::time::Instant;

use crossbeam_channel::{select, Receiver, Sender};

use super::{ClockCommand, ClockEvent};
use crate::timing::Timing;

/// Beat timer that reschedules itself after every beat with the drift
/// corrected interval.
pub(super) fn run(commands: Receiver<ClockCommand>, events: Sender<ClockEvent>, mut timing: Timing) {
    let mut next_beat: Option<Instant> = None;

    loop {
        let timer = match next_beat {
            Some(at) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        };

        select! {
            recv(commands) -> command => match command {
                Ok(ClockCommand::Start { tempo, subdivisions, .. }) => {
                    let now = Instant::now();
                    timing.set_tempo(tempo, subdivisions);
                    timing.start(now);
                    next_beat = Some(now);
                    log::info!(target: "clock", "standalone start at {} bpm", tempo);
                }
                Ok(ClockCommand::Stop) => {
                    timing.stop();
                    next_beat = None;
                }
                // no pulses to hold back; the engine stops us on the final beat
                Ok(ClockCommand::AnticipatoryStop) => {}
                Ok(ClockCommand::Tempo { tempo, subdivisions }) => {
                    timing.set_tempo(tempo, subdivisions);
                }
                Ok(ClockCommand::Quit) | Err(_) => break,
            },
            recv(timer) -> _ => {
                let now = Instant::now();
                let interval = timing.beat_interval(now);
                next_beat = Some(now + interval);
                if events.send(ClockEvent::Beat { interval }).is_err() {
                    break;
                }
            }
        }
    }
    log::debug!(target: "clock", "standalone clock exiting");
}
