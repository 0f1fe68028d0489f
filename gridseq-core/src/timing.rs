//! Tempo arithmetic and drift correction shared by every clock mode.

use std::time::{Duration, Instant};

/// MIDI clock resolution.
pub const PULSES_PER_QUARTER: u32 = 24;

/// Running clock position.
///
/// `track_time` accumulates the nominal length of every interval handed out
/// since `play_time`; comparing it with the wall clock tells how far the
/// timer thread has drifted, and the next interval absorbs the difference.
#[derive(Debug, Clone)]
pub struct Timing {
    play_time: Instant,
    track_time: Duration,
    tempo: u32,
    subdivisions: u32,
    started: bool,
    pulse_count: u64,
    pulse_limit: Option<u64>,
}

impl Timing {
    pub fn new(tempo: u32, subdivisions: u32) -> Self {
        Self {
            play_time: Instant::now(),
            track_time: Duration::ZERO,
            tempo: tempo.max(1),
            subdivisions: subdivisions.max(1),
            started: false,
            pulse_count: 0,
            pulse_limit: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.started = true;
        self.play_time = now;
        self.track_time = Duration::ZERO;
        self.pulse_count = 0;
        self.pulse_limit = None;
    }

    pub fn stop(&mut self) {
        self.started = false;
        self.pulse_limit = None;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn set_tempo(&mut self, tempo: u32, subdivisions: u32) {
        self.tempo = tempo.max(1);
        self.subdivisions = subdivisions.max(1);
    }

    /// Nominal length of one beat (one grid step).
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(60) / (self.tempo * self.subdivisions)
    }

    /// Nominal length of one MIDI clock pulse.
    pub fn pulse_interval(&self) -> Duration {
        Duration::from_secs(60) / (self.tempo * PULSES_PER_QUARTER)
    }

    pub fn pulses_per_beat(&self) -> u64 {
        (PULSES_PER_QUARTER / self.subdivisions).max(1) as u64
    }

    /// Delay until the next beat, corrected for accumulated drift.
    pub fn beat_interval(&mut self, now: Instant) -> Duration {
        let nominal = self.tick_interval();
        self.corrected(now, nominal)
    }

    /// Delay until the next pulse, corrected for accumulated drift.
    pub fn pulse_delay(&mut self, now: Instant) -> Duration {
        let nominal = self.pulse_interval();
        self.corrected(now, nominal)
    }

    fn corrected(&mut self, now: Instant, nominal: Duration) -> Duration {
        let elapsed = now.saturating_duration_since(self.play_time);
        let expected = self.track_time;
        self.track_time += nominal;
        if elapsed >= expected {
            nominal.saturating_sub(elapsed - expected)
        } else {
            nominal + (expected - elapsed)
        }
    }

    /// Whether the current pulse starts a beat.
    pub fn on_beat_pulse(&self) -> bool {
        self.pulse_count % self.pulses_per_beat() == 0
    }

    pub fn pulse_count(&self) -> u64 {
        self.pulse_count
    }

    pub fn advance_pulse(&mut self) {
        self.pulse_count += 1;
    }

    /// Let the remaining pulses of the current beat out, then go quiet, so a
    /// receiver never sees a final pulse immediately followed by Stop. The
    /// limit is the next beat boundary.
    pub fn anticipate_stop(&mut self) {
        if self.pulse_limit.is_none() {
            let per_beat = self.pulses_per_beat();
            self.pulse_limit = Some((self.pulse_count / per_beat + 1) * per_beat);
        }
    }

    pub fn pulse_allowed(&self) -> bool {
        self.pulse_limit.map_or(true, |limit| self.pulse_count < limit)
    }

    pub fn stop_pending(&self) -> bool {
        self.pulse_limit.is_some()
    }
}
