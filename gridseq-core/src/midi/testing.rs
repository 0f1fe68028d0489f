use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{MidiMessage, MidiSender};
use crate::error::{EngineError, Result};

/// Captures every message with the instant it was sent.
#[derive(Clone, Default)]
pub(crate) struct RecordingSender {
    sent: Arc<Mutex<Vec<(Instant, MidiMessage)>>>,
    fail: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose every send fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.sent.lock().unwrap().iter().map(|(_, m)| *m).collect()
    }

    pub fn timed(&self) -> Vec<(Instant, MidiMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MidiSender for RecordingSender {
    fn send(&self, message: MidiMessage) -> Result<()> {
        if self.fail {
            return Err(EngineError::Send {
                message,
                reason: "port closed".to_string(),
            });
        }
        self.sent.lock().unwrap().push((Instant::now(), message));
        Ok(())
    }
}
