use crossbeam_channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection};

use super::{parse_midi_message, MidiMessage};
use crate::error::{EngineError, Result};

/// An open input port forwarding parsed messages to a channel.
/// The connection closes when this is dropped.
pub struct MidiInputPort {
    connection: Option<MidiInputConnection<()>>,
    port_name: String,
}

impl MidiInputPort {
    /// Listen on the first input port whose name contains `filter`.
    pub fn connect(filter: &str, tx: Sender<MidiMessage>) -> Result<Self> {
        let mut midi_in = MidiInput::new("gridseq").map_err(|e| EngineError::Connect(e.to_string()))?;
        // realtime clock and active sense are exactly what we listen for
        midi_in.ignore(Ignore::None);

        let needle = filter.to_lowercase();
        let ports = midi_in.ports();
        let (port, port_name) = ports
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok().map(|name| (port, name)))
            .find(|(_, name)| name.to_lowercase().contains(&needle))
            .ok_or_else(|| EngineError::PortNotFound(filter.to_string()))?;

        let connection = midi_in
            .connect(
                port,
                "gridseq-in",
                move |_timestamp, message, _| {
                    if let Some(parsed) = parse_midi_message(message) {
                        let _ = tx.send(parsed);
                    }
                },
                (),
            )
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        log::info!(target: "midi", "listening on input {}", port_name);

        Ok(Self {
            connection: Some(connection),
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

impl Drop for MidiInputPort {
    fn drop(&mut self) {
        self.close();
    }
}
