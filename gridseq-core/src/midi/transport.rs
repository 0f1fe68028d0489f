use std::sync::Mutex;

use midir::{MidiOutput, MidiOutputConnection};

use super::MidiMessage;
use crate::error::{EngineError, Result};

const CLIENT_NAME: &str = "gridseq";

/// Opaque outbound MIDI transport.
///
/// Implementations are shared between the scheduler and clock threads.
pub trait MidiSender: Send + Sync {
    fn send(&self, message: MidiMessage) -> Result<()>;
}

/// Information about an available MIDI port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// List output ports currently offered by the system.
pub fn output_ports() -> Result<Vec<MidiPortInfo>> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| EngineError::Connect(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_out
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect())
}

/// midir output connection behind a lock so it can be shared.
pub struct MidirSender {
    connection: Mutex<MidiOutputConnection>,
    port_name: String,
}

impl MidirSender {
    /// Connect to the first output port whose name contains `filter`
    /// (case-insensitive). An empty filter takes the first port.
    pub fn connect(filter: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| EngineError::Connect(e.to_string()))?;
        let needle = filter.to_lowercase();
        let ports = midi_out.ports();
        let (port, port_name) = ports
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok().map(|name| (port, name)))
            .find(|(_, name)| name.to_lowercase().contains(&needle))
            .ok_or_else(|| EngineError::PortNotFound(filter.to_string()))?;

        let connection = midi_out
            .connect(port, "gridseq-out")
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        log::info!(target: "midi", "connected to output {}", port_name);

        Ok(Self {
            connection: Mutex::new(connection),
            port_name,
        })
    }

    /// Publish a virtual output port other programs can listen to.
    #[cfg(unix)]
    pub fn virtual_port(name: &str) -> Result<Self> {
        use midir::os::unix::VirtualOutput;

        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| EngineError::Connect(e.to_string()))?;
        let connection = midi_out
            .create_virtual(name)
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        log::info!(target: "midi", "opened virtual output {}", name);

        Ok(Self {
            connection: Mutex::new(connection),
            port_name: name.to_string(),
        })
    }

    #[cfg(not(unix))]
    pub fn virtual_port(name: &str) -> Result<Self> {
        Err(EngineError::Connect(format!(
            "virtual port {} is not supported on this platform",
            name
        )))
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSender for MidirSender {
    fn send(&self, message: MidiMessage) -> Result<()> {
        let mut connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        connection
            .send(&message.to_bytes())
            .map_err(|e| EngineError::Send {
                message,
                reason: e.to_string(),
            })
    }
}
