use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use gridseq_types::{AccentTarget, Definition, PatternAccents};

use crate::clock::ClockMode;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    accents: AccentsConfig,
    #[serde(default)]
    clock: ClockConfig,
    #[serde(default)]
    output: OutputConfig,
    #[serde(default)]
    notes: NotesConfig,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    tempo: Option<u32>,
    subdivisions: Option<u32>,
    beats: Option<u8>,
    lines: Option<u8>,
    base_note: Option<u8>,
    channel: Option<u8>,
}

#[derive(Deserialize, Default)]
struct AccentsConfig {
    start: Option<u8>,
    diff: Option<u8>,
    target: Option<String>,
}

#[derive(Deserialize, Default)]
struct ClockConfig {
    mode: Option<String>,
    transmitter_port: Option<String>,
    receiver_timeout_ms: Option<u64>,
    active_sense_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct OutputConfig {
    port: Option<String>,
}

#[derive(Deserialize, Default)]
struct NotesConfig {
    ratchet_gate_ms: Option<u64>,
    max_gate_length: Option<u8>,
}

pub struct Config {
    defaults: DefaultsConfig,
    accents: AccentsConfig,
    clock: ClockConfig,
    output: OutputConfig,
    notes: NotesConfig,
}

impl Config {
    /// Embedded defaults overlaid with the user's config file, if any.
    pub fn load() -> Self {
        Self::load_from(user_config_path().as_deref())
    }

    pub fn load_from(user_path: Option<&Path>) -> Self {
        let mut base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });

        if let Some(path) = user_path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            defaults: base.defaults,
            accents: base.accents,
            clock: base.clock,
            output: base.output,
            notes: base.notes,
        }
    }

    pub fn tempo(&self) -> u32 {
        self.defaults.tempo.unwrap_or(120).clamp(20, 300)
    }

    /// Beats per quarter note. Must divide the 24 clock pulses evenly.
    pub fn subdivisions(&self) -> u32 {
        match self.defaults.subdivisions {
            Some(s) if s > 0 && 24 % s == 0 => s,
            Some(s) => {
                log::warn!(target: "config", "subdivisions {} does not divide 24, using 2", s);
                2
            }
            None => 2,
        }
    }

    pub fn accents(&self) -> PatternAccents {
        let fallback = PatternAccents::default();
        PatternAccents::new(
            self.accents.start.unwrap_or(fallback.start),
            self.accents.diff.unwrap_or(fallback.diff),
            self.accents
                .target
                .as_deref()
                .and_then(parse_accent_target)
                .unwrap_or(fallback.target),
        )
    }

    /// A blank sequence shaped by the configured defaults.
    pub fn definition(&self) -> Definition {
        let mut definition = Definition::new(
            self.defaults.lines.unwrap_or(8).max(1),
            self.defaults.channel.unwrap_or(10).clamp(1, 16),
            self.defaults.base_note.unwrap_or(36).min(127),
            self.defaults.beats.unwrap_or(32).clamp(1, 127),
        );
        definition.tempo = self.tempo();
        definition.subdivisions = self.subdivisions();
        definition.accents = self.accents();
        definition
    }

    pub fn clock_mode(&self) -> ClockMode {
        self.clock
            .mode
            .as_deref()
            .and_then(parse_clock_mode)
            .unwrap_or_default()
    }

    pub fn transmitter_port(&self) -> &str {
        self.clock
            .transmitter_port
            .as_deref()
            .unwrap_or("gridseq-transmitter")
    }

    /// Silence on the incoming clock longer than this counts as disconnected.
    pub fn receiver_timeout(&self) -> Duration {
        Duration::from_millis(self.clock.receiver_timeout_ms.unwrap_or(330).max(1))
    }

    pub fn active_sense_interval(&self) -> Duration {
        Duration::from_millis(self.clock.active_sense_ms.unwrap_or(300).max(1))
    }

    pub fn output_port(&self) -> &str {
        self.output.port.as_deref().unwrap_or("")
    }

    /// Gate of each ratchet hit.
    pub fn ratchet_gate(&self) -> Duration {
        Duration::from_millis(self.notes.ratchet_gate_ms.unwrap_or(20).max(1))
    }

    /// Longest gate, in beats, offered past the short gates.
    pub fn max_gate_length(&self) -> u8 {
        self.notes.max_gate_length.unwrap_or(32).max(1)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gridseq").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    merge_defaults(&mut base.defaults, user.defaults);
    merge_accents(&mut base.accents, user.accents);
    merge_clock(&mut base.clock, user.clock);
    if user.output.port.is_some() {
        base.output.port = user.output.port;
    }
    if user.notes.ratchet_gate_ms.is_some() {
        base.notes.ratchet_gate_ms = user.notes.ratchet_gate_ms;
    }
    if user.notes.max_gate_length.is_some() {
        base.notes.max_gate_length = user.notes.max_gate_length;
    }
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.tempo.is_some() {
        base.tempo = user.tempo;
    }
    if user.subdivisions.is_some() {
        base.subdivisions = user.subdivisions;
    }
    if user.beats.is_some() {
        base.beats = user.beats;
    }
    if user.lines.is_some() {
        base.lines = user.lines;
    }
    if user.base_note.is_some() {
        base.base_note = user.base_note;
    }
    if user.channel.is_some() {
        base.channel = user.channel;
    }
}

fn merge_accents(base: &mut AccentsConfig, user: AccentsConfig) {
    if user.start.is_some() {
        base.start = user.start;
    }
    if user.diff.is_some() {
        base.diff = user.diff;
    }
    if user.target.is_some() {
        base.target = user.target;
    }
}

fn merge_clock(base: &mut ClockConfig, user: ClockConfig) {
    if user.mode.is_some() {
        base.mode = user.mode;
    }
    if user.transmitter_port.is_some() {
        base.transmitter_port = user.transmitter_port;
    }
    if user.receiver_timeout_ms.is_some() {
        base.receiver_timeout_ms = user.receiver_timeout_ms;
    }
    if user.active_sense_ms.is_some() {
        base.active_sense_ms = user.active_sense_ms;
    }
}

fn parse_accent_target(s: &str) -> Option<AccentTarget> {
    match s.to_lowercase().as_str() {
        "velocity" => Some(AccentTarget::Velocity),
        "note" => Some(AccentTarget::Note),
        _ => None,
    }
}

pub fn parse_clock_mode(s: &str) -> Option<ClockMode> {
    match s.to_lowercase().as_str() {
        "standalone" => Some(ClockMode::Standalone),
        "transmitter" | "transmit" => Some(ClockMode::Transmitter),
        "receiver" | "receive" => Some(ClockMode::Receiver),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::load_from(None);
        assert_eq!(config.tempo(), 120);
        assert_eq!(config.subdivisions(), 2);
        assert_eq!(config.clock_mode(), ClockMode::Standalone);
        assert_eq!(config.transmitter_port(), "gridseq-transmitter");
        assert_eq!(config.receiver_timeout(), Duration::from_millis(330));
        assert_eq!(config.active_sense_interval(), Duration::from_millis(300));
        assert_eq!(config.ratchet_gate(), Duration::from_millis(20));
        assert_eq!(config.max_gate_length(), 32);
        assert_eq!(config.output_port(), "");

        let definition = config.definition();
        assert_eq!(definition.lines.len(), 8);
        assert_eq!(definition.lines[0].note, 36);
        assert_eq!(definition.lines[0].channel, 10);
        assert_eq!(definition.parts[0].beats, 32);
        assert_eq!(definition.accents.data[1], 120);
    }

    #[test]
    fn test_user_config_overrides_subset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[defaults]\ntempo = 96\n\n[clock]\nmode = \"transmitter\"\n\n[accents]\ntarget = \"note\""
        )
        .unwrap();

        let config = Config::load_from(Some(file.path()));
        assert_eq!(config.tempo(), 96);
        assert_eq!(config.clock_mode(), ClockMode::Transmitter);
        assert_eq!(config.accents().target, AccentTarget::Note);
        // untouched keys keep the embedded values
        assert_eq!(config.subdivisions(), 2);
        assert_eq!(config.accents().start, 120);
    }

    #[test]
    fn test_malformed_user_config_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[defaults\ntempo = ").unwrap();
        let config = Config::load_from(Some(file.path()));
        assert_eq!(config.tempo(), 120);
    }

    #[test]
    fn test_subdivisions_must_divide_pulses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[defaults]\nsubdivisions = 5").unwrap();
        let config = Config::load_from(Some(file.path()));
        assert_eq!(config.subdivisions(), 2);
    }

    #[test]
    fn test_parse_clock_mode() {
        assert_eq!(parse_clock_mode("Receiver"), Some(ClockMode::Receiver));
        assert_eq!(parse_clock_mode("transmit"), Some(ClockMode::Transmitter));
        assert_eq!(parse_clock_mode("nope"), None);
    }
}
