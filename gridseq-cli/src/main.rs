use std::fs::File;
use std::sync::Arc;

use gridseq_core::clock::ClockMode;
use gridseq_core::config::parse_clock_mode;
use gridseq_core::midi::output_ports;
use gridseq_core::{
    spawn_clock, ClockSettings, Config, Engine, EngineEvent, EngineState, MidiSender, MidirSender,
    NoteScheduler, NoteSettings,
};
use gridseq_types::{euclidean_rhythm, GridKey, LoopMode, Node, Note, Section};

fn init_logging(verbose: bool) {
    use simplelog::{LevelFilter, WriteLogger};

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("gridseq")
        .join("gridseq.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/gridseq.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("gridseq: cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, simplelog::Config::default(), log_file) {
        eprintln!("gridseq: cannot initialize logger: {}", e);
        return;
    }

    log::info!("gridseq starting (log level: {:?})", log_level);
}

struct Args {
    verbose: bool,
    list_ports: bool,
    clock_mode: Option<ClockMode>,
    port: Option<String>,
    euclid: Option<usize>,
    cycles: Option<u32>,
    loop_mode: LoopMode,
}

fn flag_value<'a>(args: &'a [String], names: &[&str]) -> Option<&'a String> {
    args.iter()
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1))
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let has = |names: &[&str]| args.iter().any(|a| names.contains(&a.as_str()));

    let clock_mode = if has(&["--transmit"]) {
        Some(ClockMode::Transmitter)
    } else if has(&["--receive"]) {
        Some(ClockMode::Receiver)
    } else {
        match flag_value(args, &["--clock"]) {
            Some(mode) => Some(
                parse_clock_mode(mode).ok_or_else(|| format!("unknown clock mode {:?}", mode))?,
            ),
            None => None,
        }
    };

    let euclid: Option<usize> = flag_value(args, &["--euclid"])
        .map(|s| s.parse().map_err(|_| format!("--euclid expects a hit count, got {:?}", s)))
        .transpose()?;
    let cycles: Option<u32> = flag_value(args, &["--cycles"])
        .map(|s| s.parse().map_err(|_| format!("--cycles expects a number, got {:?}", s)))
        .transpose()?;

    let loop_mode = match flag_value(args, &["--loop"]).map(String::as_str) {
        None => LoopMode::AllSections,
        Some("overlay") => LoopMode::LoopOverlay,
        Some("part") => LoopMode::LoopPart,
        Some("all") => LoopMode::LoopWholeSequence,
        Some(other) => return Err(format!("unknown loop mode {:?}", other)),
    };

    Ok(Args {
        verbose: has(&["--verbose", "-v"]),
        list_ports: has(&["--list-ports"]),
        clock_mode,
        port: flag_value(args, &["--port", "-p"]).cloned(),
        euclid,
        cycles,
        loop_mode,
    })
}

/// A blank sequence from config with a Euclidean rhythm on the first line.
fn build_state(config: &Config, args: &Args) -> EngineState {
    let mut definition = config.definition();
    let beats = definition.parts[0].beats;
    let hits = args.euclid.unwrap_or(beats as usize / 4);

    let root = definition.parts[0].overlays.root_mut();
    for (beat, hit) in euclidean_rhythm(hits, beats as usize).into_iter().enumerate() {
        if hit {
            root.set_note(GridKey::new(0, beat as u8), Note::init());
        }
    }

    if let Some(cycles) = args.cycles {
        definition.arrangement.root.children = vec![Node::Section(Section {
            cycles,
            ..Section::new(0)
        })];
    }

    let mut state = EngineState::new(definition);
    state.play_state.loop_mode = args.loop_mode;
    state
}

fn open_output(filter: &str) -> Result<MidirSender, String> {
    MidirSender::connect(filter).map_err(|e| {
        let available = output_ports()
            .map(|ports| {
                ports
                    .into_iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        format!("{} (available: {})", e, available)
    })
}

fn run(args: Args) -> Result<(), String> {
    let config = Config::load();

    if args.list_ports {
        for port in output_ports().map_err(|e| e.to_string())? {
            println!("{}: {}", port.index, port.name);
        }
        return Ok(());
    }

    let mode = args.clock_mode.unwrap_or_else(|| config.clock_mode());
    let port_filter = args.port.as_deref().unwrap_or(config.output_port());
    let out: Arc<dyn MidiSender> = Arc::new(open_output(port_filter)?);

    let mut state = build_state(&config, &args);
    let settings = ClockSettings {
        transmitter_port: config.transmitter_port().to_string(),
        receiver_timeout: config.receiver_timeout(),
        active_sense_interval: config.active_sense_interval(),
        ..ClockSettings::new(mode, state.definition.tempo, state.definition.subdivisions)
    };

    let (errors_tx, errors_rx) = crossbeam_channel::unbounded();
    let (clock_tx, clock_rx) = crossbeam_channel::unbounded();
    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    let clock = spawn_clock(settings, clock_tx, errors_tx.clone()).map_err(|e| e.to_string())?;
    state.clock_mode = clock.mode();
    let scheduler = NoteScheduler::spawn(
        out,
        NoteSettings::new(config.ratchet_gate(), config.max_gate_length()),
        errors_tx,
    )
    .map_err(|e| e.to_string())?;
    let engine = Engine::spawn(
        state.clone(),
        scheduler,
        clock.commands(),
        clock_rx,
        errors_rx,
        events_tx,
    )
    .map_err(|e| e.to_string())?;

    if mode == ClockMode::Receiver {
        println!("waiting for a transmitter on {:?}", config.transmitter_port());
    } else {
        state.play_state.playing = true;
        engine.update(state.clone()).map_err(|e| e.to_string())?;
        println!("playing at {} bpm", state.definition.tempo);
    }

    for event in events_rx.iter() {
        match event {
            EngineEvent::Played(played) => {
                if played.cursor.path() != state.cursor.path() {
                    log::debug!("section {:?}", played.cursor.path());
                }
                state.play_state = played.play_state;
                state.cursor = played.cursor;
                if played.perform_stop {
                    println!("arrangement finished");
                    break;
                }
            }
            EngineEvent::RemoteStart { loop_mode } => {
                state.play_state.playing = true;
                state.play_state.loop_mode = loop_mode;
                engine.update(state.clone()).map_err(|e| e.to_string())?;
                println!("transmitter started");
            }
            EngineEvent::RemoteStop => {
                state.play_state.playing = false;
                engine.update(state.clone()).map_err(|e| e.to_string())?;
                println!("transmitter stopped");
            }
            EngineEvent::TransmitterConnected(connected) => {
                log::info!("transmitter connected: {}", connected);
                if !connected {
                    println!("transmitter disconnected");
                }
            }
            EngineEvent::Error(e) => eprintln!("gridseq: {}", e),
        }
    }

    drop(engine);
    drop(clock);
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("gridseq: {}", e);
            std::process::exit(2);
        }
    };
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("gridseq: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        std::iter::once("gridseq")
            .chain(line.split_whitespace())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_flags() {
        let parsed = parse_args(&args("-v --receive --euclid 5 --cycles 0 --loop part")).unwrap();
        assert!(parsed.verbose);
        assert_eq!(parsed.clock_mode, Some(ClockMode::Receiver));
        assert_eq!(parsed.euclid, Some(5));
        assert_eq!(parsed.cycles, Some(0));
        assert_eq!(parsed.loop_mode, LoopMode::LoopPart);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_args(&args("--euclid many")).is_err());
        assert!(parse_args(&args("--loop sideways")).is_err());
        assert!(parse_args(&args("--clock pendulum")).is_err());
    }

    #[test]
    fn euclid_fills_first_line() {
        let config = Config::load_from(None);
        let parsed = parse_args(&args("--euclid 3 --cycles 2")).unwrap();
        let state = build_state(&config, &parsed);
        let part = &state.definition.parts[0];
        let placed: Vec<u8> = part.overlays.root().notes.keys().map(|k| k.beat).collect();
        assert_eq!(placed.len(), 3);
        assert!(placed.contains(&0));
        assert!(part.overlays.root().notes.keys().all(|k| k.line == 0));
        let section = state.cursor.section(&state.definition.arrangement).unwrap();
        assert_eq!(section.cycles, 2);
    }
}
