use midiseq::config::SequencerConfig;
use midiseq::messaging::channels::create_input_channel;
use midiseq::midi::device::MidiDeviceManager;
use midiseq::midi::input::MidiInput;
use midiseq::midi::output::MidiOutput;
use midiseq::midi::sink::{NullSink, SoundSink};
use midiseq::sequencer::{Player, PlayerOptions, Sequence, SystemClock, TimeBase};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

// Incoming MIDI burst headroom between two scheduler iterations
const INPUT_RINGBUFFER_CAPACITY: usize = 512;

/// Interactive command, parsed from one stdin line
#[derive(Debug, Clone, PartialEq)]
enum CliCommand {
    Play,
    Pause,
    Stop,
    Position,
    Goto(i64),
    Rewind,
    Forward,
    Start,
    End,
    Bpm(f64),
    Loop,
    LoopRegion(i64, i64),
    LeftLocator(i64),
    RightLocator(i64),
    StartLoop(i64),
    EndLoop(i64),
    Click,
    Record,
    Quantize(usize),
    Resolution(i64),
    Mute(usize),
    Solo(usize),
    Arm(usize),
    Erase(usize),
    Delete(usize),
    Undo,
    Redo,
    Open(PathBuf),
    Save(PathBuf),
    Info { json: bool },
    Ports,
    Panic,
    Help,
    Quit,
}

// (name, arguments, description)
const COMMANDS: &[(&str, &str, &str)] = &[
    ("play", "", "start playback"),
    ("pause", "", "pause playback"),
    ("stop", "", "stop and rewind"),
    ("pos", "", "show the position"),
    ("goto", "<bar>", "go to a bar (1-based)"),
    ("rew", "", "one bar back"),
    ("fwd", "", "one bar forward"),
    ("start", "", "go to the start"),
    ("end", "", "go to the end"),
    ("bpm", "<bpm>", "set the tempo"),
    ("loop", "[<start> <end>]", "toggle looping, or set the loop in ticks"),
    ("lloc", "<bar>", "set the left locator"),
    ("rloc", "<bar>", "set the right locator"),
    ("sloop", "<bar>", "set the loop start"),
    ("eloop", "<bar>", "set the loop end"),
    ("click", "", "toggle the metronome"),
    ("rec", "", "toggle recording"),
    ("quant", "<track>", "quantize a track"),
    ("res", "<div>", "set the quantize resolution"),
    ("mute", "<track>", "toggle mute"),
    ("solo", "<track>", "toggle solo"),
    ("arm", "<track>", "arm a track for recording"),
    ("erase", "<track>", "erase a track's events"),
    ("del", "<track>", "delete a track"),
    ("undo", "", "undo the last edit"),
    ("redo", "", "redo the last undone edit"),
    ("open", "<file>", "load a MIDI file"),
    ("save", "<file>", "save as a MIDI file"),
    ("info", "[--json]", "show the sequence properties"),
    ("ports", "", "list MIDI ports"),
    ("panic", "", "all notes off"),
    ("help", "", "show this help"),
    ("quit", "", "exit"),
];

fn parse_arg<T: std::str::FromStr>(arg: Option<&str>, usage: &str) -> Result<T, String> {
    arg.and_then(|value| value.parse().ok())
        .ok_or_else(|| format!("usage: {}", usage))
}

fn parse_command(line: &str) -> Result<Option<CliCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();

    let command = match name {
        "play" | "p" => CliCommand::Play,
        "pause" => CliCommand::Pause,
        "stop" | "s" => CliCommand::Stop,
        "pos" => CliCommand::Position,
        "goto" => CliCommand::Goto(parse_arg(arg, "goto <bar>")?),
        "rew" => CliCommand::Rewind,
        "fwd" => CliCommand::Forward,
        "start" => CliCommand::Start,
        "end" => CliCommand::End,
        "bpm" => CliCommand::Bpm(parse_arg(arg, "bpm <bpm>")?),
        "loop" => match arg {
            None => CliCommand::Loop,
            Some(_) => CliCommand::LoopRegion(
                parse_arg(arg, "loop <start> <end>")?,
                parse_arg(parts.next(), "loop <start> <end>")?,
            ),
        },
        "lloc" => CliCommand::LeftLocator(parse_arg(arg, "lloc <bar>")?),
        "rloc" => CliCommand::RightLocator(parse_arg(arg, "rloc <bar>")?),
        "sloop" => CliCommand::StartLoop(parse_arg(arg, "sloop <bar>")?),
        "eloop" => CliCommand::EndLoop(parse_arg(arg, "eloop <bar>")?),
        "click" => CliCommand::Click,
        "rec" | "r" => CliCommand::Record,
        "quant" => CliCommand::Quantize(parse_arg(arg, "quant <track>")?),
        "res" => CliCommand::Resolution(parse_arg(arg, "res <div>")?),
        "mute" => CliCommand::Mute(parse_arg(arg, "mute <track>")?),
        "solo" => CliCommand::Solo(parse_arg(arg, "solo <track>")?),
        "arm" => CliCommand::Arm(parse_arg(arg, "arm <track>")?),
        "erase" => CliCommand::Erase(parse_arg(arg, "erase <track>")?),
        "del" => CliCommand::Delete(parse_arg(arg, "del <track>")?),
        "undo" | "u" => CliCommand::Undo,
        "redo" => CliCommand::Redo,
        "open" => CliCommand::Open(PathBuf::from(arg.ok_or("usage: open <file>")?)),
        "save" => CliCommand::Save(PathBuf::from(arg.ok_or("usage: save <file>")?)),
        "info" => CliCommand::Info {
            json: arg == Some("--json"),
        },
        "ports" => CliCommand::Ports,
        "panic" => CliCommand::Panic,
        "help" | "?" => CliCommand::Help,
        "quit" | "q" | "exit" => CliCommand::Quit,
        other => return Err(format!("unknown command: {} (try 'help')", other)),
    };
    Ok(Some(command))
}

fn print_help() {
    for (name, args, description) in COMMANDS {
        println!("  {:<6} {:<16} {}", name, args, description);
    }
}

fn print_ports() {
    let manager = MidiDeviceManager::new();
    println!("Outputs:");
    for port in manager.list_output_ports() {
        println!("  {}: {}", port.index, port.name);
    }
    println!("Inputs:");
    for port in manager.list_input_ports() {
        println!("  {}: {}", port.index, port.name);
    }
}

/// First tick of a 1-based bar
fn bar_tick(player: &Player, bar: i64) -> i64 {
    player.with_sequence(|seq| seq.base().bar_to_tick(bar - 1))
}

/// Run one command; returns false when the session should end
fn execute(player: &mut Player, command: CliCommand) -> bool {
    let result = match command {
        CliCommand::Play => {
            player.play();
            Ok(())
        }
        CliCommand::Pause => {
            player.pause();
            Ok(())
        }
        CliCommand::Stop => {
            player.stop();
            Ok(())
        }
        CliCommand::Position => {
            println!("{} ({})", player.position_display(), player.state());
            Ok(())
        }
        CliCommand::Goto(bar) => {
            player.goto_bar(bar);
            Ok(())
        }
        CliCommand::Rewind => {
            player.rewind();
            Ok(())
        }
        CliCommand::Forward => {
            player.forward();
            Ok(())
        }
        CliCommand::Start => {
            player.goto_start();
            Ok(())
        }
        CliCommand::End => {
            player.goto_end();
            Ok(())
        }
        CliCommand::Bpm(bpm) => player.set_bpm(bpm),
        CliCommand::Loop => {
            let looping = player.toggle_loop();
            println!("Loop {}", if looping { "on" } else { "off" });
            Ok(())
        }
        CliCommand::LoopRegion(start, end) => player.set_loop_region(start, end),
        CliCommand::LeftLocator(bar) => {
            let tick = bar_tick(player, bar);
            println!("Left locator: {}", player.set_left_locator(tick));
            Ok(())
        }
        CliCommand::RightLocator(bar) => {
            let tick = bar_tick(player, bar);
            println!("Right locator: {}", player.set_right_locator(tick));
            Ok(())
        }
        CliCommand::StartLoop(bar) => {
            let tick = bar_tick(player, bar);
            println!("Loop start: {}", player.set_start_loop(tick));
            Ok(())
        }
        CliCommand::EndLoop(bar) => {
            let tick = bar_tick(player, bar);
            println!("Loop end: {}", player.set_end_loop(tick));
            Ok(())
        }
        CliCommand::Click => {
            let clicking = player.toggle_click();
            println!("Click {}", if clicking { "on" } else { "off" });
            Ok(())
        }
        CliCommand::Record => {
            player.toggle_record();
            Ok(())
        }
        CliCommand::Quantize(track) => player.quantize_track(track).map(|moved| {
            println!("{} events moved", moved);
        }),
        CliCommand::Resolution(res) => player.set_quantize_resolution(res).map(|step| {
            println!("Quantize step: {} ticks", step);
        }),
        CliCommand::Mute(track) => player.toggle_mute(track).map(|_| ()),
        CliCommand::Solo(track) => player.toggle_solo(track).map(|_| ()),
        CliCommand::Arm(track) => player.arm(track).map(|_| ()),
        CliCommand::Erase(track) => player.erase_track(track, None).map(|removed| {
            println!("{} events erased", removed);
        }),
        CliCommand::Delete(track) => player.delete_track(track),
        CliCommand::Undo => player.undo().map(|desc| println!("Undo {}", desc)),
        CliCommand::Redo => player.redo().map(|desc| println!("Redo {}", desc)),
        CliCommand::Open(path) => player.load_file(&path),
        CliCommand::Save(path) => player.save_file(&path),
        CliCommand::Info { json: true } => {
            match serde_json::to_string_pretty(&player.summary()) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to serialize summary: {}", e),
            }
            Ok(())
        }
        CliCommand::Info { json: false } => {
            println!("{}", player.properties());
            Ok(())
        }
        CliCommand::Ports => {
            print_ports();
            Ok(())
        }
        CliCommand::Panic => {
            player.panic();
            Ok(())
        }
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Quit => return false,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }
    true
}

fn open_sink(config: &SequencerConfig) -> Arc<dyn SoundSink> {
    match MidiOutput::connect(config.output_port.as_deref()) {
        Ok(output) => {
            println!("Output: {}", output.port_name());
            Arc::new(output)
        }
        Err(e) => {
            eprintln!("Warning: {} (playing to a null sink)", e);
            Arc::new(NullSink)
        }
    }
}

/// Command line: `[--config <file>] [--port <name>] [song.mid]`
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    port: Option<String>,
    file: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a file")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--port" | "-p" => {
                parsed.port = Some(args.next().ok_or("--port needs a name")?);
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {}", other));
            }
            _ if parsed.file.is_none() => parsed.file = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument: {}", arg)),
        }
    }
    Ok(parsed)
}

/// Empty song built from the configured resolution, tempo and meter
fn new_sequence(config: &SequencerConfig) -> Sequence {
    let mut base = TimeBase::new(config.ppq);
    if !base.set_bpm(config.bpm) {
        eprintln!("Warning: invalid tempo {} in config, using {}", config.bpm, base.bpm());
    }
    if !base.set_time_signature(config.numerator, config.denominator) {
        eprintln!(
            "Warning: invalid time signature {}/{} in config",
            config.numerator, config.denominator
        );
    }
    let mut sequence = Sequence::from_base(base);
    sequence.new_sequence(config.track_count);
    sequence
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== midiseq ===");
    println!("Version {}\n", env!("CARGO_PKG_VERSION"));

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("usage: midiseq [--config <file>] [--port <name>] [song.mid]");
            return;
        }
    };

    let mut config = match &args.config {
        Some(path) => match SequencerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return;
            }
        },
        None => SequencerConfig::load_or_default(),
    };
    if args.port.is_some() {
        config.output_port = args.port.clone();
    }
    let sink = open_sink(&config);

    let mut sequence = match &args.file {
        Some(path) => match midiseq::midi::file::load_sequence(path) {
            Ok(sequence) => {
                println!("Loaded {}", path.display());
                sequence
            }
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return;
            }
        },
        None => new_sequence(&config),
    };

    sequence.set_quantize_resolution(config.quantize_resolution);
    let mut player = Player::new(sequence, sink, PlayerOptions::from(&config));

    let (input_tx, input_rx) = create_input_channel(INPUT_RINGBUFFER_CAPACITY);
    let _input = match MidiInput::connect(config.input_port.as_deref(), input_tx) {
        Ok(input) => {
            println!("Input: {}", input.port_name());
            Some(input)
        }
        Err(e) => {
            eprintln!("Warning: {} (recording disabled)", e);
            None
        }
    };

    if let Err(e) = player.start(SystemClock::new(), Some(input_rx)) {
        eprintln!("Failed to start the sequencer: {}", e);
        return;
    }

    println!("Type 'help' for the command list\n");
    let stdin = io::stdin();
    loop {
        for notification in player.poll_notifications() {
            println!("{}", notification);
        }
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Failed to read input: {}", e);
                break;
            }
        }

        match parse_command(&line) {
            Ok(Some(command)) => {
                if !execute(&mut player, command) {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => eprintln!("{}", message),
        }
    }

    player.shutdown();
    println!("Bye");
}
