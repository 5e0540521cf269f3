//! Charwise Command Console
//!
//! Runs the demo command set over stdin or a file, one byte at a time, and
//! prints what each command did.

use std::cell::{Cell, RefCell};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use charwise::commands::{
    command_set, motor_command, ping, single_command, MotorCommand, MotorFields,
};
use charwise::config::Config;
use charwise::driver::{ByteSource, Driver, DriverStats, Event, ReaderSource};
use charwise::Grammar;

use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// What a completed command asked for
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Response {
    Pong,
    Stop,
    Motor(MotorCommand),
}

#[derive(Serialize)]
struct Summary {
    responses: Vec<Response>,
    diagnostics: Vec<String>,
    help_requests: usize,
    stats: DriverStats,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut input_file: Option<PathBuf> = None;
    let mut config_file: Option<PathBuf> = None;
    let mut output_format = OutputFormat::Text;
    let mut show_help = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-i" | "--input" => {
                i += 1;
                if i < args.len() {
                    input_file = Some(PathBuf::from(&args[i]));
                }
            },
            "-c" | "--config" => {
                i += 1;
                if i < args.len() {
                    config_file = Some(PathBuf::from(&args[i]));
                }
            },
            "-j" | "--json" => {
                output_format = OutputFormat::Json;
            },
            "-h" | "--help" => {
                show_help = true;
            },
            _ => {
                if input_file.is_none() && !args[i].starts_with('-') {
                    input_file = Some(PathBuf::from(&args[i]));
                }
            },
        }
        i += 1;
    }

    if show_help {
        print_help();
        return ExitCode::SUCCESS;
    }

    let config = match &config_file {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            },
        },
        // Logging is not up yet, so a bad default config is reported here
        None => match Config::default_path() {
            Some(path) => Config::load_if_exists(&path).unwrap_or_else(|e| {
                eprintln!("Ignoring config '{}': {}", path.display(), e);
                Config::default()
            }),
            None => Config::default(),
        },
    };

    // RUST_LOG wins over the configured filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let input: Box<dyn Read> = match &input_file {
        Some(path) => match std::fs::File::open(path) {
            Ok(file) => Box::new(io::BufReader::new(file)),
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            },
        },
        None => Box::new(io::stdin().lock()),
    };

    let responses = RefCell::new(Vec::new());
    let fields = MotorFields::default();
    let running = Cell::new(true);

    let mut grammar = Grammar::new();
    let root = match build_commands(&mut grammar, &fields, &responses, &running, &config) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error building command set: {}", e);
            return ExitCode::FAILURE;
        },
    };
    let mut driver = match Driver::new(grammar, root, &config) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("Error starting driver: {}", e);
            return ExitCode::FAILURE;
        },
    };

    let mut source = ReaderSource::new(input);
    let mut summary = Summary {
        responses: Vec::new(),
        diagnostics: Vec::new(),
        help_requests: 0,
        stats: DriverStats::default(),
    };

    loop {
        let byte = match source.poll_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                return ExitCode::FAILURE;
            },
        };
        let event = match driver.feed_byte(byte) {
            Ok(event) => event,
            Err(e) => {
                eprintln!("Error driving command loop: {}", e);
                return ExitCode::FAILURE;
            },
        };

        for response in responses.borrow_mut().drain(..) {
            if output_format == OutputFormat::Text {
                print_response(&response);
            }
            summary.responses.push(response);
        }

        match event {
            Event::Accepted | Event::Rejected(None) => {},
            Event::Rejected(Some(diagnostic)) => {
                let text = diagnostic.to_string();
                if output_format == OutputFormat::Text && config.echo_diagnostics {
                    print!("{}", text);
                }
                summary.diagnostics.push(text);
            },
            Event::Help(text) => {
                if output_format == OutputFormat::Text {
                    print!("{}", text);
                }
                summary.help_requests += 1;
            },
        }

        if !running.get() {
            break;
        }
    }
    summary.stats = driver.stats();

    if output_format == OutputFormat::Json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing summary: {}", e);
                return ExitCode::FAILURE;
            },
        }
    }

    ExitCode::SUCCESS
}

/// Ping, stop, quit and the motor command, in one loop
fn build_commands<'a>(
    grammar: &mut Grammar<'a>,
    fields: &'a MotorFields,
    responses: &'a RefCell<Vec<Response>>,
    running: &'a Cell<bool>,
    config: &Config,
) -> charwise::parser::GrammarResult<charwise::NodeId> {
    let pong = ping(grammar, move || responses.borrow_mut().push(Response::Pong))?;
    let stop = single_command(grammar, "stop s", b's', move || {
        responses.borrow_mut().push(Response::Stop)
    })?;
    let quit = single_command(grammar, "quit q", b'q', move || running.set(false))?;
    let motor = motor_command(grammar, fields, move |command| {
        responses.borrow_mut().push(Response::Motor(command))
    })?;
    command_set(grammar, &[pong, stop, quit, motor], config.help_enabled)
}

fn print_response(response: &Response) {
    match response {
        Response::Pong => println!("pong"),
        Response::Stop => println!("stop"),
        Response::Motor(command) => println!(
            "motor {} at {} hz for {} steps",
            command.motor, command.hz, command.steps
        ),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn print_help() {
    println!("Charwise Command Console");
    println!();
    println!("Usage: charwise-console [OPTIONS] [INPUT_FILE]");
    println!();
    println!("Options:");
    println!("  -i, --input <PATH>   Read commands from file");
    println!("  -c, --config <PATH>  Load configuration from JSON file");
    println!("  -j, --json           Print a JSON summary instead of responses");
    println!("  -h, --help           Show this help message");
    println!();
    println!("If no input file is specified, reads from stdin.");
    println!();
    println!("Commands:");
    println!("  #                          ping");
    println!("  s                          stop");
    println!("  q                          quit");
    println!("  G <motor> <hz.f> <+|-><n>  run a motor");
    println!("Each command ends with a newline.");
    println!();
    println!("Examples:");
    println!("  printf '#\\nG 1 200.5 +1000\\n' | charwise-console");
    println!("  charwise-console --json commands.txt");
}
