use std::env;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use colored::*;

use v2verifier::bsm::Trace;
use v2verifier::config::{self, SimConfig, PRODUCTION_PORT};
use v2verifier::gui::GuiMode;
use v2verifier::keystore::FileKeyStore;
use v2verifier::metrics::MetricsConfig;
use v2verifier::receiver::{self, ReceiverConfig};
use v2verifier::types::SignatureScheme;
use v2verifier::vehicle::{TransmitConfig, Vehicle};
use v2verifier::SimError;

/// Link technology choice; carried for presentation, does not alter the
/// core behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TechChoice {
    Dsrc,
    Cv2x,
}

impl TechChoice {
    fn label(&self) -> &'static str {
        match self {
            TechChoice::Dsrc => "DSRC",
            TechChoice::Cv2x => "C-V2X",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimMode {
    Transmitter,
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgramArgs {
    tech: TechChoice,
    mode: SimMode,
    gui: GuiMode,
    test: bool,
}

fn print_usage() {
    eprintln!(
        "Usage: v2verifier {{dsrc | cv2x}} {{transmitter | receiver}} {{tkgui | webgui | nogui}} [--test]"
    );
}

/// Strictly positional grammar: three required arguments, then an optional
/// `--test`. Anything else is rejected.
fn parse_args(args: &[String]) -> Result<ProgramArgs, String> {
    if args.len() < 3 || args.len() > 4 {
        return Err(format!("expected 3 or 4 arguments, got {}", args.len()));
    }

    let tech = match args[0].as_str() {
        "dsrc" => TechChoice::Dsrc,
        "cv2x" => TechChoice::Cv2x,
        other => return Err(format!("first argument must be dsrc or cv2x, got {:?}", other)),
    };
    let mode = match args[1].as_str() {
        "transmitter" => SimMode::Transmitter,
        "receiver" => SimMode::Receiver,
        other => {
            return Err(format!(
                "second argument must be transmitter or receiver, got {:?}",
                other
            ))
        }
    };
    let gui = match args[2].as_str() {
        "tkgui" => GuiMode::Tk,
        "webgui" => GuiMode::Web,
        "nogui" => GuiMode::None,
        other => {
            return Err(format!(
                "third argument must be tkgui, webgui, or nogui, got {:?}",
                other
            ))
        }
    };
    let test = match args.get(3).map(String::as_str) {
        None => false,
        Some("--test") => true,
        Some(other) => {
            return Err(format!(
                "fourth argument can only be --test, got {:?}",
                other
            ))
        }
    };

    Ok(ProgramArgs {
        tech,
        mode,
        gui,
        test,
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{} {}", "✗".red().bold(), message);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(parsed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: ProgramArgs) -> Result<(), SimError> {
    let config_path = config::config_path_from_env();
    let config = config::load(&config_path)?;
    let port = if args.test {
        config.test_port
    } else {
        PRODUCTION_PORT
    };

    println!("{}", "═".repeat(64).cyan().bold());
    println!("{}", "  v2verifier: V2X message security simulator".cyan().bold());
    println!("{}", "═".repeat(64).cyan().bold());
    println!(
        "{} link {}, scheme {}, port {}{}",
        "→".green(),
        args.tech.label(),
        config.pqc.scheme.label(),
        port,
        if args.test { " (test mode)" } else { "" },
    );
    if config.pqc.scheme == SignatureScheme::Falcon {
        println!(
            "{} falcon fragment size {} bytes, compression {:?}",
            "→".green(),
            v2verifier::spdu::clamp_fragment_size(config.pqc.falcon_fragment_size),
            config.pqc.compression,
        );
    }

    match args.mode {
        SimMode::Transmitter => run_transmitter(&config, port),
        SimMode::Receiver => run_receiver(&config, port, args.gui),
    }
}

fn run_transmitter(config: &SimConfig, port: u16) -> Result<(), SimError> {
    let keys = FileKeyStore::new(".");

    // Provision every vehicle before any thread starts; key or trace
    // problems are fatal up front.
    let mut vehicles = Vec::new();
    for id in 0..config.num_vehicles {
        let trace_path = PathBuf::from("trace_files").join(format!("{}.csv", id));
        let trace = Trace::load(&trace_path)?;
        vehicles.push(Vehicle::provision(id, config.pqc.clone(), trace, &keys)?);
    }

    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let transmit_config = TransmitConfig::new(target, config.num_messages, config.loss_rate);

    println!(
        "{} transmitting {} messages from {} vehicle(s) to {}",
        "→".green(),
        config.num_messages,
        config.num_vehicles,
        target,
    );

    let mut workers = Vec::new();
    for vehicle in vehicles {
        let worker_config = transmit_config.clone();
        workers.push(thread::spawn(move || vehicle.transmit(&worker_config)));
    }

    let mut total_sent = 0u64;
    for worker in workers {
        let stats = worker
            .join()
            .map_err(|_| SimError::Socket(io::Error::other("transmit thread panicked")))??;
        total_sent += stats.sent_datagrams;
    }

    println!(
        "{} transmit complete: {} datagrams sent",
        "✓".green().bold(),
        total_sent,
    );
    Ok(())
}

fn run_receiver(config: &SimConfig, port: u16, gui: GuiMode) -> Result<(), SimError> {
    let keys = FileKeyStore::new(".");

    let mut receiver_config =
        ReceiverConfig::new(port, config.expected_total(), config.pqc.scheme);
    receiver_config.gui = gui;
    receiver_config.metrics = MetricsConfig::from_env();

    println!(
        "{} listening on port {} for {} SPDU(s)",
        "→".green(),
        port,
        receiver_config.expected_total,
    );

    let summary = receiver::run(&receiver_config, &keys)?;

    println!(
        "{} receive complete: {} SPDUs, {} valid, {} still pending",
        if summary.watchdog_fired {
            "✗".red().bold()
        } else {
            "✓".green().bold()
        },
        summary.completed,
        summary.valid,
        summary.pending_left,
    );
    Ok(())
}
