//! Termline receiver daemon.
//!
//! Binds one destination, registers interest in the given channels and
//! answers publishers with status messages.
//!
//! # Usage
//!
//! ```sh
//! termline-receiver --bind 0.0.0.0:40123 --channel 7 --channel 8
//! ```
//!
//! # Shutdown
//!
//! `SIGINT` (Ctrl-C) or `SIGTERM` stops both receiver threads and exits
//! cleanly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use termline::net::Endpoint;
use termline::receiver::{Receiver, ReceiverConfig, ReceiverError};
use termline::types::ChannelId;

/// Default bind address.
const DEFAULT_BIND: Endpoint = Endpoint::any(40_123);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing value for {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {flag}: {reason}")]
    InvalidValue { flag: &'static str, reason: String },
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error(transparent)]
    Receiver(#[from] ReceiverError),
}

fn main() {
    termline::init_tracing();
    if let Err(e) = run() {
        eprintln!("termline-receiver: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let args: Vec<String> = std::env::args().collect();
    let Some(config) = parse_args(&args)? else {
        print_usage();
        return Ok(());
    };

    eprintln!(
        "termline-receiver: starting on {} with {} channel(s)",
        config.bind_addr,
        config.channels.len()
    );

    let receiver = Receiver::spawn(config)?;

    let shutdown_flag = receiver.shutdown_flag();
    stop_on_signal(receiver.shutdown_flag())?;

    eprintln!("termline-receiver: ready on {}", receiver.local_addr());
    while !shutdown_flag.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }

    eprintln!("termline-receiver: shutting down...");
    receiver.shutdown()?;
    eprintln!("termline-receiver: stopped");

    Ok(())
}

/// Sets `flag` on `SIGINT` or `SIGTERM`.
fn stop_on_signal(flag: Arc<AtomicBool>) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        eprintln!("termline-receiver: signal received");
        flag.store(true, Ordering::Release);
    })?;
    Ok(())
}

fn value<'a>(args: &'a [String], i: usize, flag: &'static str) -> Result<&'a str, CliError> {
    args.get(i)
        .map(String::as_str)
        .ok_or(CliError::MissingValue(flag))
}

fn parsed<T>(args: &[String], i: usize, flag: &'static str) -> Result<T, CliError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value(args, i, flag)?
        .parse()
        .map_err(|e: T::Err| CliError::InvalidValue {
            flag,
            reason: e.to_string(),
        })
}

/// Parses command line arguments. Returns `None` when help was requested.
fn parse_args(args: &[String]) -> Result<Option<ReceiverConfig>, CliError> {
    let mut config = ReceiverConfig {
        bind_addr: DEFAULT_BIND,
        ..ReceiverConfig::default()
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                i += 1;
                let addr: SocketAddr = parsed(args, i, "--bind")?;
                config.bind_addr = Endpoint::from(addr);
            }
            "--channel" | "-c" => {
                i += 1;
                config
                    .channels
                    .push(ChannelId::new(parsed(args, i, "--channel")?));
            }
            "--term-length" => {
                i += 1;
                config.term_length = parsed(args, i, "--term-length")?;
            }
            "--initial-window" => {
                i += 1;
                config.initial_window_length = parsed(args, i, "--initial-window")?;
            }
            "--congestion-control" => {
                i += 1;
                config.congestion_control = parsed(args, i, "--congestion-control")?;
            }
            "--rcvbuf" => {
                i += 1;
                config.socket_rcvbuf = Some(parsed(args, i, "--rcvbuf")?);
            }
            "--help" | "-h" => return Ok(None),
            arg => return Err(CliError::UnknownArgument(arg.to_owned())),
        }
        i += 1;
    }

    Ok(Some(config))
}

fn print_usage() {
    eprintln!(
        r"termline-receiver - receive-side frame dispatcher

USAGE:
    termline-receiver [OPTIONS]

OPTIONS:
    -b, --bind <ADDR>               Bind address (default: 0.0.0.0:40123)
    -c, --channel <ID>              Register interest in a channel (can be repeated)
        --term-length <BYTES>       Term buffer length, power of two (default: 1048576)
        --initial-window <BYTES>    Initial receiver window (default: 131072)
        --congestion-control <KIND> Window strategy: static (default)
        --rcvbuf <BYTES>            SO_RCVBUF for the destination socket
    -h, --help                      Print this help message

SHUTDOWN:
    Ctrl-C (SIGINT) or SIGTERM for a graceful shutdown.

EXAMPLE:
    termline-receiver --bind 0.0.0.0:40123 --channel 7 --channel 8
"
    );
}
