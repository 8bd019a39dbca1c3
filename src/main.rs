use std::process;

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use tokio_util::sync::CancellationToken;

use qrumio::{
    config::{Config, DEFAULT_PORT},
    controller::Controller,
    error::Result,
    scanner::{Scanner, ZbarSource},
    signal,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Player host
    ///
    /// Hostname or address of the Volumio instance to control.
    #[arg(short = 'H', long, value_hint = ValueHint::Hostname, default_value_t = String::from("volumio.local"))]
    host: String,

    /// Player port
    ///
    /// Port of the Volumio socket.io API.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Code reader command
    ///
    /// Program and arguments used to read codes, one line per scan on
    /// stdout.
    ///
    /// [default: /usr/bin/zbarcam --nodisplay --prescale=300x250]
    #[arg(short, long, value_name = "COMMAND", num_args = 1.., value_hint = ValueHint::CommandName)]
    scanner: Option<Vec<String>>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Main application loop.
///
/// Connects to the player, spawns the code reader, and runs the scanner
/// loop until a shutdown signal arrives. A player that cannot be reached
/// at startup is not fatal: the loop keeps running and later commands
/// retry the connection.
///
/// # Errors
///
/// Returns an error when the code reader cannot be spawned or the signal
/// handler cannot be registered.
async fn run(args: Args) -> Result<()> {
    let mut config = Config::with_host(args.host);
    config.port = args.port;
    if let Some(scanner) = args.scanner {
        config.scanner_command = scanner;
    }

    // A player that is down at startup is degraded operation, not an
    // error exit: scanning continues and dispatch retries the connection.
    let mut player = Controller::new(&config);
    if let Err(e) = player.connect().await {
        error!("{e}");
    }

    let source = ZbarSource::spawn(&config.scanner_command)?;
    let mut scanner = Scanner::new(source, player);

    let cancel = CancellationToken::new();
    let mut signals = signal::Handler::new()?;
    let trigger = cancel.clone();
    tokio::spawn(async move {
        let signal = signals.recv().await;
        info!("received {signal}, shutting down gracefully");
        trigger.cancel();
    });

    scanner.run(cancel).await
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
