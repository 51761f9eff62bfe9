//! Shared plumbing for the `ftntoss` and `ftnmail` binaries: argument
//! parsing, logger setup and exit-code policy.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use ftn::Config;

/// Command-line arguments common to both daemons.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Configuration file.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// Keep running, rescanning on an interval, and react to signals.
    #[arg(short = 'd', long = "daemon")]
    pub daemon: bool,

    /// Override the daemon sleep interval, in seconds.
    #[arg(short = 's', long = "sleep", value_name = "SECONDS")]
    pub sleep: Option<u64>,

    /// Increase log verbosity; repeat for trace output.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    pub fn sleep_override(&self) -> Option<std::time::Duration> {
        self.sleep.map(std::time::Duration::from_secs)
    }
}

/// Why the program is exiting, mapped onto the documented exit codes:
/// 1 for configuration/startup trouble, 2 for runtime failure.
pub enum RunError {
    Startup(ftn::Error),
    Runtime(ftn::Error),
}

impl RunError {
    pub fn report(self, program: &str) -> ExitCode {
        match self {
            RunError::Startup(e) => {
                eprintln!("{program}: {e}");
                ExitCode::from(1)
            }
            RunError::Runtime(e) => {
                log::error!("{e}");
                ExitCode::from(2)
            }
        }
    }
}

/// Loads the configuration or exits with code 1 semantics.
pub fn load_config(args: &CliArgs) -> Result<Arc<Config>, RunError> {
    Config::load(&args.config)
        .map(Arc::new)
        .map_err(RunError::Startup)
}

/// Initializes env_logger: `-v` raises the configured level to debug,
/// `-vv` to trace; `RUST_LOG` still wins when set.
///
/// The logger itself passes everything and the global max-level gate
/// does the filtering, so the daemons' USR2 handler can raise and
/// lower verbosity at runtime.
pub fn init_logging(args: &CliArgs, config: &Config) {
    let configured = match args.verbose {
        0 => config
            .logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Trace);
    let explicit_spec = std::env::var("RUST_LOG").ok();
    if let Some(spec) = &explicit_spec {
        builder.parse_filters(spec);
    }
    builder.init();
    if explicit_spec.is_none() {
        log::set_max_level(configured);
    }
    log::debug!(
        "{} starting with configuration {}",
        config.logging.ident,
        args.config.display()
    );
}

/// A current-thread runtime; both daemons are single cooperative loops.
pub fn runtime() -> Result<tokio::runtime::Runtime, RunError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| RunError::Startup(ftn::Error::Io(e)))
}
