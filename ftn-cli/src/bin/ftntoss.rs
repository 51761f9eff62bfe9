//! `ftntoss` — scan network inboxes and toss packets into mailboxes,
//! the news spool and the outbound queue.

use std::process::ExitCode;

use clap::Parser;
use ftn::control::{ControlChannel, PidFile};
use ftn::toss::{self, Tosser};
use ftn_cli::{load_config, CliArgs, RunError};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => e.report("ftntoss"),
    }
}

fn run(args: CliArgs) -> Result<(), RunError> {
    let config = load_config(&args)?;
    ftn_cli::init_logging(&args, &config);
    let runtime = ftn_cli::runtime()?;

    runtime.block_on(async {
        if args.daemon {
            let _pid_file = match &config.daemon.pid_file {
                Some(path) => Some(PidFile::create(path).map_err(RunError::Startup)?),
                None => None,
            };
            let control = ControlChannel::install().map_err(RunError::Startup)?;
            toss::run_daemon(config, args.sleep_override(), control)
                .await
                .map_err(RunError::Runtime)
        } else {
            let stats = Tosser::new(config).run_once().map_err(RunError::Runtime)?;
            log::info!("{stats}");
            Ok(())
        }
    })
}
