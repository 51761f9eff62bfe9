//! `ftnmail` — dial hubs on their poll schedule and exchange packet
//! files over binkp.

use std::process::ExitCode;

use clap::Parser;
use ftn::control::{ControlChannel, PidFile};
use ftn::mailer::{self, Mailer};
use ftn_cli::{load_config, CliArgs, RunError};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => e.report("ftnmail"),
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
            mailer::run_daemon(config, args.sleep_override(), control)
                .await
                .map_err(RunError::Runtime)
        } else {
            let mut mailer = Mailer::new(config);
            let polled = mailer.poll_due().await;
            log::info!("polled {polled} network(s)");
            Ok(())
        }
    })
}
