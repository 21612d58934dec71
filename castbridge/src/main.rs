mod app;
mod cli;
mod daemon;
mod logging;
mod net;

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let daemonized = daemon::is_daemonized();
    let log_level = logging::init_logging(!daemonized);

    if cli.daemon && !daemonized {
        return match daemon::daemonize() {
            Ok(pid) => {
                info!("Daemon started (pid {}).", pid);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("An unhandled error occurred: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("An unhandled error occurred: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(app::run(cli, log_level)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("An unhandled error occurred: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
