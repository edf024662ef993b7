//! `browservisor` binary entrypoint: parse configuration, build the
//! orchestrator, run to completion, exit with the matching status code.

use std::sync::Arc;

use browservisor::orchestrator::exit_code;
use browservisor::{CliArgs, Orchestrator, ServerConfig};
use clap::Parser;

fn main() {
    let args = CliArgs::parse();
    let config = match ServerConfig::resolve(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(exit_code::STARTUP_FAILURE);
        }
    };

    if config.daemon {
        if !config.http {
            eprintln!("daemonizing with the stdio transport is forbidden");
            std::process::exit(exit_code::STARTUP_FAILURE);
        }
        // Fork-detach happens here, before the tokio runtime is built below:
        // a fork after the runtime's worker/reactor threads start would
        // orphan all of them but the calling thread.
        if let Err(e) = browservisor::orchestrator::daemonize(&config) {
            eprintln!("failed to daemonize: {e}");
            std::process::exit(exit_code::STARTUP_FAILURE);
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            std::process::exit(exit_code::STARTUP_FAILURE);
        }
    };

    let code = runtime.block_on(async move {
        let _tracing_guard = Orchestrator::init_tracing(&config);
        let orchestrator = Arc::new(Orchestrator::new(config));
        orchestrator.run().await
    });
    std::process::exit(code);
}
