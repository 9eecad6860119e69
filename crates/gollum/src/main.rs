//! Gollum - an n:m message multiplexer
//!
//! ```bash
//! gollum -c /etc/gollum/gollum.toml
//! gollum -c gollum.toml -n 4
//! ```
//!
//! Exit codes: 0 normal, 1 configuration error, 2 unrecoverable runtime
//! error.

mod coordinator;
mod plugins;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use gollum_config::Config;

use crate::coordinator::RunError;

/// Gollum - an n:m message multiplexer
#[derive(Parser, Debug)]
#[command(name = "gollum", disable_version_flag = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of worker threads to use; 0 means auto
    #[arg(short, long, default_value_t = 0)]
    numcpu: usize,

    /// Print version information and quit
    #[arg(short = 'v', long)]
    version: bool,

    /// Write cpu profiler results to a given file
    #[arg(long, value_name = "PATH")]
    cpuprofile: Option<PathBuf>,

    /// Write heap profile to a given file
    #[arg(long, value_name = "PATH")]
    memprofile: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("gollum {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let Some(config_path) = cli.config else {
        eprintln!("gollum: no configuration file given\n");
        let _ = Cli::command().print_help();
        return ExitCode::from(1);
    };

    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("gollum: {err}");
            return ExitCode::from(1);
        }
    };

    if cli.cpuprofile.is_some() || cli.memprofile.is_some() {
        eprintln!("gollum: profiling is not supported in this build, ignoring");
    }

    let runtime = match build_runtime(cli.numcpu) {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("gollum: failed to start runtime: {err}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(coordinator::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ RunError::Config(_)) => {
            eprintln!("gollum: {err}");
            ExitCode::from(1)
        }
        Err(err @ RunError::Runtime(_)) => {
            eprintln!("gollum: {err}");
            ExitCode::from(2)
        }
    }
}

fn build_runtime(numcpu: usize) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if numcpu > 0 {
        builder.worker_threads(numcpu);
    }
    builder.enable_all().build()
}
