//! SJK command-line frontend.
//!
//! Runs the kernel core as an interactive console: each submitted line
//! is one cell, driven through the same shell/control dispatchers a
//! wire frontend uses, with io-pub publications printed inline. Useful
//! for exercising magics, preprocessing, and the protocol plumbing
//! without a notebook server.
//!
//! The console uses the scripted debugger backend unless the host
//! integration provides a real one; embedders run the kernel as a
//! library via `sjk_kernel::build` with their debugger binding.
//!
//! # Environment Variables
//!
//! - `REPL_SWIFT_PATH`: Swift REPL executable
//! - `SWIFT_BUILD_PATH` / `SWIFT_PACKAGE_PATH`: package builder tools
//! - `SWIFT_JUPYTER_BUILD_TIMEOUT`: build budget in seconds
//! - `RUST_LOG`: tracing filter (e.g. `sjk_kernel=debug`)

mod console;

use anyhow::Result;
use clap::Parser;
use sjk_kernel::KernelConfig;
use sjk_repl::testing::ScriptedBackend;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// SJK - Swift Jupyter kernel console
#[derive(Parser, Debug)]
#[command(name = "sjk")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Override the Swift REPL executable (also: REPL_SWIFT_PATH)
    #[arg(long)]
    repl_path: Option<PathBuf>,

    /// Execute the given cells and exit (each argument is one cell)
    #[arg(trailing_var_arg = true)]
    cells: Vec<String>,
}

fn init_tracing(args: &Args) -> Result<()> {
    let default_filter = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sjk={default_filter},sjk_kernel={default_filter},sjk_repl={default_filter},sjk_install={default_filter}")));

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let mut config = KernelConfig::from_env();
    if let Some(repl_path) = args.repl_path.clone() {
        config.repl_path = Some(repl_path);
    }
    info!(
        repl = ?config.repl_path,
        build_timeout = ?config.install.build_timeout,
        "starting SJK console"
    );

    // The console runs against the scripted backend; a real debugger
    // binding plugs in through sjk_repl::debugger when embedding the
    // kernel as a library.
    let backend = Box::new(ScriptedBackend::new());

    console::run(config, backend, args.cells).await
}
