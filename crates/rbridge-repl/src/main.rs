//! rbridge CLI entry point.
//!
//! Usage:
//!   rbridge                      # Interactive REPL
//!   rbridge -c <script>          # Run a script through the engine and exit
//!   rbridge <file.R>             # Run a script file
//!   rbridge --probe              # Report which engine discovery picks

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rbridge_kernel::{discovery, BridgeConfig, EngineSession};

fn main() -> ExitCode {
    // Respects RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            rbridge_repl::run()?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("rbridge {} ({} {})",
                     env!("CARGO_PKG_VERSION"),
                     env!("RBRIDGE_GIT_HASH"),
                     env!("RBRIDGE_BUILD_DATE"));
            Ok(ExitCode::SUCCESS)
        }

        Some("--probe") => run_probe(),

        Some("-c") => {
            let script = args.get(2)
                .context("-c requires a script argument")?;
            run_script(script)
        }

        Some(path) if !path.starts_with('-') => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read script: {path}"))?;
            run_script(&strip_shebang(&source))
        }

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'rbridge --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(r#"rbridge v{}

Usage:
  rbridge                      Interactive REPL
  rbridge -c <script>          Run a script through the engine and exit
  rbridge <file.R>             Run a script file
  rbridge --probe              Show which engine discovery picks

Options:
  -c <script>                  Run a script string and exit
  --probe                      Probe candidates and print the chosen engine
  -h, --help                   Show this help
  -V, --version                Show version

Environment:
  RBRIDGE_ENGINE               Engine executable to try first
  RUST_LOG                     Log filter, e.g. rbridge_kernel=debug

Config:
  {}
"#, env!("CARGO_PKG_VERSION"), BridgeConfig::config_path().display());
}

/// Print the engine discovery would choose, or every candidate that failed.
fn run_probe() -> Result<ExitCode> {
    let config = BridgeConfig::load()?;
    match discovery::discover_with(&config) {
        Ok(exe) => {
            println!("{}", exe.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Start a session, run one script, print what it printed, and shut down.
fn run_script(script: &str) -> Result<ExitCode> {
    let config = BridgeConfig::load()?;
    let session = EngineSession::start(&config).context("Failed to start engine")?;

    let lines = session.execute(script)?;
    for line in &lines {
        println!("{line}");
    }

    session.close().context("Engine shutdown was not clean")?;
    Ok(ExitCode::SUCCESS)
}

fn strip_shebang(source: &str) -> String {
    if source.starts_with("#!") {
        source.lines().skip(1).collect::<Vec<_>>().join("\n")
    } else {
        source.to_string()
    }
}
