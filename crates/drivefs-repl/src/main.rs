//! drivefs CLI entry point.
//!
//! Usage:
//!   drivefs                    # Interactive shell
//!   drivefs <command> [args]   # Run one command and exit

use std::env;
use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
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
            drivefs_repl::run()?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("drivefs {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some(unknown) if unknown.starts_with('-') => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'drivefs --help' for usage.");
            Ok(ExitCode::FAILURE)
        }

        Some(_) => {
            drivefs_repl::run_once(&args[1..])?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_help() {
    println!(
        r#"drivefs v{}

Usage:
  drivefs                      Interactive shell
  drivefs <command> [args]     Run one command and exit

{}
Options:
  -h, --help                   Show this help
  -V, --version                Show version

Configuration is read from ~/.config/drivefs/filesystem.toml.
Set RUST_LOG=debug for detailed logs.
"#,
        env!("CARGO_PKG_VERSION"),
        drivefs_repl::USAGE
    );
}
