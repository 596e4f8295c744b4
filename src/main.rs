//! openapi-from-traffic - Command-line tool replaying captured HTTP traffic into a
//! Swagger 2.0 document.
//!
//! # Usage
//!
//! ```bash
//! openapi-from-traffic [OPTIONS] <CAPTURE_PATH>
//! ```
//!
//! # Examples
//!
//! Replay one capture file into YAML on stdout:
//! ```bash
//! openapi-from-traffic traffic.jsonl
//! ```
//!
//! Replay a directory of captures into a JSON file:
//! ```bash
//! openapi-from-traffic ./captures -f json -o swagger.json --title "Pet Store"
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_from_traffic::cli;

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("openapi-from-traffic starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    Ok(())
}
