//! formflow CLI - Command-line interface
//!
//! Commands:
//!   validate  - Check a driver file, driver directory or engine config
//!   list      - List discovered drivers
//!   transform - Run a driver against a JSON source object
//!   steps     - Build flow instructions from a flow template
//!   schema    - Print JSON schemas

mod cli;

use cli::{cmd_list, cmd_schema, cmd_steps, cmd_transform, cmd_validate};
use formflow::VERSION;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // RUST_LOG=debug for verbose logging; logs go to stderr so stdout stays JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result = match args[1].as_str() {
        "validate" => cmd_validate(&args[2..]),
        "list" => cmd_list(&args[2..]),
        "transform" => cmd_transform(&args[2..]),
        "steps" => cmd_steps(&args[2..]),
        "schema" => cmd_schema(&args[2..]),
        "version" | "--version" | "-v" => {
            println!("formflow {}", VERSION);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            Err("Unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    println!(
        r#"
formflow - Declarative mapping and multi-step form flows

USAGE:
    formflow <COMMAND> [OPTIONS]

COMMANDS:
    validate <path>                      Validate a driver file, driver directory
                                         or engine config
    list                                 List discovered drivers
    transform <driver> <source.json>     Run a driver (name or file) against a source
    steps <flow> <source.json>           Build flow instructions from a flow template
    schema [driver|config|flow|instructions|list]
                                         Print a JSON schema
    version                              Print the version
    help                                 Show this message

OPTIONS:
    --config <file>                      Engine config (default: ./formflow.yaml if present)
    --drivers <dir>                      Driver directory (overrides the config)
    --json                               JSON output (validate, list)

ENVIRONMENT:
    RUST_LOG                             Log filter (default: warn)

EXAMPLES:
    formflow validate drivers/
    formflow list --drivers drivers
    formflow transform voucher-redemption voucher.json
    formflow steps voucher-redemption voucher.json --config formflow.yaml
    cat voucher.json | formflow transform drivers/voucher.yaml -
"#
    );
}
