//! Driver commands: list, transform, steps

use super::util::{print_json, read_json, Options};
use formflow::*;
use std::path::Path;
use std::sync::Arc;

pub fn cmd_list(args: &[String]) -> Result<()> {
    let options = Options::parse(args)?;
    let config = options.load_config()?;
    let registry = config.driver_registry();

    if options.json {
        return print_json(&registry.stats());
    }

    let drivers = registry.all();
    if drivers.is_empty() {
        println!("No drivers found in {}", config.drivers.directory.display());
        return Ok(());
    }
    for driver in &drivers {
        println!(
            "{:<28} {:<8} {} -> {}",
            driver.name, driver.version, driver.source, driver.target
        );
        if let Some(description) = &driver.description {
            println!("    {}", description);
        }
    }
    println!();
    println!("{} driver(s)", drivers.len());
    Ok(())
}

/// Driver by registered name, or by path when the argument is a driver file
fn resolve_driver(registry: &DriverRegistry, name_or_path: &str) -> Result<Arc<DriverConfig>> {
    let path = Path::new(name_or_path);
    if DriverFormat::from_path(path).is_some() && path.is_file() {
        return Ok(Arc::new(registry.load_from_file(path)?));
    }
    registry.require(name_or_path)
}

pub fn cmd_transform(args: &[String]) -> Result<()> {
    const USAGE: &str = "formflow transform <driver|driver.yaml> <source.json|-> [--json]";
    let options = Options::parse(args)?;
    let driver_arg = options.arg(0, USAGE)?;
    let source = read_json(options.arg(1, USAGE)?)?;

    let config = options.load_config()?;
    let registry = config.driver_registry();
    let driver = resolve_driver(&registry, driver_arg)?;

    match config.mapping_engine().transform(&source, &driver)? {
        Some(result) => print_json(&result),
        None => {
            eprintln!("Flow suppressed by skip_flow_if");
            println!("null");
            Ok(())
        }
    }
}

pub fn cmd_steps(args: &[String]) -> Result<()> {
    const USAGE: &str = "formflow steps <flow> <source.json|->";
    let options = Options::parse(args)?;
    let flow = options.arg(0, USAGE)?;
    let source = read_json(options.arg(1, USAGE)?)?;

    let config = options.load_config()?;
    let instructions = config.driver_service().transform(flow, &source)?;
    if instructions.steps.is_empty() {
        eprintln!("Flow '{}' produced no steps", flow);
    }
    print_json(&instructions)
}
