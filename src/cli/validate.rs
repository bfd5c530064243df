//! Validation CLI command

use super::util::{print_json, Options};
use formflow::config_validate::{
    validate_driver_dir, validate_driver_file, validate_engine_config, ConfigIssue,
    ConfigValidationResult, Severity,
};
use formflow::*;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// `--json` output
#[derive(Serialize)]
struct JsonReport<'a> {
    valid: bool,
    errors: usize,
    warnings: usize,
    drivers_checked: usize,
    issues: &'a [ConfigIssue],
}

pub fn cmd_validate(args: &[String]) -> Result<()> {
    let options = Options::parse(args)?;

    let (target, result) = match (options.positional.first(), &options.config) {
        (Some(path), _) => (path.clone(), validate_path(Path::new(path))),
        (None, Some(config)) => (
            config.display().to_string(),
            validate_engine_config(config),
        ),
        (None, None) => {
            return Err(
                "Usage: formflow validate <driver.yaml|driver-dir|formflow.yaml> [--json]".into(),
            )
        }
    };

    if options.json {
        print_json(&JsonReport {
            valid: !result.has_errors(),
            errors: result.error_count(),
            warnings: result.warning_count(),
            drivers_checked: result.drivers_checked,
            issues: &result.issues,
        })?;
    } else {
        print_report(&result, &target);
    }

    if result.has_errors() {
        return Err("Validation failed".into());
    }
    Ok(())
}

/// Directory: every driver in it. File: a driver when it has a `driver`
/// section, otherwise an engine config.
fn validate_path(path: &Path) -> ConfigValidationResult {
    if path.is_dir() {
        return validate_driver_dir(path);
    }
    let is_driver = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_norway::from_str::<Value>(&content).ok())
        .is_some_and(|doc| doc.get("driver").is_some());
    if is_driver {
        validate_driver_file(path)
    } else {
        validate_engine_config(path)
    }
}

fn print_report(result: &ConfigValidationResult, target: &str) {
    if result.issues.is_empty() {
        if result.drivers_checked > 0 {
            println!("✓ {}: {} driver(s) valid", target, result.drivers_checked);
        } else {
            println!("✓ {}: valid (no issues found)", target);
        }
        return;
    }

    for issue in &result.issues {
        let (prefix, level) = match issue.severity {
            Severity::Error => ("✗", "ERROR"),
            Severity::Warning => ("⚠", "WARN"),
        };
        println!("{} [{}] {}: {}", prefix, issue.code, level, issue.message);
        println!("  File: {}", issue.file);
    }

    println!();
    if result.has_errors() {
        println!(
            "✗ {} error(s), {} warning(s)",
            result.error_count(),
            result.warning_count()
        );
    } else {
        println!("✓ {} warning(s) (no errors)", result.warning_count());
    }
}
