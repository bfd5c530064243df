//! Config validation for formflow
//!
//! Validates the engine config file and driver files, reporting coded
//! issues instead of stopping at the first problem.

use crate::config::{EngineConfig, CONFIG_VERSION};
use crate::driver::handlers::HANDLER_TOKEN;
use crate::driver::{DriverConfig, DriverFormat};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Severity level for validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A validation issue found in config
#[derive(Debug, Clone, Serialize)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub file: String,
}

impl ConfigIssue {
    pub fn error(code: &str, message: &str, file: &str) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.to_string(),
            file: file.to_string(),
        }
    }

    pub fn warning(code: &str, message: &str, file: &str) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.to_string(),
            file: file.to_string(),
        }
    }
}

/// Result of config validation
#[derive(Debug, Default, Serialize)]
pub struct ConfigValidationResult {
    pub issues: Vec<ConfigIssue>,
    pub config_valid: bool,
    pub drivers_checked: usize,
}

impl ConfigValidationResult {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }
}

/// Validate an engine config file
pub fn validate_engine_config(path: &Path) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::default();
    let file_str = path.display().to_string();

    if !path.exists() {
        result
            .issues
            .push(ConfigIssue::error("E001", "File does not exist", &file_str));
        return result;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            result.issues.push(ConfigIssue::error(
                "E002",
                &format!("Cannot read file: {}", e),
                &file_str,
            ));
            return result;
        }
    };

    let config: EngineConfig = match serde_norway::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            result.issues.push(ConfigIssue::error(
                "E003",
                &format!("Invalid YAML: {}", e),
                &file_str,
            ));
            return result;
        }
    };

    check_config(&config, &file_str, &mut result);
    result.config_valid = !result.has_errors();
    result
}

/// Checks that need a parsed config
pub fn check_config(config: &EngineConfig, file: &str, result: &mut ConfigValidationResult) {
    if config.version != CONFIG_VERSION {
        result.issues.push(ConfigIssue::error(
            "E004",
            &format!(
                "Unsupported version: {}. Only version {} is supported.",
                config.version, CONFIG_VERSION
            ),
            file,
        ));
    }

    if config.drivers.directory.as_os_str().is_empty() {
        result.issues.push(ConfigIssue::error(
            "E005",
            "drivers.directory cannot be empty",
            file,
        ));
    }
    if config.drivers.flows_directory.as_os_str().is_empty() {
        result.issues.push(ConfigIssue::error(
            "E005",
            "drivers.flows_directory cannot be empty",
            file,
        ));
    }

    if config.mapping.max_depth == 0 {
        result.issues.push(ConfigIssue::error(
            "E006",
            "mapping.max_depth must be at least 1",
            file,
        ));
    }

    let mut seen = BTreeSet::new();
    for name in &config.handlers.available {
        if !seen.insert(name.as_str()) {
            result.issues.push(ConfigIssue::warning(
                "W001",
                &format!("Handler '{}' is listed more than once", name),
                file,
            ));
        }
    }

    if !config.handlers.install_hint.contains(HANDLER_TOKEN) {
        result.issues.push(ConfigIssue::warning(
            "W002",
            "handlers.install_hint has no {handler} placeholder; every hint will read the same",
            file,
        ));
    }

    if config.app.base_url.is_empty() && !config.app.routes.is_empty() {
        result.issues.push(ConfigIssue::warning(
            "W003",
            "app.routes are defined but app.base_url is empty; route() will emit relative URLs",
            file,
        ));
    }

    if config.templates.currency_symbol.is_empty() {
        result.issues.push(ConfigIssue::warning(
            "W004",
            "templates.currency_symbol is empty",
            file,
        ));
    }
}

/// Validate every driver file in a directory
///
/// Unlike discovery, which skips bad files quietly, each failure is an issue.
pub fn validate_driver_dir(dir: &Path) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::default();
    let dir_str = dir.display().to_string();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            result.issues.push(ConfigIssue::error(
                "E001",
                &format!("Cannot read driver directory: {}", e),
                &dir_str,
            ));
            return result;
        }
    };

    let mut files: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && DriverFormat::from_path(path).is_some())
        .collect();
    files.sort();

    if files.is_empty() {
        result.issues.push(ConfigIssue::warning(
            "W005",
            "No driver files found",
            &dir_str,
        ));
    }

    let mut names: BTreeMap<String, String> = BTreeMap::new();
    for file in files {
        let file_str = file.display().to_string();
        result.drivers_checked += 1;
        match DriverConfig::load(&file) {
            Ok(driver) => {
                if let Some(previous) = names.insert(driver.name.clone(), file_str.clone()) {
                    result.issues.push(ConfigIssue::warning(
                        "W006",
                        &format!(
                            "Driver name '{}' is also used by {}; only one will be registered",
                            driver.name, previous
                        ),
                        &file_str,
                    ));
                }
            }
            Err(e) => result
                .issues
                .push(ConfigIssue::error("E010", &e.to_string(), &file_str)),
        }
    }

    result.config_valid = !result.has_errors();
    result
}

/// Validate one driver file
pub fn validate_driver_file(path: &Path) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::default();
    let file_str = path.display().to_string();

    if !path.exists() {
        result
            .issues
            .push(ConfigIssue::error("E001", "File does not exist", &file_str));
        return result;
    }

    result.drivers_checked = 1;
    if let Err(e) = DriverConfig::load(path) {
        result
            .issues
            .push(ConfigIssue::error("E010", &e.to_string(), &file_str));
    }
    result.config_valid = !result.has_errors();
    result
}
