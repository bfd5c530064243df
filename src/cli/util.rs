//! CLI utility helpers

use formflow::{EngineConfig, Error, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "formflow.yaml";

/// Options shared by every command
#[derive(Debug, Default)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub drivers: Option<PathBuf>,
    pub json: bool,
    pub positional: Vec<String>,
}

impl Options {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut options = Options::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = iter.next().ok_or("--config requires a file path")?;
                    options.config = Some(PathBuf::from(path));
                }
                "--drivers" | "-d" => {
                    let path = iter.next().ok_or("--drivers requires a directory")?;
                    options.drivers = Some(PathBuf::from(path));
                }
                "--json" => options.json = true,
                flag if flag.starts_with("--") => {
                    return Err(format!("Unknown option: {}", flag).into());
                }
                _ => options.positional.push(arg.clone()),
            }
        }
        Ok(options)
    }

    /// Positional argument `index`, or a usage error
    pub fn arg(&self, index: usize, usage: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::Other(format!("Usage: {}", usage)))
    }

    /// Engine config from `--config`, then `./formflow.yaml`, then defaults
    pub fn load_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                EngineConfig::load_from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => EngineConfig::default(),
        };
        if let Some(dir) = &self.drivers {
            config.drivers.directory = dir.clone();
        }
        Ok(config)
    }
}

/// Read a JSON document; `-` reads stdin
pub fn read_json(path: &str) -> Result<Value> {
    let content = if path == "-" {
        std::io::read_to_string(std::io::stdin()).map_err(Error::Io)?
    } else {
        fs::read_to_string(path).map_err(Error::Io)?
    };
    Ok(serde_json::from_str(&content)?)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let options = Options::parse(&args(&["--drivers", "d", "voucher", "--json", "src.json"])).unwrap();
        assert_eq!(options.drivers, Some(PathBuf::from("d")));
        assert!(options.json);
        assert_eq!(options.positional, vec!["voucher", "src.json"]);
        assert_eq!(options.arg(1, "x").unwrap(), "src.json");
        assert!(options.arg(2, "x").is_err());
    }

    #[test]
    fn test_parse_options_errors() {
        assert!(Options::parse(&args(&["--config"])).is_err());
        assert!(Options::parse(&args(&["--bogus"])).is_err());
    }
}
