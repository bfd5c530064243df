//! Engine configuration
//!
//! One YAML file wires the engine to its surroundings: where driver files
//! and flow templates live, the host values behind the template helpers,
//! which step handlers are installed, and a few engine limits.
//!
//! ```yaml
//! version: 1
//! drivers:
//!   directory: drivers
//!   flows_directory: flows
//! app:
//!   base_url: https://pay.example.com
//!   routes:
//!     disburse.complete: /disburse/{code}/complete
//! handlers:
//!   available: [form, kyc, selfie]
//! ```
//!
//! Every section is optional. Relative directories are resolved against
//! the directory containing the config file.

use crate::context::Host;
use crate::driver::handlers::DEFAULT_INSTALL_HINT;
use crate::driver::{DriverRegistry, DriverService, StaticHandlerRegistry};
use crate::error::{Error, Result};
use crate::mapping::{MappingEngine, DEFAULT_MAX_DEPTH};
use crate::templates::{TemplateProcessor, DEFAULT_CURRENCY_SYMBOL};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Only supported config schema version
pub const CONFIG_VERSION: u32 = 1;

/// Root engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub drivers: DriversConfig,

    /// Host values behind `config()`, `session()`, `route()`, `url()`, `asset()`
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub handlers: HandlersConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            drivers: DriversConfig::default(),
            app: AppConfig::default(),
            handlers: HandlersConfig::default(),
            mapping: MappingConfig::default(),
            templates: TemplatesConfig::default(),
        }
    }
}

/// Where driver files and flow templates are found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DriversConfig {
    #[serde(default = "default_driver_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_flows_dir")]
    pub flows_directory: PathBuf,

    /// Create the driver directory on first discovery
    #[serde(default)]
    pub create_if_missing: bool,
}

fn default_driver_dir() -> PathBuf {
    PathBuf::from("drivers")
}

fn default_flows_dir() -> PathBuf {
    PathBuf::from("flows")
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            directory: default_driver_dir(),
            flows_directory: default_flows_dir(),
            create_if_missing: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    #[serde(default)]
    pub base_url: String,

    /// Asset host; falls back to `base_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,

    /// Route name to path pattern with `{param}` placeholders
    #[serde(default)]
    pub routes: BTreeMap<String, String>,

    /// Values exposed to `config(key)`
    #[serde(default)]
    pub values: Map<String, Value>,

    /// Values exposed to `session(key)`
    #[serde(default)]
    pub session: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HandlersConfig {
    /// Installed step handlers
    #[serde(default = "default_handlers")]
    pub available: Vec<String>,

    /// Install hint pattern: {handler}
    #[serde(default = "default_install_hint")]
    pub install_hint: String,
}

fn default_handlers() -> Vec<String> {
    vec!["form".to_string()]
}

fn default_install_hint() -> String {
    DEFAULT_INSTALL_HINT.to_string()
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            available: default_handlers(),
            install_hint: default_install_hint(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MappingConfig {
    /// Nesting limit for mapping specs
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplatesConfig {
    /// Glyph used by the `format_money` filter
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

fn default_currency_symbol() -> String {
    DEFAULT_CURRENCY_SYMBOL.to_string()
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency_symbol(),
        }
    }
}

impl EngineConfig {
    /// Load a config file, resolving relative directories against its parent
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut config = Self::from_yaml(&content)
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_norway::from_str(content)?;
        if config.version != CONFIG_VERSION {
            return Err(Error::Other(format!(
                "Unsupported config version: {}",
                config.version
            )));
        }
        Ok(config)
    }

    /// Make relative driver and flow directories relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for dir in [&mut self.drivers.directory, &mut self.drivers.flows_directory] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    pub fn host(&self) -> Host {
        let mut host = Host::new(&self.app.base_url)
            .with_config(Value::Object(self.app.values.clone()))
            .with_session(Value::Object(self.app.session.clone()));
        host.asset_url = self.app.asset_url.clone();
        for (name, pattern) in &self.app.routes {
            host = host.with_route(name, pattern);
        }
        host
    }

    pub fn handler_registry(&self) -> StaticHandlerRegistry {
        StaticHandlerRegistry::new(self.handlers.available.iter().cloned())
            .with_install_hint(&self.handlers.install_hint)
    }

    pub fn template_processor(&self) -> TemplateProcessor {
        TemplateProcessor::with_currency(&self.templates.currency_symbol)
    }

    pub fn mapping_engine(&self) -> MappingEngine {
        MappingEngine::with_host(&self.host()).with_max_depth(self.mapping.max_depth)
    }

    pub fn driver_registry(&self) -> DriverRegistry {
        DriverRegistry::new(self.drivers.directory.clone())
            .with_create_if_missing(self.drivers.create_if_missing)
    }

    pub fn driver_service(&self) -> DriverService {
        DriverService::new(self.drivers.flows_directory.clone())
            .with_handlers(Arc::new(self.handler_registry()))
            .with_processor(self.template_processor())
            .with_host(self.host())
    }
}
