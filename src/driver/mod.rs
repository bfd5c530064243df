//! Driver files
//!
//! A driver declares how one source type maps to one target type:
//!
//! ```yaml
//! driver:
//!   name: voucher-redemption
//!   version: "1.0"
//!   source: App\Models\Voucher
//!   target: FormFlowInstructions
//! mappings:
//!   reference_id: "disburse-{{ source.code }}"
//! constants:
//!   priorities: {kyc: 1}
//! filters:
//!   skip_flow_if: ["source.redeemed == true"]
//!   steps: ["item.handler != 'mobile'"]
//! ```
//!
//! Files are validated and compiled when they are loaded. A file that
//! passes produces a [`DriverConfig`] whose mappings and conditions are
//! already parsed; nothing is re-validated when the driver is used.

pub mod handlers;
pub mod registry;
pub mod service;

pub use handlers::{HandlerRegistry, StaticHandlerRegistry};
pub use registry::{DriverRegistry, RegistryStats};
pub use service::DriverService;

use crate::error::{Error, Result};
use crate::expr::Condition;
use crate::mapping::spec::condition;
use crate::mapping::MappingSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static VERSION: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\d+\.\d+(\.\d+)?$").expect("valid version regex"));

static IDENTIFIER: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\\?[\p{L}_][\p{L}\p{N}_]*((\\|::)[\p{L}_][\p{L}\p{N}_]*)*$")
        .expect("valid identifier regex")
});

/// Required `driver` header fields
const REQUIRED_FIELDS: [&str; 4] = ["name", "version", "source", "target"];

/// Driver file as written on disk
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DriverFile {
    pub driver: DriverHeader,
    /// Output field → mapping rule, resolved in declaration order
    pub mappings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constants: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<DriverFileFilters>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DriverHeader {
    /// Unique driver name
    pub name: String,
    /// `MAJOR.MINOR[.PATCH]`
    pub version: String,
    /// Source type identifier
    pub source: String,
    /// Target type identifier
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DriverFileFilters {
    /// Any true condition suppresses the whole flow
    #[serde(default)]
    pub skip_flow_if: Vec<String>,
    /// Every condition must hold for a step to be kept
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Post-mapping filters, compiled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverFilters {
    pub skip_flow_if: Vec<Condition>,
    pub steps: Vec<Condition>,
}

/// A validated, compiled driver
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub name: String,
    pub version: String,
    pub source: String,
    pub target: String,
    pub description: Option<String>,
    pub mappings: Vec<(String, MappingSpec)>,
    pub constants: Map<String, Value>,
    pub filters: DriverFilters,
    /// `sha256:` prefix plus the first 8 bytes of the file digest, hex encoded
    pub fingerprint: String,
    pub path: Option<PathBuf>,
}

/// Supported driver file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverFormat {
    Yaml,
    Json,
}

impl DriverFormat {
    /// Format from a file extension (`yaml`, `yml`, `json`)
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(DriverFormat::Yaml),
            "json" => Some(DriverFormat::Json),
            _ => None,
        }
    }
}

/// Compute the content fingerprint of a driver file
pub fn fingerprint(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("sha256:{}", hex::encode(&hasher.finalize()[..8]))
}

/// JSON Schema for driver files
pub fn driver_schema() -> schemars::Schema {
    schemars::schema_for!(DriverFile)
}

impl DriverConfig {
    /// Load and validate a driver file
    pub fn load(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let format = DriverFormat::from_path(path).ok_or_else(|| {
            Error::config(&origin, "unsupported file format (expected .yaml, .yml or .json)")
        })?;
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut config = Self::parse(&content, format, &origin)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse and validate driver text; `origin` names it in errors
    pub fn parse(content: &str, format: DriverFormat, origin: &str) -> Result<Self> {
        let value: Value = match format {
            DriverFormat::Yaml => serde_norway::from_str(content)
                .map_err(|e| Error::config(origin, format!("invalid YAML: {}", e)))?,
            DriverFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::config(origin, format!("invalid JSON: {}", e)))?,
        };
        let mut config = Self::from_value(value, origin)?;
        config.fingerprint = fingerprint(content);
        Ok(config)
    }

    /// Validate and compile an already-parsed driver document
    pub fn from_value(mut value: Value, origin: &str) -> Result<Self> {
        let Some(root) = value.as_object_mut() else {
            return Err(Error::config(origin, "expected a mapping at the top level"));
        };
        for section in ["driver", "mappings"] {
            if root.get(section).is_none_or(Value::is_null) {
                return Err(Error::config(
                    origin,
                    format!("driver configuration missing '{}' section", section),
                ));
            }
        }

        let Some(header) = root.get_mut("driver").and_then(Value::as_object_mut) else {
            return Err(Error::config(origin, "'driver' section must be a mapping"));
        };
        for field in REQUIRED_FIELDS {
            let normalized = match header.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                // YAML reads `version: 1.0` as a float, which displays as "1.0"
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(Error::config(
                        origin,
                        format!("missing required field 'driver.{}'", field),
                    ))
                }
            };
            header.insert(field.to_string(), Value::String(normalized));
        }
        if root.get("mappings").is_some_and(|m| m.as_array().is_some_and(Vec::is_empty)) {
            // an empty YAML sequence stands in for an empty mapping
            root.insert("mappings".to_string(), Value::Object(Map::new()));
        }

        let fingerprint = fingerprint(&value.to_string());
        let file: DriverFile = serde_json::from_value(value)
            .map_err(|e| Error::config(origin, format!("malformed driver: {}", e)))?;
        Self::compile(file, origin, fingerprint)
    }

    fn compile(file: DriverFile, origin: &str, fingerprint: String) -> Result<Self> {
        let header = file.driver;
        if !VERSION.is_match(&header.version) {
            return Err(Error::config(
                origin,
                format!(
                    "invalid version format '{}', expected X.Y or X.Y.Z",
                    header.version
                ),
            ));
        }
        for (field, identifier) in [("source", &header.source), ("target", &header.target)] {
            if !IDENTIFIER.is_match(identifier) {
                return Err(Error::config(
                    origin,
                    format!("invalid type identifier for 'driver.{}': {}", field, identifier),
                ));
            }
        }

        let mappings = file
            .mappings
            .iter()
            .map(|(field, raw)| {
                MappingSpec::parse(raw, &format!("mappings.{}", field))
                    .map(|spec| (field.clone(), spec))
                    .map_err(|message| Error::config(origin, message))
            })
            .collect::<Result<Vec<_>>>()?;

        let raw_filters = file.filters.unwrap_or_default();
        let compile_all = |conditions: &[String], key: &str| -> Result<Vec<Condition>> {
            conditions
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    condition(&Value::String(c.clone()), &format!("filters.{}.{}", key, i))
                        .map_err(|message| Error::config(origin, message))
                })
                .collect()
        };
        let filters = DriverFilters {
            skip_flow_if: compile_all(&raw_filters.skip_flow_if, "skip_flow_if")?,
            steps: compile_all(&raw_filters.steps, "steps")?,
        };

        Ok(Self {
            name: header.name,
            version: header.version,
            source: header.source,
            target: header.target,
            description: header.description,
            mappings,
            constants: file.constants.unwrap_or_default(),
            filters,
            fingerprint,
            path: None,
        })
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.skip_flow_if.is_empty() || !self.filters.steps.is_empty()
    }

    /// A driver constant, or `default` when absent
    pub fn constant(&self, key: &str, default: Value) -> Value {
        self.constants.get(key).cloned().unwrap_or(default)
    }

    pub fn mapping(&self, field: &str) -> Option<&MappingSpec> {
        self.mappings
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, spec)| spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "driver": {"name": "test", "version": "1.0", "source": "Src", "target": "Tgt"},
            "mappings": {"foo": "{{ source.bar }}"}
        })
    }

    fn message(err: Error) -> String {
        match err {
            Error::Configuration { message, .. } => message,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_minimal_driver() {
        let d = DriverConfig::from_value(minimal(), "mem").unwrap();
        assert_eq!(d.name, "test");
        assert_eq!(d.mappings.len(), 1);
        assert!(!d.has_filters());
        assert!(d.fingerprint.starts_with("sha256:"));
        assert!(matches!(d.mapping("foo"), Some(MappingSpec::Template(_))));
    }

    #[test]
    fn test_missing_sections() {
        let err = DriverConfig::from_value(json!({"mappings": {}}), "a.yaml").unwrap_err();
        assert!(message(err).contains("'driver' section"));
        let mut v = minimal();
        v.as_object_mut().unwrap().remove("mappings");
        assert!(message(DriverConfig::from_value(v, "a.yaml").unwrap_err()).contains("'mappings'"));
    }

    #[test]
    fn test_required_fields() {
        for field in REQUIRED_FIELDS {
            let mut v = minimal();
            v["driver"][field] = json!("");
            let err = DriverConfig::from_value(v, "a.yaml").unwrap_err();
            assert!(message(err).contains(&format!("driver.{}", field)));
        }
    }

    #[test]
    fn test_version_shapes() {
        for (version, ok) in [(json!("1.0"), true), (json!("2.1.3"), true), (json!(1.5), true), (json!("v1"), false), (json!("1"), false), (json!("1.2.3.4"), false)] {
            let mut v = minimal();
            v["driver"]["version"] = version.clone();
            assert_eq!(DriverConfig::from_value(v, "a").is_ok(), ok, "version {}", version);
        }
    }

    #[test]
    fn test_identifier_shapes() {
        for (identifier, ok) in [
            ("App\\Models\\Voucher", true),
            ("formflow::flow::FormFlowInstructions", true),
            ("_Private", true),
            ("9Lives", false),
            ("has space", false),
            ("App\\", false),
        ] {
            let mut v = minimal();
            v["driver"]["source"] = json!(identifier);
            assert_eq!(DriverConfig::from_value(v, "a").is_ok(), ok, "identifier {}", identifier);
        }
    }

    #[test]
    fn test_bad_mapping_is_load_error() {
        let mut v = minimal();
        v["mappings"]["bad"] = json!({"source": "x", "transform": "shuffle"});
        let err = message(DriverConfig::from_value(v, "a").unwrap_err());
        assert!(err.contains("mappings.bad.transform"));
    }

    #[test]
    fn test_filters_compiled() {
        let mut v = minimal();
        v["filters"] = json!({"skip_flow_if": ["source.done == true"], "steps": ["item.handler != 'x'"]});
        let d = DriverConfig::from_value(v, "a").unwrap();
        assert_eq!(d.filters.skip_flow_if.len(), 1);
        assert_eq!(d.filters.steps[0].source(), "item.handler != 'x'");

        let mut bad = minimal();
        bad["filters"] = json!({"steps": ["(item"]});
        assert!(message(DriverConfig::from_value(bad, "a").unwrap_err()).contains("filters.steps.0"));
    }

    #[test]
    fn test_yaml_source() {
        let yaml = "driver:\n  name: y\n  version: 1.0\n  source: Src\n  target: Tgt\nmappings:\n  a: 1\n";
        let d = DriverConfig::parse(yaml, DriverFormat::Yaml, "y.yaml").unwrap();
        assert_eq!(d.version, "1.0");
        assert_eq!(d.fingerprint, fingerprint(yaml));
    }

    #[test]
    fn test_schema_names_sections() {
        let schema = serde_json::to_value(driver_schema()).unwrap();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("driver")));
        assert!(required.contains(&json!("mappings")));
    }
}
