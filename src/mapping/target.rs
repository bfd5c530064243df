//! Target type resolution
//!
//! A driver names its `target` type. The engine resolves that name to a
//! builder which turns the mapped record into the target shape, rejecting
//! records that do not fit it.

use crate::error::{Error, Result};
use crate::flow::FormFlowInstructions;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type TargetBuilder = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Name of the built-in flow instructions target
pub const FORM_FLOW_INSTRUCTIONS: &str = "FormFlowInstructions";

/// Known target types by name
#[derive(Clone)]
pub struct TargetRegistry {
    builders: BTreeMap<String, TargetBuilder>,
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("targets", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(FORM_FLOW_INSTRUCTIONS, |value| {
            let instructions: FormFlowInstructions = serde_json::from_value(value)?;
            Ok(serde_json::to_value(instructions)?)
        });
        registry
    }
}

impl TargetRegistry {
    /// Registry with the built-in targets
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry without any targets
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Arc::new(builder));
    }

    /// Register a target that accepts any record unchanged
    pub fn register_passthrough(&mut self, name: impl Into<String>) {
        self.register(name, Ok);
    }

    /// Resolve a target by exact name, then by its unqualified name
    pub fn resolve(&self, target: &str) -> Result<&TargetBuilder> {
        self.builders
            .get(target)
            .or_else(|| self.builders.get(short_name(target)))
            .ok_or_else(|| Error::TargetResolution(target.to_string()))
    }

    pub fn contains(&self, target: &str) -> bool {
        self.resolve(target).is_ok()
    }

    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}

/// Last segment of a `\`- or `::`-qualified type identifier
pub fn short_name(identifier: &str) -> &str {
    let after_backslash = identifier.rsplit('\\').next().unwrap_or(identifier);
    after_backslash.rsplit("::").next().unwrap_or(after_backslash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("App\\Data\\FormFlowInstructions"), "FormFlowInstructions");
        assert_eq!(short_name("formflow::flow::FormFlowInstructions"), "FormFlowInstructions");
        assert_eq!(short_name("Plain"), "Plain");
    }

    #[test]
    fn test_resolve_qualified_name() {
        let registry = TargetRegistry::new();
        assert!(registry.contains("LBHurtado\\FormFlowManager\\Data\\FormFlowInstructions"));
        assert!(matches!(
            registry.resolve("Unknown"),
            Err(Error::TargetResolution(name)) if name == "Unknown"
        ));
    }

    #[test]
    fn test_instructions_builder_rejects_bad_shape() {
        let registry = TargetRegistry::new();
        let builder = registry.resolve(FORM_FLOW_INSTRUCTIONS).unwrap();
        assert!(builder(json!({"steps": "nope"})).is_err());
        let built = builder(json!({"reference_id": "r1", "steps": [{"handler": "form"}]})).unwrap();
        assert_eq!(built["steps"][0]["handler"], json!("form"));
    }

    #[test]
    fn test_passthrough() {
        let mut registry = TargetRegistry::empty();
        registry.register_passthrough("Tgt");
        let builder = registry.resolve("Tgt").unwrap();
        assert_eq!(builder(json!({"a": 1})).unwrap(), json!({"a": 1}));
    }
}
