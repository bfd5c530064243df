//! Filters for the `{{ value | filter }}` pipeline
//!
//! Built-ins:
//! - `upper`, `lower`: case conversion of the stringified value
//! - `format_money`: currency glyph plus two fixed decimals (`₱1,500.00`)
//! - `json`: already-valid JSON text passes through, anything else is encoded

use super::stringify;
use crate::value::{format_number, parse_numeric};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default currency glyph for `format_money`
pub const DEFAULT_CURRENCY_SYMBOL: &str = "₱";

pub type FilterFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Named filters available to a [`super::TemplateProcessor`]
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names();
        names.sort_unstable();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl FilterRegistry {
    /// Registry without any filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in filters
    pub fn with_builtins(currency_symbol: &str) -> Self {
        let mut registry = Self::new();
        register_filters(&mut registry, currency_symbol);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }

    /// Apply one filter; an unknown name leaves the value unchanged
    pub fn apply(&self, value: Value, name: &str) -> Value {
        match self.filters.get(name) {
            Some(filter) => filter(&value),
            None => value,
        }
    }
}

/// Register all built-in filters
pub fn register_filters(registry: &mut FilterRegistry, currency_symbol: &str) {
    registry.register("upper", |v| Value::String(stringify(v).to_uppercase()));
    registry.register("lower", |v| Value::String(stringify(v).to_lowercase()));
    let symbol = currency_symbol.to_string();
    registry.register("format_money", move |v| {
        Value::String(format_money(v, &symbol))
    });
    registry.register("json", |v| Value::String(format_json(v)));
}

/// Format a value as money; non-numeric values count as zero
pub fn format_money(value: &Value, symbol: &str) -> String {
    let amount = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_numeric(s).and_then(|n| n.as_f64()).unwrap_or(0.0),
        _ => 0.0,
    };
    format!("{}{}", symbol, format_number(amount, 2, ".", ","))
}

fn format_json(value: &Value) -> String {
    if let Value::String(s) = value {
        if matches!(serde_json::from_str::<Value>(s), Ok(parsed) if !parsed.is_null()) {
            return s.clone();
        }
    }
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(&json!(500), "₱"), "₱500.00");
        assert_eq!(format_money(&json!("1234.5"), "$"), "$1,234.50");
        assert_eq!(format_money(&json!("abc"), "₱"), "₱0.00");
    }

    #[test]
    fn test_json_filter() {
        let registry = FilterRegistry::with_builtins(DEFAULT_CURRENCY_SYMBOL);
        assert_eq!(registry.apply(json!({"foo": "bar"}), "json"), json!(r#"{"foo":"bar"}"#));
        assert_eq!(registry.apply(json!("[1,2]"), "json"), json!("[1,2]"));
        assert_eq!(registry.apply(json!("plain"), "json"), json!("\"plain\""));
    }

    #[test]
    fn test_unknown_filter_is_noop() {
        let registry = FilterRegistry::with_builtins(DEFAULT_CURRENCY_SYMBOL);
        assert_eq!(registry.apply(json!("Same"), "reverse"), json!("Same"));
    }

    #[test]
    fn test_custom_filter() {
        let mut registry = FilterRegistry::new();
        registry.register("double", |v| {
            json!(v.as_f64().unwrap_or(0.0) * 2.0)
        });
        assert_eq!(registry.apply(json!(2), "double"), json!(4.0));
    }
}
