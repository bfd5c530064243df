//! Template processor for flow step configuration
//!
//! A second `{{ }}` grammar, separate from [`crate::render`]. Flow templates
//! (step titles, descriptions, handler config) are written against it:
//!
//! - Variables: `{{ voucher.code }}`, `{{ items.0 }}`
//! - Ternaries: `{{ amount > 100 ? "high" : "low" }}`
//! - Filter pipelines: `{{ amount | format_money }}`, `{{ data | json }}`
//! - Word booleans: `{{ has_kyc or !has_otp }}` renders `"1"` or `""`
//!
//! Booleans stringify as `"1"`/`""`; arrays and objects as compact JSON.

pub mod filters;

pub use filters::{FilterRegistry, DEFAULT_CURRENCY_SYMBOL};

use crate::value::{coerce_scalar, data_get, is_truthy, loose_cmp, loose_eq, number_to_string, parse_numeric};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::{Arc, LazyLock};

static BLOCK: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("valid block regex"));

static TERNARY: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"^(.+?)\s*\?\s*"([^"]*)"\s*:\s*"([^"]*)"$"#).expect("valid ternary regex")
});

static WORD_BOOLEAN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)\s(or|and)\s").expect("valid boolean regex"));

static OR_SPLIT: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)\sor\s").expect("valid or regex"));

static AND_SPLIT: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)\sand\s").expect("valid and regex"));

static QUOTED: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"^["'](.+)["']$"#).expect("valid quoted regex"));

/// Comparison operators, two-character forms first
const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

/// Stringify a value the way processed templates show it
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => number_to_string(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Processes step templates against a JSON context
#[derive(Debug, Clone)]
pub struct TemplateProcessor {
    filters: Arc<FilterRegistry>,
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self::with_currency(DEFAULT_CURRENCY_SYMBOL)
    }

    /// Processor whose `format_money` uses `symbol`
    pub fn with_currency(symbol: &str) -> Self {
        Self {
            filters: Arc::new(FilterRegistry::with_builtins(symbol)),
        }
    }

    pub fn with_filters(filters: FilterRegistry) -> Self {
        Self {
            filters: Arc::new(filters),
        }
    }

    /// Add or replace a pipeline filter
    pub fn register_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.filters).register(name, filter);
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Replace every `{{ }}` block in `template`
    pub fn process(&self, template: &str, context: &Value) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        BLOCK
            .replace_all(template, |caps: &regex::Captures<'_>| {
                self.process_expression(caps[1].trim(), context)
            })
            .into_owned()
    }

    /// Process every string leaf of an object; other scalars pass through
    pub fn process_array(&self, data: &Map<String, Value>, context: &Value) -> Map<String, Value> {
        data.iter()
            .map(|(key, value)| (key.clone(), self.process_value(value, context)))
            .collect()
    }

    pub fn process_value(&self, value: &Value, context: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.process(s, context)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.process_value(v, context)).collect()),
            Value::Object(map) => Value::Object(self.process_array(map, context)),
            other => other.clone(),
        }
    }

    fn process_expression(&self, expression: &str, context: &Value) -> String {
        if expression.contains('?') {
            return self.evaluate_conditional(expression, context);
        }
        if expression.contains('|') {
            return self.apply_filter_pipeline(expression, context);
        }
        if WORD_BOOLEAN.is_match(expression) {
            return stringify(&Value::Bool(self.evaluate_boolean_expression(expression, context)));
        }
        self.resolve_variable(expression, context)
    }

    /// Resolve a dot path to its display string; missing paths are empty
    pub fn resolve_variable(&self, path: &str, context: &Value) -> String {
        data_get(context, path)
            .map(|value| stringify(&value))
            .unwrap_or_default()
    }

    /// `cond ? "a" : "b"`; anything else in ternary position renders empty
    pub fn evaluate_conditional(&self, expression: &str, context: &Value) -> String {
        let Some(caps) = TERNARY.captures(expression) else {
            return String::new();
        };
        if self.evaluate_condition(caps[1].trim(), context) {
            caps[2].to_string()
        } else {
            caps[3].to_string()
        }
    }

    fn apply_filter_pipeline(&self, expression: &str, context: &Value) -> String {
        let mut parts = expression.split('|');
        let path = parts.next().unwrap_or_default().trim();
        let mut value = data_get(context, path).unwrap_or(Value::Null);
        for filter in parts {
            value = self.filters.apply(value, filter.trim());
        }
        stringify(&value)
    }

    fn evaluate_condition(&self, condition: &str, context: &Value) -> bool {
        for op in OPERATORS {
            if let Some((left, right)) = split_operator(condition, op) {
                let left = self.resolve_value(left, context);
                let right = self.resolve_value(right, context);
                return match op {
                    "==" => loose_eq(&left, &right),
                    "!=" => !loose_eq(&left, &right),
                    ">=" => matches!(loose_cmp(&left, &right), Some(Ordering::Greater | Ordering::Equal)),
                    "<=" => matches!(loose_cmp(&left, &right), Some(Ordering::Less | Ordering::Equal)),
                    ">" => loose_cmp(&left, &right) == Some(Ordering::Greater),
                    _ => loose_cmp(&left, &right) == Some(Ordering::Less),
                };
            }
        }

        if WORD_BOOLEAN.is_match(condition) {
            return self.evaluate_boolean_expression(condition, context);
        }
        is_truthy(&self.resolve_value(condition, context))
    }

    /// Literal or variable, typed for comparison
    fn resolve_value(&self, text: &str, context: &Value) -> Value {
        if let Some(number) = parse_numeric(text) {
            return number;
        }
        if let Some(caps) = QUOTED.captures(text) {
            return Value::String(caps[1].to_string());
        }
        match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            path => coerce_scalar(&self.resolve_variable(path, context)),
        }
    }

    /// `a or b and !c`, short-circuiting left to right
    fn evaluate_boolean_expression(&self, expression: &str, context: &Value) -> bool {
        let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        OR_SPLIT.split(&normalized).any(|or_part| {
            AND_SPLIT.split(or_part.trim()).all(|token| {
                let token = token.trim();
                let stripped = token.trim_start_matches('!');
                let negations = token.len() - stripped.len();
                let value = is_truthy(&self.resolve_value(stripped.trim(), context));
                if negations % 2 == 1 {
                    !value
                } else {
                    value
                }
            })
        })
    }
}

/// Split `condition` around the first `op` with non-empty sides
fn split_operator<'a>(condition: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let index = condition.find(op)?;
    let left = condition[..index].trim();
    let right = condition[index + op.len()..].trim();
    // `>` inside `>=` is handled by the earlier operator
    if left.is_empty() || right.is_empty() || right.starts_with('=') {
        return None;
    }
    Some((left, right))
}
