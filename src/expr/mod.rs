//! Boolean condition evaluator
//!
//! Conditions gate transforms, filter array items and suppress whole flows:
//!
//! ```text
//! source.amount > 100 && source.status != 'void'
//! item.type in ['selfie', 'signature']
//! (a == 1 && b == 2) || !empty(source.notes)
//! ```
//!
//! A condition is parsed once into a [`Condition`] tree. Operands that are
//! not plain literals or paths are resolved through the [`TemplateRenderer`],
//! so anything valid inside `{{ }}` is valid as an operand. Evaluation is a
//! pure function of the condition and the context.
//!
//! A bare operand is true unless its rendered text is empty, `0` or `false`.
//! An empty list renders as `[]` and so is true; test collections with
//! `empty()`.

pub mod ast;
pub mod lexer;

pub use ast::{Condition, Expr, Operand};
pub use lexer::CompareOp;

use crate::context::Context;
use crate::render::TemplateRenderer;
use crate::value::{
    coerce_scalar, is_empty, is_truthy, loose_cmp, loose_eq, strict_eq, to_display,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Parsed conditions kept per evaluator; cleared when full
const CACHE_LIMIT: usize = 1024;

/// Evaluates boolean conditions against a [`Context`]
#[derive(Debug, Clone, Default)]
pub struct ExpressionEvaluator {
    renderer: TemplateRenderer,
    cache: Arc<RwLock<HashMap<String, Arc<Condition>>>>,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator resolving operands through a specific renderer
    pub fn with_renderer(renderer: TemplateRenderer) -> Self {
        Self {
            renderer,
            cache: Arc::default(),
        }
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    /// Evaluate a condition string; a condition that fails to parse is false
    pub fn evaluate(&self, expression: &str, ctx: &Context) -> bool {
        match self.compile(expression) {
            Some(condition) => self.evaluate_compiled(&condition, ctx),
            None => false,
        }
    }

    /// Evaluate against a bare value; non-objects are exposed as `item`
    pub fn evaluate_value(&self, expression: &str, value: &Value) -> bool {
        self.evaluate(expression, &Context::from_value(value.clone()))
    }

    pub fn evaluate_compiled(&self, condition: &Condition, ctx: &Context) -> bool {
        self.eval(condition.expr(), ctx)
    }

    fn compile(&self, expression: &str) -> Option<Arc<Condition>> {
        let key = expression.trim();
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
        {
            return Some(Arc::clone(hit));
        }

        let condition = match Condition::parse(key) {
            Ok(condition) => Arc::new(condition),
            Err(e) => {
                debug!(expression = key, error = %e, "condition did not parse");
                return None;
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.len() >= CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(key.to_string(), Arc::clone(&condition));
        Some(condition)
    }

    fn eval(&self, expr: &Expr, ctx: &Context) -> bool {
        match expr {
            Expr::Or(terms) => terms.iter().any(|t| self.eval(t, ctx)),
            Expr::And(terms) => terms.iter().all(|t| self.eval(t, ctx)),
            Expr::Not(inner) => !self.eval(inner, ctx),
            Expr::Bool(b) => *b,
            Expr::Compare { left, op, right } => {
                let left = self.resolve(left, ctx);
                let right = self.resolve(right, ctx);
                compare(&left, *op, &right)
            }
            Expr::In { needle, haystack } => self.evaluate_in(needle, haystack, ctx),
            Expr::Empty(operand) => match self.resolve(operand, ctx) {
                Value::String(s) if s == "true" => false,
                Value::String(s) if s == "false" => true,
                other => is_empty(&other),
            },
            Expr::Truthy(operand) => self.truthy(operand, ctx),
        }
    }

    /// Resolve an operand to a typed value for comparison
    fn resolve(&self, operand: &Operand, ctx: &Context) -> Value {
        match operand {
            Operand::Literal(value) => value.clone(),
            Operand::List(items) => Value::Array(items.iter().map(|i| self.resolve(i, ctx)).collect()),
            Operand::Path(path) => match ctx.lookup(path) {
                Some(Value::String(s)) => coerce_scalar(&s),
                Some(value) => value,
                None => Value::Null,
            },
            Operand::Expression(text) => coerce_scalar(&self.renderer.evaluate(text, ctx)),
        }
    }

    fn evaluate_in(&self, needle: &Operand, haystack: &Operand, ctx: &Context) -> bool {
        // membership is strict, so the needle keeps its stored type
        let needle = match needle {
            Operand::Path(path) => ctx.lookup(path).unwrap_or(Value::Null),
            Operand::Expression(text) => Value::String(self.renderer.evaluate(text, ctx)),
            other => self.resolve(other, ctx),
        };

        let items = match haystack {
            Operand::List(_) | Operand::Literal(_) => self.resolve(haystack, ctx),
            Operand::Path(path) => ctx.lookup(path).unwrap_or(Value::Null),
            Operand::Expression(text) => {
                serde_json::from_str(&self.renderer.evaluate(text, ctx)).unwrap_or(Value::Null)
            }
        };

        match items {
            Value::Array(items) => items.iter().any(|item| strict_eq(item, &needle)),
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(Value::Array(items)) => items.iter().any(|item| strict_eq(item, &needle)),
                _ => false,
            },
            _ => false,
        }
    }

    fn truthy(&self, operand: &Operand, ctx: &Context) -> bool {
        match operand {
            Operand::Literal(value) => is_truthy(value),
            Operand::List(items) => !items.is_empty(),
            // a path is judged by its rendered text, so `[]` and `{}` hold
            Operand::Path(path) => ctx
                .lookup(path)
                .is_some_and(|value| text_to_bool(&to_display(&value))),
            Operand::Expression(text) => text_to_bool(&self.renderer.evaluate(text, ctx)),
        }
    }
}

/// Interpret rendered text as a boolean
pub fn text_to_bool(text: &str) -> bool {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" | "" => false,
        _ => true,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_eq(left, right),
        CompareOp::Ne => !loose_eq(left, right),
        CompareOp::Gt => loose_cmp(left, right) == Some(Ordering::Greater),
        CompareOp::Lt => loose_cmp(left, right) == Some(Ordering::Less),
        CompareOp::Ge => matches!(loose_cmp(left, right), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Le => matches!(loose_cmp(left, right), Some(Ordering::Less | Ordering::Equal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FunctionTable;
    use serde_json::json;

    fn eval(expr: &str, value: Value) -> bool {
        ExpressionEvaluator::new().evaluate_value(expr, &value)
    }

    #[test]
    fn test_boolean_literals() {
        assert!(eval("true", json!({})));
        assert!(!eval("false", json!({"false": true})));
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(eval("amount > 100", json!({"amount": 150})));
        assert!(!eval("amount > 100", json!({"amount": 50})));
        assert!(eval("amount >= 100", json!({"amount": "100"})));
        assert!(eval("source.amount <= 10.5", json!({"source": {"amount": 10}})));
    }

    #[test]
    fn test_equality_with_strings() {
        let ctx = json!({"source": {"status": "active"}});
        assert!(eval("source.status == 'active'", ctx.clone()));
        assert!(eval("source.status != \"void\"", ctx.clone()));
        assert!(!eval("source.status == 'void'", ctx));
    }

    #[test]
    fn test_in_membership_is_strict() {
        assert!(eval("x in ['x', 'y']", json!({"x": "x"})));
        assert!(!eval("x in ['x', 'y']", json!({"x": "z"})));
        assert!(!eval("n in ['1', '2']", json!({"n": 1})));
        assert!(eval("n in [1, 2]", json!({"n": 1})));
        assert!(eval("'kyc' in source.inputs", json!({"source": {"inputs": ["kyc", "otp"]}})));
        assert!(!eval("'kyc' in source.missing", json!({"source": {}})));
    }

    #[test]
    fn test_nested_parentheses() {
        let ctx = json!({"a": 1, "b": 3, "c": 3});
        assert!(eval("(a == 1 && b == 2) || c == 3", ctx.clone()));
        assert!(!eval("(a == 1 && b == 2) || (c == 4)", ctx.clone()));
        assert!(eval("((a == 1) && (b == 3 || c == 9))", ctx));
    }

    #[test]
    fn test_negation() {
        assert!(eval("!flag", json!({"flag": false})));
        assert!(!eval("!flag", json!({"flag": true})));
        assert!(eval("!status == 'done'", json!({"status": "open"})));
    }

    #[test]
    fn test_empty_handles_boolean_strings() {
        assert!(eval("empty(notes)", json!({"notes": ""})));
        assert!(eval("empty(items)", json!({"items": []})));
        assert!(!eval("empty(items)", json!({"items": [1]})));
        assert!(!eval("empty(flag)", json!({"flag": "true"})));
        assert!(eval("empty(flag)", json!({"flag": "false"})));
        assert!(eval("empty(missing)", json!({})));
    }

    #[test]
    fn test_truthiness_of_paths() {
        assert!(eval("source.enabled", json!({"source": {"enabled": "true"}})));
        assert!(!eval("source.enabled", json!({"source": {"enabled": "0"}})));
        assert!(!eval("source.missing", json!({"source": {}})));
        assert!(!eval("source.flag", json!({"source": {"flag": false}})));
        assert!(!eval("source.count", json!({"source": {"count": 0}})));
    }

    #[test]
    fn test_collection_paths_are_truthy() {
        assert!(eval("source.items", json!({"source": {"items": []}})));
        assert!(eval("source.meta", json!({"source": {"meta": {}}})));
        assert!(eval("source.items && source.on", json!({"source": {"items": [], "on": true}})));
    }

    #[test]
    fn test_function_call_operand() {
        let mut table = FunctionTable::new();
        table.register("enabled", |_| Ok(Value::Bool(true)));
        let ctx = Context::from_value(json!({"n": 3})).with_functions(Arc::new(table));
        let evaluator = ExpressionEvaluator::new();
        assert!(evaluator.evaluate("enabled()", &ctx));
        assert!(evaluator.evaluate("count(list) == 0", &ctx));
        assert!(evaluator.evaluate("enabled() && n == 3", &ctx));
    }

    #[test]
    fn test_non_object_context_is_item() {
        assert!(eval("item == 5", json!(5)));
        assert!(eval("item.kind == 'a'", json!({"item": {"kind": "a"}})));
    }

    #[test]
    fn test_unparseable_is_false() {
        assert!(!eval("(a == 1", json!({"a": 1})));
        assert!(!eval("", json!({})));
    }

    #[test]
    fn test_same_inputs_same_result() {
        let evaluator = ExpressionEvaluator::new();
        let ctx = Context::from_value(json!({"a": 2}));
        let first = evaluator.evaluate("a > 1", &ctx);
        for _ in 0..5 {
            assert_eq!(evaluator.evaluate("a > 1", &ctx), first);
        }
    }
}
