//! Global functions available to every template
//!
//! Context callables (`route`, `config`, ...) take precedence; these are the
//! fallback when a call names nothing in the context.

use crate::context::FunctionTable;
use crate::value::{format_number, is_truthy, parse_numeric, to_display};
use serde_json::Value;

/// The default global function table
pub fn global_functions() -> FunctionTable {
    let mut table = FunctionTable::new();
    table.register("upper", |args| Ok(text(args, 0).to_uppercase().into()));
    table.register("lower", |args| Ok(text(args, 0).to_lowercase().into()));
    table.register("trim", |args| Ok(text(args, 0).trim().to_string().into()));
    table.register("ucfirst", |args| Ok(ucfirst(&text(args, 0)).into()));
    table.register("count", |args| Ok(Value::from(count(args.first()))));
    table.register("join", |args| {
        let separator = text(args, 0);
        let items = as_list(args.get(1)).ok_or("join() expects a list")?;
        let parts: Vec<String> = items.iter().map(to_display).collect();
        Ok(parts.join(&separator).into())
    });
    table.register("number_format", |args| {
        let n = args
            .first()
            .and_then(as_number)
            .ok_or("number_format() expects a number")?;
        let decimals = args.get(1).and_then(as_number).unwrap_or(0.0).max(0.0) as usize;
        let dec_point = args.get(2).map(to_display).unwrap_or_else(|| ".".into());
        let thousands = args.get(3).map(to_display).unwrap_or_else(|| ",".into());
        Ok(format_number(n, decimals, &dec_point, &thousands).into())
    });
    table.register("json", |args| {
        let value = args.first().cloned().unwrap_or(Value::Null);
        serde_json::to_string(&value)
            .map(Value::String)
            .map_err(|e| e.to_string())
    });
    table.register("default", |args| {
        let value = args.first().cloned().unwrap_or(Value::Null);
        if is_truthy(&value) {
            Ok(value)
        } else {
            Ok(args.get(1).cloned().unwrap_or(Value::Null))
        }
    });
    table
}

fn text(args: &[Value], index: usize) -> String {
    args.get(index).map(to_display).unwrap_or_default()
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s).and_then(|n| n.as_f64()),
        _ => None,
    }
}

/// Arguments arrive rendered, so a list may be its JSON text
fn as_list(value: Option<&Value>) -> Option<Vec<Value>> {
    match value? {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn count(value: Option<&Value>) -> usize {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Object(map)) => map.len(),
        Some(v) => match as_list(Some(v)) {
            Some(items) => items.len(),
            None => match v {
                Value::String(s) if s.is_empty() => 0,
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(Value::Object(map)) => map.len(),
                    _ => 1,
                },
                _ => 1,
            },
        },
    }
}
