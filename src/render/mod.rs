//! Template renderer for `{{ }}` interpolation
//!
//! This is the grammar driver mappings are written against:
//!
//! - Variables and dot paths: `{{ source.code }}`
//! - Function calls: `{{ route('redeem', {voucher: source.code}) }}`
//! - Null coalescing: `{{ source.owner.name ?? 'Unknown' }}`
//! - Concatenation: `{{ 'voucher_' ~ source.code }}`
//!
//! Rendering never fails. A block that cannot be evaluated renders as an
//! empty string and the rest of the template is left intact.

pub mod builtins;

use crate::context::{Context, FunctionTable};
use crate::value::{parse_numeric, to_display, unquote};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::debug;

static CALL: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?s)^(\w+)\((.*)\)$").expect("valid call regex"));

/// Renders `{{ }}` templates against a [`Context`]
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    globals: Arc<FunctionTable>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// Renderer with the built-in global functions
    pub fn new() -> Self {
        Self {
            globals: Arc::new(builtins::global_functions()),
        }
    }

    /// Renderer with a custom global function table
    pub fn with_globals(globals: FunctionTable) -> Self {
        Self {
            globals: Arc::new(globals),
        }
    }

    /// Render every `{{ }}` block in `template`
    pub fn render(&self, template: &str, ctx: &Context) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match find_block_end(after) {
                Some(end) => {
                    let inner = after[..end].trim();
                    if inner.is_empty() {
                        out.push_str(&rest[start..start + 2 + end + 2]);
                    } else {
                        out.push_str(&self.evaluate(inner, ctx));
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    // unterminated block, leave the remainder untouched
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Evaluate the inside of one `{{ }}` block to its display string
    pub fn evaluate(&self, expression: &str, ctx: &Context) -> String {
        let expression = expression.trim();

        if expression.contains("??") {
            return self.evaluate_null_coalescing(expression, ctx);
        }

        if expression.contains('~') {
            return self.evaluate_concatenation(expression, ctx);
        }

        if expression.contains('(') && expression.contains(')') {
            return self.evaluate_function(expression, ctx);
        }

        if let Some(literal) = unquote(expression) {
            return literal.to_string();
        }

        if let Some(number) = parse_numeric(expression) {
            return to_display(&number);
        }

        // dot paths and plain variables resolve the same way
        ctx.lookup(expression)
            .map(|value| to_display(&value))
            .unwrap_or_default()
    }

    fn evaluate_null_coalescing(&self, expression: &str, ctx: &Context) -> String {
        let Some((left, right)) = expression.split_once("??") else {
            return String::new();
        };
        let (left, right) = (left.trim(), right.trim());

        let left_value = self.evaluate(left, ctx);
        if !left_value.is_empty() && left_value != "null" {
            return left_value;
        }

        match unquote(right) {
            Some(literal) => literal.to_string(),
            None => self.evaluate(right, ctx),
        }
    }

    fn evaluate_concatenation(&self, expression: &str, ctx: &Context) -> String {
        expression
            .split('~')
            .map(str::trim)
            .map(|part| match unquote(part) {
                Some(literal) => literal.to_string(),
                None => self.evaluate(part, ctx),
            })
            .collect()
    }

    fn evaluate_function(&self, expression: &str, ctx: &Context) -> String {
        let Some(caps) = CALL.captures(expression) else {
            return String::new();
        };
        let name = &caps[1];
        let args = self.parse_arguments(&caps[2], ctx);

        let function = ctx.function(name).or_else(|| self.globals.get(name));
        match function {
            Some(f) => match f(&args) {
                Ok(value) => to_display(&value),
                Err(e) => {
                    debug!(function = name, error = %e, "template function failed");
                    String::new()
                }
            },
            None => {
                debug!(function = name, "unknown template function");
                String::new()
            }
        }
    }

    /// Split and resolve a call's argument list
    fn parse_arguments(&self, args: &str, ctx: &Context) -> Vec<Value> {
        if args.trim().is_empty() {
            return Vec::new();
        }
        split_top_level(args, ',')
            .iter()
            .map(|arg| self.parse_argument(arg.trim(), ctx))
            .collect()
    }

    fn parse_argument(&self, arg: &str, ctx: &Context) -> Value {
        if let Some(literal) = unquote(arg) {
            return Value::String(literal.to_string());
        }

        if arg.starts_with('{') && arg.ends_with('}') {
            return self.parse_object_literal(&arg[1..arg.len() - 1], ctx);
        }

        if arg.starts_with('[') && arg.ends_with(']') {
            let inner = &arg[1..arg.len() - 1];
            if inner.trim().is_empty() {
                return Value::Array(Vec::new());
            }
            return Value::Array(
                split_top_level(inner, ',')
                    .iter()
                    .map(|item| self.parse_argument(item.trim(), ctx))
                    .collect(),
            );
        }

        if let Some(number) = parse_numeric(arg) {
            return number;
        }

        match arg {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            expression => Value::String(self.evaluate(expression, ctx)),
        }
    }

    fn parse_object_literal(&self, content: &str, ctx: &Context) -> Value {
        let mut map = Map::new();
        if content.trim().is_empty() {
            return Value::Object(map);
        }
        for pair in split_top_level(content, ',') {
            if let Some((key, value)) = pair.split_once(':') {
                let key = key.trim();
                let key = unquote(key).unwrap_or(key);
                map.insert(key.to_string(), self.parse_argument(value.trim(), ctx));
            }
        }
        Value::Object(map)
    }
}

/// Find the `}}` closing a block, skipping quoted text and nested braces
fn find_block_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q && (i == 0 || bytes[i - 1] != b'\\') {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    // an unbalanced quote swallowed the terminator; fall back to the first `}}`
    if quote.is_some() {
        return s.find("}}");
    }
    None
}

/// Split on `sep` outside quotes, braces, brackets and parentheses
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for ch in s.chars() {
        match quote {
            Some(q) => {
                if ch == q && prev != Some('\\') {
                    quote = None;
                }
                current.push(ch);
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '{' | '[' | '(' => {
                    depth += 1;
                    current.push(ch);
                }
                '}' | ']' | ')' => {
                    depth -= 1;
                    current.push(ch);
                }
                c if c == sep && depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                c => current.push(c),
            },
        }
        prev = Some(ch);
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
