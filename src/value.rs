//! Value helpers shared by the interpreters
//!
//! Source objects, contexts and mapping results are all `serde_json::Value`
//! trees. This module holds the loose, scripting-style semantics the
//! template grammars need on top of that: dot-path lookup, display
//! conversion, truthiness, numeric-string detection and comparisons.

use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::sync::LazyLock;

static NUMERIC: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid numeric regex")
});

/// Look up a dot-notation path (`source.owner.name`, `items.0`, `items.*.id`)
///
/// `*` plucks the remaining path from every element of an array (or every
/// value of an object). Returns `None` when any segment is missing.
pub fn data_get(root: &Value, path: &str) -> Option<Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(root.clone());
    }
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    get_segments(root, &segments)
}

fn get_segments(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    if *head == "*" {
        let children: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => return None,
        };
        let nested_wildcard = rest.contains(&"*");
        let mut plucked = Vec::with_capacity(children.len());
        for child in children {
            let item = get_segments(child, rest).unwrap_or(Value::Null);
            match item {
                // a second wildcard collapses one level, like Laravel's data_get
                Value::Array(inner) if nested_wildcard => plucked.extend(inner),
                other => plucked.push(other),
            }
        }
        return Some(Value::Array(plucked));
    }

    let next = match value {
        Value::Object(map) => map.get(*head)?,
        Value::Array(items) => items.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    get_segments(next, rest)
}

/// Render a value the way `{{ }}` interpolation shows it
///
/// `null` becomes the empty string, booleans become `"true"`/`"false"`,
/// arrays and objects become compact JSON.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Format a JSON number without a trailing `.0` for integral floats
pub fn number_to_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map(format_float).unwrap_or_default()
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Build a number value from an `f64`; NaN and infinities become `null`
pub fn number(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Scripting-style truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// The `empty()` test: null, false, 0, "", "0" and empty collections
pub fn is_empty(value: &Value) -> bool {
    !is_truthy(value)
}

/// Whether a string is a numeric literal (`12`, `-3.5`, `.5`, `1e3`)
pub fn is_numeric(s: &str) -> bool {
    NUMERIC.is_match(s.trim())
}

/// Parse a numeric string; a `.` or exponent yields a float, otherwise an integer
pub fn parse_numeric(s: &str) -> Option<Value> {
    let s = s.trim();
    if !is_numeric(s) {
        return None;
    }
    let is_float = s.contains('.') || s.contains('e') || s.contains('E');
    if !is_float {
        if let Ok(i) = s.parse::<i64>() {
            return Some(Value::from(i));
        }
    }
    s.parse::<f64>().ok().map(number)
}

/// Turn rendered text back into a typed scalar
///
/// Numeric strings become numbers and `"true"`/`"false"` become booleans;
/// everything else stays a string.
pub fn coerce_scalar(text: &str) -> Value {
    if let Some(n) = parse_numeric(text) {
        return n;
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

/// Strip matching single or double quotes from a literal
pub fn unquote(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' || first == b'"') && first == last {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

fn numeric_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if is_numeric(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Loose equality (`==`) between two values
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), other) | (other, Value::Bool(x)) => *x == is_truthy(other),
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::Null, other) | (other, Value::Null) => !is_truthy(other),
        (Value::Number(_), Value::Number(_)) => numeric_of(a) == numeric_of(b),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            if is_numeric(s) {
                n.as_f64() == s.trim().parse::<f64>().ok()
            } else {
                number_to_string(n) == *s
            }
        }
        (Value::String(x), Value::String(y)) => match (numeric_of(a), numeric_of(b)) {
            (Some(l), Some(r)) => l == r,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| loose_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| loose_eq(l, r)))
        }
        _ => false,
    }
}

/// Loose ordering between two values; `None` when they are not comparable
pub fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(_), _) | (_, Value::Bool(_)) => Some(is_truthy(a).cmp(&is_truthy(b))),
        (Value::Null, Value::String(s)) => Some("".cmp(s.as_str())),
        (Value::String(s), Value::Null) => Some(s.as_str().cmp("")),
        (Value::Null, _) | (_, Value::Null) => Some(is_truthy(a).cmp(&is_truthy(b))),
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                return Some(x.len().cmp(&y.len()));
            }
            for (l, r) in x.iter().zip(y) {
                match loose_cmp(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(Ordering::Equal)
        }
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        _ => match (numeric_of(a), numeric_of(b)) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => Some(to_display(a).cmp(&to_display(b))),
        },
    }
}

/// Strict equality (`===`): same kind of value, numbers compared numerically
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| strict_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| strict_eq(l, r)))
        }
        _ => a == b,
    }
}

/// Format a number with grouped thousands and fixed decimals (`1,234.50`)
pub fn format_number(value: f64, decimals: usize, dec_point: &str, thousands: &str) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed.clone(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push_str(thousands);
        }
        grouped.push(ch);
    }

    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    let mut out = String::new();
    if value < 0.0 && !is_zero {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push_str(dec_point);
        out.push_str(&frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_get_nested() {
        let root = json!({"source": {"owner": {"name": "Ana"}, "items": [1, 2]}});
        assert_eq!(data_get(&root, "source.owner.name"), Some(json!("Ana")));
        assert_eq!(data_get(&root, "source.items.1"), Some(json!(2)));
        assert_eq!(data_get(&root, "source.missing"), None);
    }

    #[test]
    fn test_data_get_wildcard() {
        let root = json!({"steps": [{"handler": "form"}, {"handler": "kyc"}, {}]});
        assert_eq!(
            data_get(&root, "steps.*.handler"),
            Some(json!(["form", "kyc", null]))
        );
    }

    #[test]
    fn test_to_display() {
        assert_eq!(to_display(&Value::Null), "");
        assert_eq!(to_display(&json!(true)), "true");
        assert_eq!(to_display(&json!(2.0)), "2");
        assert_eq!(to_display(&json!(2.5)), "2.5");
        assert_eq!(to_display(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("42"), Some(json!(42)));
        assert_eq!(parse_numeric("-1.5"), Some(json!(-1.5)));
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric(""), None);
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!("100"), &json!(100)));
        assert!(loose_eq(&json!(1), &json!(true)));
        assert!(loose_eq(&Value::Null, &json!("")));
        assert!(!loose_eq(&json!("a"), &json!(0)));
        assert!(!loose_eq(&json!("abc"), &json!("abd")));
    }

    #[test]
    fn test_loose_cmp() {
        assert_eq!(loose_cmp(&json!(150), &json!(100)), Some(Ordering::Greater));
        assert_eq!(loose_cmp(&json!("9"), &json!("10")), Some(Ordering::Less));
        assert_eq!(loose_cmp(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(loose_cmp(&json!([1]), &json!({"a": 1})), None);
    }

    #[test]
    fn test_strict_eq() {
        assert!(strict_eq(&json!("x"), &json!("x")));
        assert!(!strict_eq(&json!("5"), &json!(5)));
        assert!(strict_eq(&json!(5), &json!(5.0)));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1234.5, 2, ".", ","), "1,234.50");
        assert_eq!(format_number(5.0, 2, ".", ","), "5.00");
        assert_eq!(format_number(-1234567.891, 2, ".", ","), "-1,234,567.89");
        assert_eq!(format_number(999.0, 0, ".", ","), "999");
    }
}
