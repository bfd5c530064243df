//! Parsed mapping rules
//!
//! Each `mappings.<field>` entry of a driver file becomes a [`MappingSpec`]
//! when the driver is loaded. The shape of the raw value decides the
//! variant:
//!
//! | Raw value | Variant |
//! |---|---|
//! | `null`, number, bool, string without `{{` | `Literal` |
//! | string containing `{{` | `Template` |
//! | `{template: "..."}` | `TemplateObject` |
//! | `{source, transform, handler?, condition?, separator?}` | `Transform` |
//! | `{from, when?}` | `From` |
//! | `{when, then?, else?}` | `Conditional` |
//! | any other object | `Nested` |
//! | list | `Sequence` |

use crate::expr::Condition;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Raw nesting allowed in a single mapping entry
pub const MAX_SPEC_DEPTH: usize = 64;

/// Collection operations for `Transform` mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    ArrayMap,
    Filter,
    First,
    Count,
    Join,
}

impl FromStr for TransformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "array_map" => Ok(TransformKind::ArrayMap),
            "filter" => Ok(TransformKind::Filter),
            "first" => Ok(TransformKind::First),
            "count" => Ok(TransformKind::Count),
            "join" => Ok(TransformKind::Join),
            other => Err(format!(
                "unknown transform '{}' (expected array_map, filter, first, count or join)",
                other
            )),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformKind::ArrayMap => "array_map",
            TransformKind::Filter => "filter",
            TransformKind::First => "first",
            TransformKind::Count => "count",
            TransformKind::Join => "join",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    /// Dot path relative to the source object
    pub source: String,
    pub kind: TransformKind,
    /// Per-item mapping for `array_map`
    pub handler: Option<MappingSpec>,
    /// Item predicate for `filter`
    pub condition: Option<Condition>,
    /// Separator for `join`
    pub separator: Option<String>,
}

/// Where a `From` mapping takes its value
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    Spec(Box<MappingSpec>),
    Template(String),
    /// Dot path looked up directly in the context
    Path(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MappingSpec {
    Literal(Value),
    Template(String),
    TemplateObject(String),
    Transform(Box<TransformSpec>),
    Conditional {
        when: Condition,
        then: Option<Box<MappingSpec>>,
        otherwise: Option<Box<MappingSpec>>,
    },
    From {
        from: FromSource,
        when: Option<Condition>,
    },
    Nested(Vec<(String, MappingSpec)>),
    Sequence(Vec<MappingSpec>),
}

impl MappingSpec {
    /// Parse a raw mapping value; errors name the offending field path
    pub fn parse(value: &Value, field: &str) -> Result<Self, String> {
        parse_at(value, field, 0)
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, MappingSpec::Literal(_))
    }
}

fn parse_at(value: &Value, field: &str, depth: usize) -> Result<MappingSpec, String> {
    if depth > MAX_SPEC_DEPTH {
        return Err(format!("{}: mapping nested deeper than {}", field, MAX_SPEC_DEPTH));
    }

    let map = match value {
        Value::String(s) if s.contains("{{") => return Ok(MappingSpec::Template(s.clone())),
        Value::Array(items) => {
            return items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_at(item, &format!("{}.{}", field, i), depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(MappingSpec::Sequence);
        }
        Value::Object(map) => map,
        scalar => return Ok(MappingSpec::Literal(scalar.clone())),
    };

    if let Some(template) = map.get("template") {
        return match template {
            Value::String(s) => Ok(MappingSpec::TemplateObject(s.clone())),
            _ => Err(format!("{}.template: expected a string", field)),
        };
    }

    if map.contains_key("source") && map.contains_key("transform") {
        return parse_transform(map, field, depth).map(|t| MappingSpec::Transform(Box::new(t)));
    }

    if let Some(from) = map.get("from") {
        let from = match from {
            Value::Array(_) | Value::Object(_) => {
                FromSource::Spec(Box::new(parse_at(from, &format!("{}.from", field), depth + 1)?))
            }
            Value::String(s) if s.contains("{{") => FromSource::Template(s.clone()),
            Value::String(s) if s.contains('.') => FromSource::Path(s.clone()),
            other => FromSource::Literal(other.clone()),
        };
        let when = optional_condition(map.get("when"), &format!("{}.when", field))?;
        return Ok(MappingSpec::From { from, when });
    }

    if let Some(when) = map.get("when") {
        let when = condition(when, &format!("{}.when", field))?;
        let branch = |key: &str| -> Result<Option<Box<MappingSpec>>, String> {
            map.get(key)
                .map(|v| parse_at(v, &format!("{}.{}", field, key), depth + 1).map(Box::new))
                .transpose()
        };
        return Ok(MappingSpec::Conditional {
            when,
            then: branch("then")?,
            otherwise: branch("else")?,
        });
    }

    map.iter()
        .map(|(key, v)| {
            parse_at(v, &format!("{}.{}", field, key), depth + 1).map(|spec| (key.clone(), spec))
        })
        .collect::<Result<Vec<_>, String>>()
        .map(MappingSpec::Nested)
}

fn parse_transform(
    map: &serde_json::Map<String, Value>,
    field: &str,
    depth: usize,
) -> Result<TransformSpec, String> {
    let source = match map.get("source") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(format!("{}.source: expected a non-empty dot path", field)),
    };
    let kind = match map.get("transform") {
        Some(Value::String(s)) => s.parse::<TransformKind>().map_err(|e| format!("{}.transform: {}", field, e))?,
        _ => return Err(format!("{}.transform: expected a string", field)),
    };
    let handler = map
        .get("handler")
        .filter(|v| !v.is_null())
        .map(|v| parse_at(v, &format!("{}.handler", field), depth + 1))
        .transpose()?;
    let condition = optional_condition(map.get("condition"), &format!("{}.condition", field))?;
    let separator = match map.get("separator") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(format!("{}.separator: expected a string", field)),
    };
    Ok(TransformSpec {
        source,
        kind,
        handler,
        condition,
        separator,
    })
}

/// Compile a condition field
pub(crate) fn condition(value: &Value, field: &str) -> Result<Condition, String> {
    match value {
        Value::String(s) => Condition::parse(s).map_err(|e| format!("{}: {}", field, e)),
        Value::Bool(b) => Condition::parse(if *b { "true" } else { "false" }).map_err(|e| e.to_string()),
        _ => Err(format!("{}: expected a condition string", field)),
    }
}

fn optional_condition(value: Option<&Value>, field: &str) -> Result<Option<Condition>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => condition(v, field).map(Some),
    }
}
