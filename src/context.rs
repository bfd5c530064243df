//! Evaluation context and host helper callables
//!
//! A [`Context`] is what one `{{ }}` block or condition is evaluated
//! against: named variables (`source`, `constants`, `item`, ...) plus a
//! table of callables. Contexts are immutable per call; iteration derives
//! child contexts with [`Context::with`] instead of mutating the parent.

use crate::value::{data_get, to_display};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A callable reachable from templates, e.g. `route('home')`
///
/// Errors are plain messages; the renderer swallows them.
pub type HelperFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Named callables available to a context
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, HelperFn>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a callable
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&HelperFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("functions", &self.names())
            .finish()
    }
}

/// Variables and callables visible to one evaluation
///
/// The shared base layer is reference counted, so deriving an item context
/// for every element of an array does not copy the source object.
#[derive(Clone, Debug, Default)]
pub struct Context {
    base: Arc<Map<String, Value>>,
    locals: Map<String, Value>,
    functions: Arc<FunctionTable>,
}

impl Context {
    pub fn new(vars: Map<String, Value>) -> Self {
        Self {
            base: Arc::new(vars),
            locals: Map::new(),
            functions: Arc::new(FunctionTable::default()),
        }
    }

    /// Build a context from an arbitrary value
    ///
    /// Objects become the variable set; any other value is exposed as `item`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            other => {
                let mut map = Map::new();
                map.insert("item".to_string(), other);
                Self::new(map)
            }
        }
    }

    pub fn with_functions(mut self, functions: Arc<FunctionTable>) -> Self {
        self.functions = functions;
        self
    }

    /// Derive a child context with one extra (or shadowed) variable
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut child = self.clone();
        child.locals.insert(key.into(), value);
        child
    }

    /// Top-level variable by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.locals.get(key).or_else(|| self.base.get(key))
    }

    /// Dot-path lookup rooted at the variables (`source.owner.name`)
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let path = path.trim();
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let root = self.get(head.trim())?;
        match rest {
            Some(rest) => data_get(root, rest),
            None => Some(root.clone()),
        }
    }

    pub fn function(&self, name: &str) -> Option<&HelperFn> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    /// Flatten the variables into one JSON object
    pub fn to_value(&self) -> Value {
        let mut map = (*self.base).clone();
        for (k, v) in &self.locals {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

/// Host environment behind the `config`, `env`, `session`, `route`, `url`,
/// `asset` and `now` helpers
#[derive(Debug, Clone, Default)]
pub struct Host {
    pub base_url: String,
    pub asset_url: Option<String>,
    pub routes: BTreeMap<String, String>,
    pub config: Value,
    pub session: Value,
    /// Fixed clock; `None` reads the system clock
    pub now: Option<DateTime<Utc>>,
}

impl Host {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_route(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.routes.insert(name.into(), pattern.into());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = session;
        self
    }

    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    /// Absolute URL for a path relative to `base_url`
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn asset(&self, path: &str) -> String {
        join_url(self.asset_url.as_deref().unwrap_or(&self.base_url), path)
    }

    /// Resolve a named route, filling `{param}` placeholders
    ///
    /// Parameters that match no placeholder are appended as a query string.
    pub fn route(&self, name: &str, params: &Value) -> Result<String, String> {
        let pattern = self
            .routes
            .get(name)
            .ok_or_else(|| format!("Route [{}] not defined.", name))?;

        let mut path = pattern.clone();
        let mut extra: Vec<(String, String)> = Vec::new();
        match params {
            Value::Object(map) => {
                for (key, value) in map {
                    let value = to_display(value);
                    let required = format!("{{{}}}", key);
                    let optional = format!("{{{}?}}", key);
                    if path.contains(&required) || path.contains(&optional) {
                        let segment = urlencoding::encode(&value);
                        path = path.replace(&required, &segment).replace(&optional, &segment);
                    } else {
                        extra.push((key.clone(), value));
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    path = fill_first_placeholder(&path, &urlencoding::encode(&to_display(item)));
                }
            }
            Value::Null => {}
            scalar => {
                path = fill_first_placeholder(&path, &urlencoding::encode(&to_display(scalar)))
            }
        }
        path = strip_optional_placeholders(&path);

        let mut url = self.url(&path);
        if !extra.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&extra)
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        Ok(url)
    }

    /// The helper callables backed by this host
    pub fn functions(&self) -> FunctionTable {
        let mut table = FunctionTable::new();

        let config = self.config.clone();
        table.register("config", move |args| {
            let key = args.first().map(to_display).unwrap_or_default();
            let default = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(data_get(&config, &key).unwrap_or(default))
        });

        table.register("env", |args| {
            let key = args.first().map(to_display).unwrap_or_default();
            let default = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(match std::env::var(&key) {
                Ok(raw) => match raw.to_lowercase().as_str() {
                    "true" | "(true)" => Value::Bool(true),
                    "false" | "(false)" => Value::Bool(false),
                    "null" | "(null)" => Value::Null,
                    "empty" | "(empty)" => Value::String(String::new()),
                    _ => Value::String(raw),
                },
                Err(_) => default,
            })
        });

        let session = self.session.clone();
        table.register("session", move |args| {
            let key = args.first().map(to_display).unwrap_or_default();
            let default = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(data_get(&session, &key).unwrap_or(default))
        });

        let host = Arc::new(self.clone());
        let h = Arc::clone(&host);
        table.register("route", move |args| {
            let name = args
                .first()
                .map(to_display)
                .ok_or_else(|| "route() expects a name".to_string())?;
            let params = args.get(1).cloned().unwrap_or(Value::Null);
            h.route(&name, &params).map(Value::String)
        });

        let h = Arc::clone(&host);
        table.register("url", move |args| {
            let path = args.first().map(to_display).unwrap_or_default();
            Ok(Value::String(h.url(&path)))
        });

        let h = Arc::clone(&host);
        table.register("asset", move |args| {
            let path = args.first().map(to_display).unwrap_or_default();
            Ok(Value::String(h.asset(&path)))
        });

        let h = host;
        table.register("now", move |_| Ok(Value::String(h.now().to_rfc3339())));

        table
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, _) => format!("/{}", path),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, path),
    }
}

fn fill_first_placeholder(path: &str, value: &str) -> String {
    match (path.find('{'), path.find('}')) {
        (Some(start), Some(end)) if start < end => {
            format!("{}{}{}", &path[..start], value, &path[end + 1..])
        }
        _ => path.to_string(),
    }
}

fn strip_optional_placeholders(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let placeholder = &rest[start..start + len + 1];
        out.push_str(&rest[..start]);
        if !placeholder.ends_with("?}") {
            out.push_str(placeholder);
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out.trim_end_matches('/').to_string()
}
