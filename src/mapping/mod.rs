//! Mapping engine: source object + driver → target record
//!
//! ```yaml
//! driver:
//!   name: voucher-redemption
//!   version: "1.0"
//!   source: App\Models\Voucher
//!   target: FormFlowInstructions
//! mappings:
//!   reference_id: "disburse-{{ source.code }}"
//!   steps:
//!     source: instructions.inputs.fields
//!     transform: array_map
//!     handler:
//!       handler: "{{ item }}"
//!       config:
//!         title: "{{ item }}"
//! filters:
//!   skip_flow_if:
//!     - "source.redeemed == true"
//! ```
//!
//! Mappings resolve in declaration order against one context per call:
//! `source`, the driver `constants`, and the host helper functions.

pub mod spec;
pub mod target;

pub use spec::{FromSource, MappingSpec, TransformKind, TransformSpec};
pub use target::{TargetBuilder, TargetRegistry, FORM_FLOW_INSTRUCTIONS};

use crate::context::{Context, FunctionTable, Host};
use crate::driver::DriverConfig;
use crate::error::Result;
use crate::expr::ExpressionEvaluator;
use crate::flow::FormFlowInstructions;
use crate::render::TemplateRenderer;
use crate::value::{data_get, to_display};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default recursion limit for nested mappings
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Applies driver mappings to source objects
#[derive(Debug, Clone)]
pub struct MappingEngine {
    renderer: TemplateRenderer,
    evaluator: ExpressionEvaluator,
    functions: Arc<FunctionTable>,
    targets: TargetRegistry,
    max_depth: usize,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingEngine {
    pub fn new() -> Self {
        Self::with_host(&Host::default())
    }

    /// Engine whose templates call the given host's helpers
    pub fn with_host(host: &Host) -> Self {
        let renderer = TemplateRenderer::new();
        Self {
            evaluator: ExpressionEvaluator::with_renderer(renderer.clone()),
            renderer,
            functions: Arc::new(host.functions()),
            targets: TargetRegistry::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_targets(mut self, targets: TargetRegistry) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetRegistry {
        &mut self.targets
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    /// The context every mapping of one `transform` call sees
    pub fn build_context(&self, source: &Value, driver: &DriverConfig) -> Context {
        let mut vars = Map::new();
        vars.insert("source".to_string(), source.clone());
        vars.insert("constants".to_string(), Value::Object(driver.constants.clone()));
        Context::new(vars).with_functions(Arc::clone(&self.functions))
    }

    /// Transform `source` with `driver`
    ///
    /// Returns `Ok(None)` when a `skip_flow_if` condition matched. Fails only
    /// when the driver's target type cannot be resolved or the mapped record
    /// does not fit it.
    pub fn transform(&self, source: &Value, driver: &DriverConfig) -> Result<Option<Value>> {
        let builder = self.targets.resolve(&driver.target)?;
        let ctx = self.build_context(source, driver);

        let mut result = Map::new();
        for (field, spec) in &driver.mappings {
            result.insert(field.clone(), self.map_at(spec, &ctx, driver, 0));
        }

        if let Some(condition) = driver
            .filters
            .skip_flow_if
            .iter()
            .find(|c| self.evaluator.evaluate_compiled(c, &ctx))
        {
            debug!(driver = %driver.name, condition = %condition, "flow skipped");
            return Ok(None);
        }

        if !driver.filters.steps.is_empty() {
            if let Some(Value::Array(steps)) = result.get_mut("steps") {
                steps.retain(|step| {
                    let step_ctx = ctx.with("item", step.clone());
                    driver
                        .filters
                        .steps
                        .iter()
                        .all(|c| self.evaluator.evaluate_compiled(c, &step_ctx))
                });
            }
        }

        builder(Value::Object(result)).map(Some)
    }

    /// Transform straight into [`FormFlowInstructions`]
    pub fn transform_instructions(
        &self,
        source: &Value,
        driver: &DriverConfig,
    ) -> Result<Option<FormFlowInstructions>> {
        match self.transform(source, driver)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Resolve one mapping against a context
    pub fn map_field(&self, spec: &MappingSpec, ctx: &Context, driver: &DriverConfig) -> Value {
        self.map_at(spec, ctx, driver, 0)
    }

    fn map_at(&self, spec: &MappingSpec, ctx: &Context, driver: &DriverConfig, depth: usize) -> Value {
        if depth > self.max_depth {
            warn!(driver = %driver.name, depth, "mapping nested too deeply, using null");
            return Value::Null;
        }

        match spec {
            MappingSpec::Literal(value) => value.clone(),
            MappingSpec::Template(template) | MappingSpec::TemplateObject(template) => {
                Value::String(self.renderer.render(template, ctx))
            }
            MappingSpec::Transform(transform) => self.apply_transform(transform, ctx, driver, depth),
            MappingSpec::Conditional {
                when,
                then,
                otherwise,
            } => {
                let branch = if self.evaluator.evaluate_compiled(when, ctx) {
                    then.as_deref().ok_or(Value::Bool(true))
                } else {
                    otherwise.as_deref().ok_or(Value::Null)
                };
                match branch {
                    Ok(spec) => self.map_at(spec, ctx, driver, depth + 1),
                    Err(default) => default,
                }
            }
            MappingSpec::From { from, when } => {
                if let Some(when) = when {
                    if !self.evaluator.evaluate_compiled(when, ctx) {
                        return Value::Null;
                    }
                }
                match from {
                    FromSource::Spec(spec) => self.map_at(spec, ctx, driver, depth + 1),
                    FromSource::Template(template) => Value::String(self.renderer.render(template, ctx)),
                    FromSource::Path(path) => ctx.lookup(path).unwrap_or(Value::Null),
                    FromSource::Literal(value) => value.clone(),
                }
            }
            MappingSpec::Nested(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, spec)| (key.clone(), self.map_at(spec, ctx, driver, depth + 1)))
                    .collect(),
            ),
            MappingSpec::Sequence(items) => Value::Array(
                items
                    .iter()
                    .map(|spec| self.map_at(spec, ctx, driver, depth + 1))
                    .collect(),
            ),
        }
    }

    fn apply_transform(
        &self,
        transform: &TransformSpec,
        ctx: &Context,
        driver: &DriverConfig,
        depth: usize,
    ) -> Value {
        let data = ctx
            .get("source")
            .and_then(|source| data_get(source, &transform.source))
            .unwrap_or(Value::Null);
        if data.is_null() {
            return Value::Null;
        }

        match transform.kind {
            TransformKind::ArrayMap => {
                let items = into_items(data);
                let Some(handler) = &transform.handler else {
                    return Value::Array(items);
                };
                let priorities = driver
                    .constants
                    .get("priorities")
                    .cloned()
                    .unwrap_or_else(|| Value::Array(Vec::new()));
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| {
                            let item_ctx = ctx.with("item", item).with("priorities", priorities.clone());
                            self.map_at(handler, &item_ctx, driver, depth + 1)
                        })
                        .collect(),
                )
            }
            TransformKind::Filter => {
                let items = into_items(data);
                let Some(condition) = &transform.condition else {
                    return Value::Array(items);
                };
                Value::Array(
                    items
                        .into_iter()
                        .filter(|item| {
                            self.evaluator
                                .evaluate_compiled(condition, &ctx.with("item", item.clone()))
                        })
                        .collect(),
                )
            }
            TransformKind::First => match data {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
                Value::Object(map) => map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
                other => other,
            },
            TransformKind::Count => match &data {
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
                _ => Value::from(0),
            },
            TransformKind::Join => match &data {
                Value::Array(items) => {
                    let separator = transform.separator.as_deref().unwrap_or(", ");
                    let parts: Vec<String> = items.iter().map(to_display).collect();
                    Value::String(parts.join(separator))
                }
                other => Value::String(to_display(other)),
            },
        }
    }
}

/// Elements of an array, or values of an object; anything else has none
fn into_items(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverConfig;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn driver(value: Value) -> DriverConfig {
        DriverConfig::from_value(value, "test").unwrap()
    }

    fn engine() -> MappingEngine {
        let mut engine = MappingEngine::new();
        engine.targets_mut().register_passthrough("Tgt");
        engine
    }

    fn header() -> Value {
        json!({"name": "test", "version": "1.0", "source": "Src", "target": "Tgt"})
    }

    #[test]
    fn test_template_mapping() {
        let d = driver(json!({"driver": header(), "mappings": {"foo": "{{ source.bar }}"}}));
        let out = engine().transform(&json!({"bar": "baz"}), &d).unwrap();
        assert_eq!(out, Some(json!({"foo": "baz"})));
    }

    #[test]
    fn test_literals_and_nested() {
        let d = driver(json!({
            "driver": header(),
            "mappings": {
                "count": 3,
                "none": null,
                "meta": {"code": "{{ source.code }}", "fixed": true},
                "list": ["a", "{{ source.code }}"]
            }
        }));
        let out = engine().transform(&json!({"code": "X1"}), &d).unwrap().unwrap();
        assert_eq!(
            out,
            json!({"count": 3, "none": null, "meta": {"code": "X1", "fixed": true}, "list": ["a", "X1"]})
        );
    }

    #[test]
    fn test_array_map_with_priorities() {
        let d = driver(json!({
            "driver": header(),
            "constants": {"priorities": {"kyc": 1, "selfie": 2}},
            "mappings": {
                "steps": {
                    "source": "fields",
                    "transform": "array_map",
                    "handler": {"handler": "{{ item }}", "rank": "{{ priorities.kyc }}"}
                }
            }
        }));
        let out = engine().transform(&json!({"fields": ["kyc", "selfie"]}), &d).unwrap().unwrap();
        assert_eq!(
            out["steps"],
            json!([{"handler": "kyc", "rank": "1"}, {"handler": "selfie", "rank": "1"}])
        );
    }

    #[test]
    fn test_filter_first_count_join() {
        let d = driver(json!({
            "driver": header(),
            "mappings": {
                "kept": {"source": "tags", "transform": "filter", "condition": "item != 'b'"},
                "first": {"source": "tags", "transform": "first"},
                "count": {"source": "tags", "transform": "count"},
                "joined": {"source": "tags", "transform": "join", "separator": "|"},
                "default_join": {"source": "tags", "transform": "join"},
                "missing": {"source": "nope", "transform": "count"}
            }
        }));
        let out = engine().transform(&json!({"tags": ["a", "b", "c"]}), &d).unwrap().unwrap();
        assert_eq!(out["kept"], json!(["a", "c"]));
        assert_eq!(out["first"], json!("a"));
        assert_eq!(out["count"], json!(3));
        assert_eq!(out["joined"], json!("a|b|c"));
        assert_eq!(out["default_join"], json!("a, b, c"));
        assert_eq!(out["missing"], Value::Null);
    }

    #[test]
    fn test_conditional_defaults() {
        let d = driver(json!({
            "driver": header(),
            "mappings": {
                "big": {"when": "source.amount > 100"},
                "small": {"when": "source.amount < 100"},
                "label": {"when": "source.amount > 100", "then": "large", "else": "small"}
            }
        }));
        let out = engine().transform(&json!({"amount": 150}), &d).unwrap().unwrap();
        assert_eq!(out, json!({"big": true, "small": null, "label": "large"}));
    }

    #[test]
    fn test_from_mapping() {
        let d = driver(json!({
            "driver": header(),
            "mappings": {
                "owner": {"from": "source.owner"},
                "guarded": {"from": "source.owner.name", "when": "source.show == true"},
                "literal": {"from": "plain"}
            }
        }));
        let out = engine()
            .transform(&json!({"owner": {"name": "Ana"}, "show": false}), &d)
            .unwrap()
            .unwrap();
        assert_eq!(out["owner"], json!({"name": "Ana"}));
        assert_eq!(out["guarded"], Value::Null);
        assert_eq!(out["literal"], json!("plain"));
    }

    #[test]
    fn test_skip_flow_if_returns_none() {
        let d = driver(json!({
            "driver": header(),
            "mappings": {"foo": "bar"},
            "filters": {"skip_flow_if": ["source.redeemed == true"]}
        }));
        assert_eq!(engine().transform(&json!({"redeemed": true}), &d).unwrap(), None);
        assert!(engine().transform(&json!({"redeemed": false}), &d).unwrap().is_some());
    }

    #[test]
    fn test_step_filters_are_conjunctive() {
        let d = driver(json!({
            "driver": header(),
            "mappings": {"steps": [
                {"handler": "form", "required": true},
                {"handler": "kyc", "required": false},
                {"handler": "selfie", "required": true}
            ]},
            "filters": {"steps": ["item.required == true", "item.handler != 'selfie'"]}
        }));
        let out = engine().transform(&json!({}), &d).unwrap().unwrap();
        assert_eq!(out["steps"], json!([{"handler": "form", "required": true}]));
    }

    #[test]
    fn test_unknown_target_fails() {
        let mut header = header();
        header["target"] = json!("Missing");
        let d = driver(json!({"driver": header, "mappings": {}}));
        assert!(matches!(
            engine().transform(&json!({}), &d),
            Err(Error::TargetResolution(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_depth_limit_yields_null() {
        let d = driver(json!({
            "driver": header(),
            "mappings": {"a": {"b": {"c": "deep"}}}
        }));
        let out = engine().with_max_depth(1).transform(&json!({}), &d).unwrap().unwrap();
        assert_eq!(out, json!({"a": {"b": {"c": null}}}));
    }

    #[test]
    fn test_host_helpers_available() {
        let host = Host::new("https://app.test").with_route("redeem", "/redeem/{code}");
        let mut engine = MappingEngine::with_host(&host);
        engine.targets_mut().register_passthrough("Tgt");
        let d = driver(json!({
            "driver": header(),
            "mappings": {"url": "{{ route('redeem', {code: source.code}) }}"}
        }));
        let out = engine.transform(&json!({"code": "ABC"}), &d).unwrap().unwrap();
        assert_eq!(out["url"], json!("https://app.test/redeem/ABC"));
    }

    #[test]
    fn test_transform_instructions() {
        let mut h = header();
        h["target"] = json!("FormFlowInstructions");
        let d = driver(json!({
            "driver": h,
            "mappings": {
                "reference_id": "ref-{{ source.code }}",
                "steps": {"source": "fields", "transform": "array_map", "handler": {"handler": "{{ item }}"}},
                "callbacks": {"on_complete": "/done"}
            }
        }));
        let instructions = engine()
            .transform_instructions(&json!({"code": "Z", "fields": ["kyc"]}), &d)
            .unwrap()
            .unwrap();
        assert_eq!(instructions.reference_id, "ref-Z");
        assert_eq!(instructions.steps[0].handler, "kyc");
        assert_eq!(instructions.callbacks.on_complete.as_deref(), Some("/done"));
    }
}
