//! Flow templates
//!
//! A flow template lists the steps a source object should walk through:
//!
//! ```yaml
//! reference_id: "disburse-{{ source.code }}-{{ timestamp }}"
//! variables:
//!   amount: "{{ source.cash.amount | format_money }}"
//! steps:
//!   - handler: form
//!     step_name: wallet_info
//!     title: "Wallet Information"
//!     description: "Redeeming {{ source.code }} - {{ amount }}"
//!     config:
//!       fields:
//!         - { name: mobile, type: text }
//!         - { name: email, type: email, condition: "{{ has_email }}" }
//!   - handler: kyc
//!     condition: "{{ source.inputs.kyc }}"
//! callbacks:
//!   on_complete: "{{ base_url }}/disburse/{{ source.code }}/complete"
//! ```
//!
//! Every string goes through [`TemplateProcessor`], not the mapping renderer.

use super::handlers::{HandlerRegistry, StaticHandlerRegistry, MISSING_HANDLER};
use super::DriverFormat;
use crate::context::Host;
use crate::error::{Error, Result};
use crate::flow::{Callbacks, FormFlowInstructions, FormFlowStep};
use crate::templates::TemplateProcessor;
use crate::value::is_truthy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Handler whose steps are dropped when no field survives
pub const FORM_HANDLER: &str = "form";

/// One flow template file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Processed in order; each one sees the ones before it
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    #[serde(default)]
    pub callbacks: Callbacks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepTemplate {
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl FlowTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let format = DriverFormat::from_path(path).ok_or_else(|| {
            Error::config(&origin, "unsupported file format (expected .yaml, .yml or .json)")
        })?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format, &origin)
    }

    pub fn parse(content: &str, format: DriverFormat, origin: &str) -> Result<Self> {
        let template: Self = match format {
            DriverFormat::Yaml => serde_norway::from_str(content)
                .map_err(|e| Error::config(origin, format!("invalid flow template: {}", e)))?,
            DriverFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::config(origin, format!("invalid flow template: {}", e)))?,
        };
        if let Some(index) = template.steps.iter().position(|s| s.handler.trim().is_empty()) {
            return Err(Error::config(origin, format!("step {} has no handler", index)));
        }
        Ok(template)
    }
}

/// Interpret a processed condition: `""`, `"false"` and `"0"` are false
pub fn condition_holds(processed: &Value) -> bool {
    match processed {
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
        }
        other => is_truthy(other),
    }
}

/// Builds [`FormFlowInstructions`] from named flow templates
pub struct DriverService {
    flows_directory: PathBuf,
    processor: TemplateProcessor,
    handlers: Arc<dyn HandlerRegistry>,
    host: Host,
    templates: Mutex<HashMap<String, Arc<FlowTemplate>>>,
}

impl std::fmt::Debug for DriverService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverService")
            .field("flows_directory", &self.flows_directory)
            .field("processor", &self.processor)
            .finish_non_exhaustive()
    }
}

impl DriverService {
    pub fn new(flows_directory: impl Into<PathBuf>) -> Self {
        Self {
            flows_directory: flows_directory.into(),
            processor: TemplateProcessor::new(),
            handlers: Arc::new(StaticHandlerRegistry::default()),
            host: Host::default(),
            templates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_handlers(mut self, handlers: Arc<dyn HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_processor(mut self, processor: TemplateProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Host providing `base_url` and the clock behind `now`/`timestamp`
    pub fn with_host(mut self, host: Host) -> Self {
        self.host = host;
        self
    }

    pub fn flows_directory(&self) -> &Path {
        &self.flows_directory
    }

    pub fn processor(&self) -> &TemplateProcessor {
        &self.processor
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<FlowTemplate>>> {
        self.templates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a template without touching the filesystem
    pub fn register_template(&self, name: impl Into<String>, template: FlowTemplate) {
        self.cache().insert(name.into(), Arc::new(template));
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    /// Template `name`, read from the flows directory on first use
    pub fn load_template(&self, name: &str) -> Result<Arc<FlowTemplate>> {
        if let Some(template) = self.cache().get(name) {
            return Ok(Arc::clone(template));
        }

        let path = ["yaml", "yml", "json"]
            .iter()
            .map(|ext| self.flows_directory.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
            .ok_or_else(|| Error::DriverNotFound(name.to_string()))?;

        let template = Arc::new(FlowTemplate::load(&path)?);
        debug!(flow = %name, path = %path.display(), "flow template loaded");
        self.cache().insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// Context for one template run
    ///
    /// Holds `source`, each top-level key of the source, `base_url`, `now`
    /// (RFC 3339), `timestamp` (seconds) and the processed `variables`.
    pub fn build_context(&self, template: &FlowTemplate, source: &Value) -> Value {
        let now = self.host.now();
        let mut ctx = Map::new();
        if let Value::Object(fields) = source {
            for (key, value) in fields {
                ctx.insert(key.clone(), value.clone());
            }
        }
        ctx.insert("source".into(), source.clone());
        ctx.insert("base_url".into(), Value::String(self.host.base_url.clone()));
        ctx.insert("now".into(), Value::String(now.to_rfc3339()));
        ctx.insert("timestamp".into(), Value::from(now.timestamp()));

        let mut ctx = Value::Object(ctx);
        for (name, raw) in &template.variables {
            let processed = self.processor.process_value(raw, &ctx);
            if let Value::Object(map) = &mut ctx {
                map.insert(name.clone(), processed);
            }
        }
        ctx
    }

    /// Build instructions from the named template
    pub fn transform(&self, name: &str, source: &Value) -> Result<FormFlowInstructions> {
        let template = self.load_template(name)?;
        Ok(self.transform_template(name, &template, source))
    }

    /// Build instructions from an already-loaded template
    pub fn transform_template(
        &self,
        name: &str,
        template: &FlowTemplate,
        source: &Value,
    ) -> FormFlowInstructions {
        let ctx = self.build_context(template, source);

        let reference_id = template
            .reference_id
            .as_deref()
            .map(|t| self.processor.process(t, &ctx))
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("{}-{}", name, uuid::Uuid::new_v4()));

        let mut instructions = FormFlowInstructions::new(reference_id);
        instructions.title = self.process_optional(template.title.as_deref(), &ctx);
        instructions.description = self.process_optional(template.description.as_deref(), &ctx);
        instructions.callbacks = Callbacks {
            on_complete: self.process_optional(template.callbacks.on_complete.as_deref(), &ctx),
            on_cancel: self.process_optional(template.callbacks.on_cancel.as_deref(), &ctx),
        };
        instructions
            .metadata
            .insert("flow_template".into(), Value::String(name.to_string()));

        for (index, step) in template.steps.iter().enumerate() {
            if let Some(step) = self.build_step(index, step, &ctx) {
                instructions.steps.push(step);
            }
        }

        debug!(
            flow = %name,
            reference_id = %instructions.reference_id,
            steps = instructions.steps.len(),
            "flow instructions built"
        );
        instructions
    }

    fn process_optional(&self, text: Option<&str>, ctx: &Value) -> Option<String> {
        text.map(|t| self.processor.process(t, ctx))
            .filter(|t| !t.is_empty())
    }

    fn build_step(&self, index: usize, step: &StepTemplate, ctx: &Value) -> Option<FormFlowStep> {
        if let Some(condition) = &step.condition {
            if !condition_holds(&self.processor.process_value(condition, ctx)) {
                debug!(step = index, handler = %step.handler, "step condition false, skipped");
                return None;
            }
        }

        let mut config = self.processor.process_array(&step.config, ctx);
        if let Some(title) = self.process_optional(step.title.as_deref(), ctx) {
            config.insert("title".into(), Value::String(title));
        }
        if let Some(description) = self.process_optional(step.description.as_deref(), ctx) {
            config.insert("description".into(), Value::String(description));
        }
        if let Some(step_name) = &step.step_name {
            config.insert("step_name".into(), Value::String(step_name.clone()));
        }

        if let Some(Value::Array(fields)) = config.get_mut("fields") {
            fields.retain_mut(|field| match field.as_object_mut() {
                Some(field) => field.shift_remove("condition").is_none_or(|c| condition_holds(&c)),
                None => true,
            });
        }

        if step.handler == FORM_HANDLER
            && config
                .get("fields")
                .and_then(Value::as_array)
                .is_none_or(Vec::is_empty)
        {
            debug!(step = index, "form step has no fields, skipped");
            return None;
        }

        if !self.handlers.is_available(&step.handler) {
            warn!(step = index, handler = %step.handler, "handler not installed, using placeholder step");
            return Some(self.placeholder(&step.handler, config));
        }

        Some(FormFlowStep {
            handler: step.handler.clone(),
            config,
        })
    }

    fn placeholder(&self, handler: &str, config: Map<String, Value>) -> FormFlowStep {
        let title = config
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(handler)
            .to_string();
        let step_name = config
            .get("step_name")
            .and_then(Value::as_str)
            .unwrap_or(handler)
            .to_string();

        FormFlowStep::new(MISSING_HANDLER)
            .with_config("step_name", Value::String(step_name))
            .with_config("title", Value::String(format!("{} (unavailable)", title)))
            .with_config("missing_handler_name", Value::String(handler.to_string()))
            .with_config("missing_handler_title", Value::String(title))
            .with_config(
                "install_hint",
                Value::String(self.handlers.install_hint(handler)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const TEMPLATE: &str = r#"
reference_id: "disburse-{{ source.code }}"
title: "Redeem {{ code }}"
variables:
  amount: "{{ source.amount | format_money }}"
  headline: "{{ code }} - {{ amount }}"
steps:
  - handler: form
    step_name: wallet_info
    title: "Wallet Information"
    description: "{{ headline }}"
    config:
      fields:
        - { name: mobile, type: text }
        - { name: email, type: email, condition: "{{ wants_email }}" }
  - handler: kyc
    condition: "{{ kyc }}"
    title: "Identity Verification"
  - handler: selfie
    step_name: selfie
    title: "Take a Selfie"
callbacks:
  on_complete: "{{ base_url }}/disburse/{{ code }}/complete"
"#;

    fn service(available: &[&str]) -> DriverService {
        let service = DriverService::new("/nonexistent")
            .with_handlers(Arc::new(StaticHandlerRegistry::new(available.iter().copied())))
            .with_host(
                Host::new("https://pay.test")
                    .with_fixed_now(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()),
            );
        let template = FlowTemplate::parse(TEMPLATE, DriverFormat::Yaml, "redeem.yaml").unwrap();
        service.register_template("redeem", template);
        service
    }

    #[test]
    fn test_condition_holds() {
        assert!(!condition_holds(&json!("")));
        assert!(!condition_holds(&json!("false")));
        assert!(!condition_holds(&json!("0")));
        assert!(condition_holds(&json!("1")));
        assert!(condition_holds(&json!("yes")));
        assert!(!condition_holds(&json!(false)));
        assert!(condition_holds(&json!(true)));
    }

    #[test]
    fn test_transform_builds_steps() {
        let service = service(&["form", "kyc", "selfie"]);
        let source = json!({"code": "ABC", "amount": 150, "kyc": true, "wants_email": false});
        let result = service.transform("redeem", &source).unwrap();

        assert_eq!(result.reference_id, "disburse-ABC");
        assert_eq!(result.title.as_deref(), Some("Redeem ABC"));
        assert_eq!(
            result.callbacks.on_complete.as_deref(),
            Some("https://pay.test/disburse/ABC/complete")
        );
        let handlers: Vec<&str> = result.steps.iter().map(|s| s.handler.as_str()).collect();
        assert_eq!(handlers, vec!["form", "kyc", "selfie"]);

        let wallet = &result.steps[0];
        assert_eq!(wallet.config["description"], json!("ABC - ₱150.00"));
        assert_eq!(wallet.config["step_name"], json!("wallet_info"));
        assert_eq!(wallet.config["fields"], json!([{"name": "mobile", "type": "text"}]));
    }

    #[test]
    fn test_false_condition_skips_step() {
        let service = service(&["form", "kyc", "selfie"]);
        let result = service
            .transform("redeem", &json!({"code": "ABC", "amount": 1, "kyc": false}))
            .unwrap();
        assert!(result.steps.iter().all(|s| s.handler != "kyc"));
        assert_eq!(result.steps.len(), 2);
    }

    #[test]
    fn test_missing_handler_placeholder() {
        let service = service(&["form", "kyc"]);
        let result = service
            .transform("redeem", &json!({"code": "ABC", "amount": 1, "kyc": true}))
            .unwrap();
        let last = result.steps.last().unwrap();
        assert_eq!(last.handler, MISSING_HANDLER);
        assert_eq!(last.config["step_name"], json!("selfie"));
        assert_eq!(last.config["missing_handler_name"], json!("selfie"));
        assert_eq!(last.config["missing_handler_title"], json!("Take a Selfie"));
        assert_eq!(last.config["install_hint"], json!("install the 'selfie' form handler"));
        assert_eq!(result.steps.len(), 3);
    }

    #[test]
    fn test_empty_form_step_dropped() {
        let service = DriverService::new("/nonexistent")
            .with_handlers(Arc::new(StaticHandlerRegistry::new(["form"])));
        let template = FlowTemplate::parse(
            r#"
steps:
  - handler: form
    config:
      fields:
        - { name: email, condition: "{{ wants_email }}" }
"#,
            DriverFormat::Yaml,
            "t.yaml",
        )
        .unwrap();
        let result = service.transform_template("t", &template, &json!({"wants_email": false}));
        assert!(result.steps.is_empty());
        assert!(result.reference_id.starts_with("t-"));
    }

    #[test]
    fn test_unknown_template() {
        let service = service(&[]);
        assert!(matches!(
            service.transform("nope", &json!({})),
            Err(Error::DriverNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_step_without_handler_rejected() {
        let err = FlowTemplate::parse("steps:\n  - handler: ''\n", DriverFormat::Yaml, "bad.yaml");
        assert!(matches!(err, Err(Error::Configuration { .. })));
    }
}
