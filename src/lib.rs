// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # formflow
//!
//! Declarative mapping, template expressions and multi-step form flows.
//!
//! ## Core Concept
//!
//! A **driver** file describes how one domain object becomes a generic set
//! of flow instructions. From a driver and a source object, formflow can:
//!
//! - **Render** `{{ }}` templates with paths, helper calls, `??` and `~`
//! - **Evaluate** boolean conditions (`&&`, `||`, `!`, `in`, comparisons, `empty()`)
//! - **Transform** the source into a target record (`array_map`, `filter`, `first`, `count`, `join`)
//! - **Build steps** from flow templates, degrading gracefully when a handler is missing
//! - **Track** a user's progress through the steps in a session-backed state machine
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use formflow::{DriverConfig, DriverFormat, FormFlowService, InMemorySessionStore, MappingEngine};
//! use serde_json::json;
//!
//! let driver = DriverConfig::parse(r#"
//! driver:
//!   name: voucher-redemption
//!   version: "1.0"
//!   source: Voucher
//!   target: FormFlowInstructions
//! mappings:
//!   reference_id: "disburse-{{ source.code }}"
//!   steps:
//!     source: source.inputs
//!     transform: array_map
//!     handler:
//!       handler: "{{ item.handler }}"
//!       config: { title: "{{ item.title }}" }
//!   callbacks:
//!     on_complete: "https://pay.test/disburse/{{ source.code }}/complete"
//! filters:
//!   skip_flow_if: ["source.redeemed == true"]
//! "#, DriverFormat::Yaml, "inline")?;
//!
//! let engine = MappingEngine::new();
//! let Some(instructions) = engine.transform_instructions(&voucher, &driver)? else {
//!     return Ok(()); // flow suppressed
//! };
//!
//! let flows = FormFlowService::new(InMemorySessionStore::new());
//! let state = flows.start_flow(instructions)?;
//! flows.update_step_data(&state.flow_id, 0, data, Some("wallet"))?;
//! flows.complete_flow(&state.flow_id)?;
//! ```
//!
//! ## Two Template Grammars
//!
//! | Interpreter | Used by | Features |
//! |-------------|---------|----------|
//! | [`TemplateRenderer`] | driver mappings | paths, helper calls, `??`, `~` |
//! | [`TemplateProcessor`] | flow templates | ternaries, filter pipelines, `or`/`and` |
//!
//! Driver files only ever see the first grammar, flow templates only the
//! second.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                                                              │
//! │  DRIVER (YAML/JSON) ──► DriverRegistry ──► DriverConfig      │
//! │                                                │             │
//! │  source ──► MappingEngine.transform ◄──────────┘             │
//! │                 │   (TemplateRenderer, ExpressionEvaluator)  │
//! │                 ▼                                            │
//! │  FLOW TEMPLATE ──► DriverService ──► FormFlowInstructions    │
//! │                    (TemplateProcessor)          │            │
//! │                                                 ▼            │
//! │                         FormFlowService (SessionStore)       │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

// Values and contexts
pub mod context;
pub mod error;
pub mod value;

// Interpreters
pub mod expr;
pub mod render;
pub mod templates;

// Transformation and flows
pub mod driver;
pub mod flow;
pub mod mapping;

// Configuration
pub mod config;
pub mod config_validate;

// Re-exports
pub use config::EngineConfig;
pub use context::{Context, FunctionTable, Host};
pub use driver::{
    DriverConfig, DriverFormat, DriverRegistry, DriverService, HandlerRegistry, RegistryStats,
    StaticHandlerRegistry,
};
pub use error::{Error, Result};
pub use expr::{Condition, ExpressionEvaluator};
pub use flow::{
    Callbacks, FlowState, FlowStatus, FormFlowInstructions, FormFlowService, FormFlowStep,
    InMemorySessionStore, SessionStore,
};
pub use mapping::{MappingEngine, MappingSpec, TargetRegistry};
pub use render::TemplateRenderer;
pub use templates::TemplateProcessor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
