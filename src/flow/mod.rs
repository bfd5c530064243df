//! Flow instructions and flow state
//!
//! [`FormFlowInstructions`] is the JSON surface a frontend renders: a
//! reference id, ordered steps (`{handler, config}`) and callbacks.
//! [`FlowState`] tracks one user's progress through those steps and is
//! persisted through a [`SessionStore`] by [`FormFlowService`].
//!
//! ```text
//! active ──complete──▶ completed
//!    │
//!    └────cancel────▶ cancelled
//! ```
//!
//! Terminal states have no outgoing transitions.

pub mod service;
pub mod session;

pub use service::FormFlowService;
pub use session::{InMemorySessionStore, SessionStore};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved key holding a step's name inside collected data
pub const STEP_NAME_KEY: &str = "_step_name";

/// Instructions for one multi-step flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormFlowInstructions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(default)]
    pub reference_id: String,
    #[serde(default)]
    pub steps: Vec<FormFlowStep>,
    #[serde(default)]
    pub callbacks: Callbacks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl FormFlowInstructions {
    pub fn new(reference_id: impl Into<String>) -> Self {
        Self {
            flow_id: None,
            reference_id: reference_id.into(),
            steps: Vec::new(),
            callbacks: Callbacks::default(),
            title: None,
            description: None,
            metadata: Map::new(),
        }
    }

    pub fn with_step(mut self, step: FormFlowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_callbacks(mut self, on_complete: impl Into<String>, on_cancel: Option<String>) -> Self {
        self.callbacks = Callbacks {
            on_complete: Some(on_complete.into()),
            on_cancel,
        };
        self
    }

    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    /// Structural checks before a flow is started
    pub fn validate(&self) -> Result<()> {
        if self.reference_id.trim().is_empty() {
            return Err(Error::InvalidInstructions("reference_id is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(Error::InvalidInstructions(format!(
                "flow '{}' has no steps",
                self.reference_id
            )));
        }
        if let Some(index) = self.steps.iter().position(|s| s.handler.trim().is_empty()) {
            return Err(Error::InvalidInstructions(format!("step {} has no handler", index)));
        }
        if self
            .callbacks
            .on_complete
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
        {
            return Err(Error::InvalidInstructions("callbacks.on_complete is missing".into()));
        }
        Ok(())
    }

    /// Index of the first step whose config carries `step_name`
    pub fn step_index(&self, step_name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_name() == Some(step_name))
    }
}

/// One step, rendered by the named handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormFlowStep {
    pub handler: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl FormFlowStep {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn step_name(&self) -> Option<&str> {
        self.config.get("step_name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Callbacks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_cancel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Active,
    Completed,
    Cancelled,
}

impl FlowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, FlowStatus::Active)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStatus::Active => write!(f, "active"),
            FlowStatus::Completed => write!(f, "completed"),
            FlowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Persisted progress of one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub flow_id: String,
    pub reference_id: String,
    pub instructions: FormFlowInstructions,
    pub current_step: usize,
    /// Step indexes in the order they were first completed
    pub completed_steps: Vec<usize>,
    pub collected_data: BTreeMap<usize, Map<String, Value>>,
    pub status: FlowStatus,
    /// Incremented on every write
    #[serde(default)]
    pub revision: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl FlowState {
    pub fn is_complete(&self) -> bool {
        self.status == FlowStatus::Completed
    }

    pub fn total_steps(&self) -> usize {
        self.instructions.steps.len()
    }

    /// Data collected for one step
    pub fn step_data(&self, index: usize) -> Option<&Map<String, Value>> {
        self.collected_data.get(&index)
    }

    /// Collected data tagged with `_step_name == name`
    pub fn find_step_by_name(&self, name: &str) -> Option<(usize, &Map<String, Value>)> {
        self.collected_data
            .iter()
            .find(|(_, data)| data.get(STEP_NAME_KEY).and_then(Value::as_str) == Some(name))
            .map(|(index, data)| (*index, data))
    }
}
