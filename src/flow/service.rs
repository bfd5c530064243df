//! Session-backed flow state machine

use super::{FlowState, FlowStatus, FormFlowInstructions, SessionStore, STEP_NAME_KEY};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Session key holding a flow's state
pub fn flow_key(flow_id: &str) -> String {
    format!("form_flow.{}", flow_id)
}

/// Session key mapping a reference id to its flow id
pub fn reference_key(reference_id: &str) -> String {
    format!("form_flow_ref.{}", reference_id)
}

/// Tracks flows through their steps
///
/// Every mutation is a read-modify-write of one session entry, serialized
/// by a lock held for the whole sequence. Share one service between
/// threads. Use [`FormFlowService::update_step_data_checked`] when
/// concurrent writers (duplicate tab submissions) must not overwrite each
/// other.
#[derive(Debug)]
pub struct FormFlowService<S: SessionStore> {
    store: S,
    fixed_now: Option<DateTime<Utc>>,
    writes: Mutex<()>,
}

impl<S: SessionStore> FormFlowService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            fixed_now: None,
            writes: Mutex::new(()),
        }
    }

    /// Stamp every timestamp with `now` instead of the system clock
    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Start a flow; generates a flow id when the instructions carry none
    pub fn start_flow(&self, instructions: FormFlowInstructions) -> Result<FlowState> {
        instructions.validate()?;
        let _guard = self.write_lock();

        let flow_id = instructions
            .flow_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut snapshot = instructions;
        snapshot.flow_id = Some(flow_id.clone());

        let state = FlowState {
            flow_id: flow_id.clone(),
            reference_id: snapshot.reference_id.clone(),
            instructions: snapshot,
            current_step: 0,
            completed_steps: Vec::new(),
            collected_data: BTreeMap::new(),
            status: FlowStatus::Active,
            revision: 0,
            started_at: self.now(),
            updated_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        self.save(&state)?;
        self.store
            .put(&reference_key(&state.reference_id), Value::String(flow_id.clone()));
        debug!(flow_id = %flow_id, reference_id = %state.reference_id, "flow started");
        Ok(state)
    }

    pub fn get_flow_state(&self, flow_id: &str) -> Option<FlowState> {
        let raw = self.store.get(&flow_key(flow_id))?;
        match serde_json::from_value(raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(flow_id, error = %e, "discarding unreadable flow state");
                None
            }
        }
    }

    pub fn get_flow_state_by_reference(&self, reference_id: &str) -> Option<FlowState> {
        let flow_id = self.store.get(&reference_key(reference_id))?;
        self.get_flow_state(flow_id.as_str()?)
    }

    /// Record data for one step
    ///
    /// The step joins `completed_steps` once. `current_step` moves to
    /// `step_index + 1` only when `step_index` is the current step.
    pub fn update_step_data(
        &self,
        flow_id: &str,
        step_index: usize,
        data: Map<String, Value>,
        step_name: Option<&str>,
    ) -> Result<FlowState> {
        let _guard = self.write_lock();
        let state = self.load_active(flow_id)?;
        self.write_step(state, step_index, data, step_name)
    }

    /// Like [`Self::update_step_data`], but fails with [`Error::StaleWrite`]
    /// unless the stored revision equals `expected_revision`
    pub fn update_step_data_checked(
        &self,
        flow_id: &str,
        step_index: usize,
        data: Map<String, Value>,
        step_name: Option<&str>,
        expected_revision: u64,
    ) -> Result<FlowState> {
        let _guard = self.write_lock();
        let state = self.load_active(flow_id)?;
        if state.revision != expected_revision {
            return Err(Error::StaleWrite {
                flow_id: flow_id.to_string(),
                expected: expected_revision,
                actual: state.revision,
            });
        }
        self.write_step(state, step_index, data, step_name)
    }

    fn write_step(
        &self,
        mut state: FlowState,
        step_index: usize,
        mut data: Map<String, Value>,
        step_name: Option<&str>,
    ) -> Result<FlowState> {
        let step_name = step_name.map(str::to_string).or_else(|| {
            state
                .instructions
                .steps
                .get(step_index)
                .and_then(|s| s.step_name())
                .map(str::to_string)
        });
        if let Some(name) = step_name {
            data.insert(STEP_NAME_KEY.to_string(), Value::String(name));
        }

        state.collected_data.insert(step_index, data);
        if !state.completed_steps.contains(&step_index) {
            state.completed_steps.push(step_index);
        }
        if state.current_step == step_index {
            state.current_step = step_index + 1;
        }
        state.updated_at = Some(self.now());
        state.revision += 1;

        self.save(&state)?;
        Ok(state)
    }

    /// Mark a flow completed; does not check that every step was done
    pub fn complete_flow(&self, flow_id: &str) -> Result<FlowState> {
        self.finish(flow_id, FlowStatus::Completed)
    }

    pub fn cancel_flow(&self, flow_id: &str) -> Result<FlowState> {
        self.finish(flow_id, FlowStatus::Cancelled)
    }

    fn finish(&self, flow_id: &str, status: FlowStatus) -> Result<FlowState> {
        let _guard = self.write_lock();
        let mut state = self.load(flow_id)?;
        if state.status == status {
            return Ok(state);
        }
        if state.status.is_terminal() {
            return Err(Error::FlowClosed {
                flow_id: flow_id.to_string(),
                status: state.status.to_string(),
            });
        }

        let now = self.now();
        state.status = status;
        match status {
            FlowStatus::Completed => state.completed_at = Some(now),
            FlowStatus::Cancelled => state.cancelled_at = Some(now),
            FlowStatus::Active => {}
        }
        state.updated_at = Some(now);
        state.revision += 1;

        self.save(&state)?;
        debug!(flow_id, status = %status, "flow finished");
        Ok(state)
    }

    /// Remove a flow and its reference index entry
    pub fn clear_flow(&self, flow_id: &str) {
        let _guard = self.write_lock();
        if let Some(state) = self.get_flow_state(flow_id) {
            let ref_key = reference_key(&state.reference_id);
            // another flow may have claimed the reference since
            if self.store.get(&ref_key).as_ref().and_then(Value::as_str) == Some(flow_id) {
                self.store.forget(&ref_key);
            }
        }
        self.store.forget(&flow_key(flow_id));
    }

    pub fn flow_exists(&self, flow_id: &str) -> bool {
        self.store.has(&flow_key(flow_id))
    }

    /// Current step index; 0 for an unknown flow
    pub fn get_current_step(&self, flow_id: &str) -> usize {
        self.get_flow_state(flow_id)
            .map(|s| s.current_step)
            .unwrap_or(0)
    }

    pub fn get_collected_data(&self, flow_id: &str) -> BTreeMap<usize, Map<String, Value>> {
        self.get_flow_state(flow_id)
            .map(|s| s.collected_data)
            .unwrap_or_default()
    }

    pub fn is_complete(&self, flow_id: &str) -> bool {
        self.get_flow_state(flow_id)
            .is_some_and(|s| s.is_complete())
    }

    pub fn step_data(&self, flow_id: &str, step_index: usize) -> Option<Map<String, Value>> {
        self.get_flow_state(flow_id)?
            .collected_data
            .remove(&step_index)
    }

    pub fn find_step_by_name(&self, flow_id: &str, name: &str) -> Option<(usize, Map<String, Value>)> {
        let state = self.get_flow_state(flow_id)?;
        state
            .find_step_by_name(name)
            .map(|(index, data)| (index, data.clone()))
    }

    fn load(&self, flow_id: &str) -> Result<FlowState> {
        self.get_flow_state(flow_id)
            .ok_or_else(|| Error::FlowNotFound(flow_id.to_string()))
    }

    fn load_active(&self, flow_id: &str) -> Result<FlowState> {
        let state = self.load(flow_id)?;
        if state.status.is_terminal() {
            return Err(Error::FlowClosed {
                flow_id: flow_id.to_string(),
                status: state.status.to_string(),
            });
        }
        Ok(state)
    }

    fn save(&self, state: &FlowState) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.store.put(&flow_key(&state.flow_id), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FormFlowStep, InMemorySessionStore};
    use serde_json::json;

    fn service() -> FormFlowService<InMemorySessionStore> {
        FormFlowService::new(InMemorySessionStore::new())
    }

    fn instructions() -> FormFlowInstructions {
        FormFlowInstructions::new("disburse-ABC")
            .with_step(FormFlowStep::new("form").with_config("step_name", json!("wallet")))
            .with_step(FormFlowStep::new("kyc"))
            .with_callbacks("https://app.test/done", Some("https://app.test".into()))
    }

    fn data(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_start_flow_initial_state() {
        let svc = service();
        let state = svc.start_flow(instructions()).unwrap();
        assert_eq!(state.current_step, 0);
        assert!(state.completed_steps.is_empty());
        assert!(state.collected_data.is_empty());
        assert_eq!(state.status, FlowStatus::Active);
        assert!(!state.flow_id.is_empty());
        assert!(svc.flow_exists(&state.flow_id));
        assert!(svc.store().has("form_flow_ref.disburse-ABC"));
    }

    #[test]
    fn test_start_flow_keeps_given_id() {
        let svc = service();
        let state = svc.start_flow(instructions().with_flow_id("flow-1")).unwrap();
        assert_eq!(state.flow_id, "flow-1");
        assert_eq!(state.instructions.flow_id.as_deref(), Some("flow-1"));
        assert!(svc.store().has("form_flow.flow-1"));
    }

    #[test]
    fn test_step_name_from_instructions() {
        let svc = service();
        let state = svc.start_flow(instructions()).unwrap();
        let state = svc
            .update_step_data(&state.flow_id, 0, data(json!({"mobile": "0917"})), None)
            .unwrap();
        assert_eq!(state.collected_data[&0][STEP_NAME_KEY], json!("wallet"));

        let (index, found) = svc.find_step_by_name(&state.flow_id, "wallet").unwrap();
        assert_eq!(index, 0);
        assert_eq!(found["mobile"], json!("0917"));
    }

    #[test]
    fn test_out_of_order_write_keeps_pointer() {
        let svc = service();
        let id = svc.start_flow(instructions()).unwrap().flow_id;
        let state = svc.update_step_data(&id, 1, Map::new(), None).unwrap();
        assert_eq!(state.current_step, 0);
        assert_eq!(state.completed_steps, vec![1]);
    }

    #[test]
    fn test_terminal_flow_rejects_writes() {
        let svc = service();
        let id = svc.start_flow(instructions()).unwrap().flow_id;
        svc.cancel_flow(&id).unwrap();
        assert!(matches!(
            svc.update_step_data(&id, 0, Map::new(), None),
            Err(Error::FlowClosed { .. })
        ));
        assert!(matches!(svc.complete_flow(&id), Err(Error::FlowClosed { .. })));
        assert!(svc.cancel_flow(&id).is_ok());
    }

    #[test]
    fn test_complete_is_idempotent() {
        let svc = service();
        let id = svc.start_flow(instructions()).unwrap().flow_id;
        let first = svc.complete_flow(&id).unwrap();
        let second = svc.complete_flow(&id).unwrap();
        assert_eq!(first.completed_at, second.completed_at);
        assert_eq!(first.revision, second.revision);
    }

    #[test]
    fn test_clear_flow_removes_reference() {
        let svc = service();
        let id = svc.start_flow(instructions()).unwrap().flow_id;
        svc.clear_flow(&id);
        assert!(!svc.flow_exists(&id));
        assert!(svc.get_flow_state_by_reference("disburse-ABC").is_none());
        assert!(svc.store().is_empty());
    }

    #[test]
    fn test_unknown_flow() {
        let svc = service();
        assert!(matches!(
            svc.update_step_data("nope", 0, Map::new(), None),
            Err(Error::FlowNotFound(id)) if id == "nope"
        ));
        assert!(matches!(svc.complete_flow("nope"), Err(Error::FlowNotFound(_))));
        assert_eq!(svc.get_current_step("nope"), 0);
        assert!(svc.get_collected_data("nope").is_empty());
        assert!(!svc.is_complete("nope"));
    }

    #[test]
    fn test_invalid_instructions_not_started() {
        let svc = service();
        assert!(matches!(
            svc.start_flow(FormFlowInstructions::new("x")),
            Err(Error::InvalidInstructions(_))
        ));
        assert!(svc.store().is_empty());
    }
}
