//! Shared request state threaded through a workflow run.
//!
//! One `SupportState` value lives for exactly one run: built from caller
//! input, mutated by stage updates, returned at the end. All derived-field
//! writes go through [`SupportState::apply`], which enforces the fixed key
//! set and the expected JSON shape per field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutable record shared by every stage of a run.
///
/// Input fields are supplied by the caller and never written by the engine
/// itself. Derived fields start unset and become set when a stage commits an
/// update carrying them; once set they are only ever overwritten by a later
/// update, never cleared. `logs` is append-only for the life of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupportState {
    // Caller-supplied input fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_answer: Option<String>,

    // Derived fields, in pipeline order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_history: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kb_results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_updates: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_actions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<Vec<String>>,

    /// Caller-facing output object written by the terminal stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Run log: ordered, append-only, visible to every stage and provider.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl SupportState {
    /// Append a line to the run log. Updates cannot touch the log, so this
    /// is the only way it grows.
    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Solution score with the router's default for an unscored run.
    pub fn solution_score_or_default(&self) -> i64 {
        self.solution_score.unwrap_or(0)
    }

    /// Merge a partial update into the state.
    ///
    /// This is the single write boundary for derived fields: a known key with
    /// the expected JSON shape is assigned; anything else (unknown key, wrong
    /// shape, attempt to write `logs`) is dropped and reported on the
    /// diagnostic channel. A drop never fails the run.
    pub fn apply(&mut self, update: StateUpdate) {
        for (key, value) in update {
            self.apply_field(&key, value);
        }
    }

    fn apply_field(&mut self, key: &str, value: Value) {
        match key {
            "customer_name" => assign_string(&mut self.customer_name, key, value),
            "email" => assign_string(&mut self.email, key, value),
            "query" => assign_string(&mut self.query, key, value),
            "priority" => assign_string(&mut self.priority, key, value),
            "ticket_id" => assign_string(&mut self.ticket_id, key, value),
            "clarification_answer" => assign_string(&mut self.clarification_answer, key, value),
            "parsed" => assign_object(&mut self.parsed, key, value),
            "entities" => assign_object(&mut self.entities, key, value),
            "intent" => assign_string(&mut self.intent, key, value),
            "sentiment" => assign_string(&mut self.sentiment, key, value),
            "normalized" => assign_object(&mut self.normalized, key, value),
            "enriched" => assign_object(&mut self.enriched, key, value),
            "flags" => assign_object(&mut self.flags, key, value),
            "customer_history" => assign_array(&mut self.customer_history, key, value),
            "clarification_question" => assign_string(&mut self.clarification_question, key, value),
            "extracted_info" => assign_string(&mut self.extracted_info, key, value),
            "kb_results" => assign_array(&mut self.kb_results, key, value),
            "solution_score" => assign_integer(&mut self.solution_score, key, value),
            "escalated" => assign_bool(&mut self.escalated, key, value),
            "decision_notes" => assign_string(&mut self.decision_notes, key, value),
            "ticket_updates" => assign_object(&mut self.ticket_updates, key, value),
            "closed" => assign_bool(&mut self.closed, key, value),
            "draft_response" => assign_string(&mut self.draft_response, key, value),
            "ai_response" => assign_string(&mut self.ai_response, key, value),
            "api_actions" => assign_string_list(&mut self.api_actions, key, value),
            "notifications" => assign_string_list(&mut self.notifications, key, value),
            "output" => assign_object(&mut self.output, key, value),
            "logs" => drop_field(key, "the run log is append-only"),
            _ => drop_field(key, "unknown field"),
        }
    }
}

/// Partial update produced by an ability call or batched by a stage.
///
/// Merging is key union with the newer value winning. Building one from a
/// non-object JSON value yields an empty update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateUpdate(Map<String, Value>);

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Key union; values from `newer` win.
    pub fn merge(&mut self, newer: StateUpdate) {
        for (key, value) in newer.0 {
            self.0.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for StateUpdate {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl IntoIterator for StateUpdate {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn assign_string(slot: &mut Option<String>, key: &str, value: Value) {
    match value {
        Value::String(text) => *slot = Some(text),
        other => drop_mistyped(key, "string", &other),
    }
}

fn assign_integer(slot: &mut Option<i64>, key: &str, value: Value) {
    match value.as_i64() {
        Some(number) => *slot = Some(number),
        None => drop_mistyped(key, "integer", &value),
    }
}

fn assign_bool(slot: &mut Option<bool>, key: &str, value: Value) {
    match value {
        Value::Bool(flag) => *slot = Some(flag),
        other => drop_mistyped(key, "boolean", &other),
    }
}

fn assign_object(slot: &mut Option<Value>, key: &str, value: Value) {
    if value.is_object() {
        *slot = Some(value);
    } else {
        drop_mistyped(key, "object", &value);
    }
}

fn assign_array(slot: &mut Option<Value>, key: &str, value: Value) {
    if value.is_array() {
        *slot = Some(value);
    } else {
        drop_mistyped(key, "array", &value);
    }
}

fn assign_string_list(slot: &mut Option<Vec<String>>, key: &str, value: Value) {
    match serde_json::from_value::<Vec<String>>(value) {
        Ok(items) => *slot = Some(items),
        Err(_) => drop_field(key, "expected an array of strings"),
    }
}

fn drop_mistyped(key: &str, expected: &str, got: &Value) {
    drop_field(key, &format!("expected {expected}, got {}", json_type(got)));
}

fn drop_field(key: &str, reason: &str) {
    tracing::debug!(field = key, reason, "dropped state update field");
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
