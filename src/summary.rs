//! Caller-facing rendering of a finished run.
//!
//! The payload a caller sees is the Complete stage's output object when the
//! run produced one, otherwise the whole final state.

use crate::state::SupportState;
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};

/// Field order of the text summary. Fields the run never set are skipped,
/// as are empty objects and arrays. The run log gets its own section.
const SUMMARY_FIELDS: [&str; 19] = [
    "customer_name",
    "email",
    "priority",
    "ticket_id",
    "intent",
    "sentiment",
    "entities",
    "normalized",
    "enriched",
    "flags",
    "customer_history",
    "solution_score",
    "escalated",
    "ticket_updates",
    "closed",
    "draft_response",
    "ai_response",
    "api_actions",
    "notifications",
];

/// The object the summary reads from: Complete's output when it is an
/// object, else the serialized final state.
pub fn final_payload(state: &SupportState) -> Result<Map<String, Value>> {
    if let Some(Value::Object(output)) = &state.output {
        return Ok(output.clone());
    }
    let value = serde_json::to_value(state).context("serialize final state")?;
    value
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow!("final state must serialize as a JSON object"))
}

/// Render the human-readable summary: the payload fields in a fixed order,
/// then the execution log as the payload recorded it.
pub fn render_text(state: &SupportState) -> Result<String> {
    let payload = final_payload(state)?;
    let mut out = String::new();
    append_payload_section(&mut out, &payload);
    append_log_section(&mut out, &payload);
    Ok(out)
}

/// Render the full final state as pretty JSON for machine callers.
pub fn render_json(state: &SupportState) -> Result<String> {
    serde_json::to_string_pretty(state).context("serialize final state")
}

fn append_payload_section(out: &mut String, payload: &Map<String, Value>) {
    out.push_str("final payload:\n");
    for field in SUMMARY_FIELDS {
        let Some(value) = payload.get(field) else {
            continue;
        };
        if hidden(value) {
            continue;
        }
        append_field(out, field, value);
    }
}

fn append_log_section(out: &mut String, payload: &Map<String, Value>) {
    out.push_str("execution log:\n");
    let Some(lines) = payload.get("logs").and_then(Value::as_array) else {
        return;
    };
    for line in lines {
        match line {
            Value::String(text) => out.push_str(&format!("  - {text}\n")),
            other => out.push_str(&format!("  - {other}\n")),
        }
    }
}

fn append_field(out: &mut String, field: &str, value: &Value) {
    match value {
        Value::String(text) => out.push_str(&format!("  {field}: {text}\n")),
        Value::Array(_) | Value::Object(_) => {
            let pretty = serde_json::to_string_pretty(value)
                .unwrap_or_else(|_| "<unrenderable>".to_string());
            let mut lines = pretty.lines();
            if let Some(first) = lines.next() {
                out.push_str(&format!("  {field}: {first}\n"));
            }
            for line in lines {
                out.push_str(&format!("    {line}\n"));
            }
        }
        other => out.push_str(&format!("  {field}: {other}\n")),
    }
}

fn hidden(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
