//! Stage implementations for the support workflow.
//!
//! Every stage batches the partial updates of its ability calls locally and
//! returns the net update for the engine to commit, so state snapshots sent
//! with later calls in the same stage do not include earlier calls' results.
//! The router is the one exception: its calls apply to the state
//! immediately, before the branch is taken.

use crate::dispatch::Dispatcher;
use crate::engine::StageId;
use crate::state::{StateUpdate, SupportState};
use serde_json::{json, Value};

/// Instruction sent with the richer response-generation call.
pub const RESPONSE_SYSTEM_MESSAGE: &str =
    "You are a professional customer support agent. Generate a helpful, empathetic response.";

/// Scores below this take the Update branch; at or above it, Create.
pub const SOLUTION_SCORE_THRESHOLD: i64 = 90;

/// Branch selected by the router after the Decide stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Update,
    Create,
}

/// Run one stage and return its batched update for the engine to commit.
pub fn run_stage(
    stage: StageId,
    dispatcher: &Dispatcher,
    state: &mut SupportState,
) -> StateUpdate {
    match stage {
        StageId::Intake => stage_intake(dispatcher, state),
        StageId::Understand => stage_understand(dispatcher, state),
        StageId::Prepare => stage_prepare(dispatcher, state),
        StageId::Ask => stage_ask(dispatcher, state),
        StageId::Wait => stage_wait(dispatcher, state),
        StageId::Retrieve => stage_retrieve(dispatcher, state),
        StageId::Decide => stage_decide(dispatcher, state),
        StageId::Update => stage_update(dispatcher, state),
        StageId::Create => stage_create(dispatcher, state),
        StageId::Do => stage_do(dispatcher, state),
        StageId::Complete => stage_complete(dispatcher, state),
    }
}

fn stage_intake(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    // The acknowledgement result is not state.
    dispatcher.call_empty("accept_payload", state);
    state.log("INTAKE complete.");
    StateUpdate::new()
}

fn stage_understand(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.merge(dispatcher.call_empty("parse_request_text", state));
    update.merge(dispatcher.call_empty("extract_entities", state));
    update.merge(dispatcher.call_empty("extract_intent", state));
    update.merge(dispatcher.call_empty("sentiment_analysis", state));
    state.log("UNDERSTAND complete.");
    update
}

fn stage_prepare(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.merge(dispatcher.call_empty("normalize_fields", state));
    update.merge(dispatcher.call_empty("enrich_records", state));
    update.merge(dispatcher.call_empty("add_flags_calculations", state));
    let history = dispatcher.call_empty("get_customer_history", state);
    if !history.is_empty() {
        update.merge(history);
    }
    state.log("PREPARE complete.");
    update
}

fn stage_ask(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let update = dispatcher.call_empty("clarify_question", state);
    state.log("ASK complete.");
    update
}

fn stage_wait(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.merge(dispatcher.call_empty("extract_answer", state));
    update.merge(dispatcher.call_empty("store_answer", state));
    state.log("WAIT complete.");
    update
}

fn stage_retrieve(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let mut update = StateUpdate::new();
    // Both searches write kb_results; the later call wins the key.
    update.merge(dispatcher.call_empty("knowledge_base_search", state));
    update.merge(dispatcher.call_empty("search_knowledge_base", state));
    update.merge(dispatcher.call_empty("store_data", state));
    state.log("RETRIEVE complete.");
    update
}

fn stage_decide(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let update = dispatcher.call_empty("solution_evaluation", state);
    state.log("DECIDE scored solution.");
    update
}

/// Select the branch after Decide.
///
/// Unlike stages, the decision calls apply to the state immediately, so the
/// chosen branch runs with the escalation fields already in place. A missing
/// score counts as 0 and takes the Update branch.
pub fn decide_route(dispatcher: &Dispatcher, state: &mut SupportState) -> Route {
    let score = state.solution_score_or_default();
    if score < SOLUTION_SCORE_THRESHOLD {
        let escalation = dispatcher.call_empty("escalation_decision", state);
        state.apply(escalation);
        let notes = dispatcher.call_empty("update_payload", state);
        state.apply(notes);
        state.log(format!(
            "Router: score {score} < {SOLUTION_SCORE_THRESHOLD} -> UPDATE."
        ));
        Route::Update
    } else {
        // A high score never escalates, whatever earlier stages suggested.
        state.escalated = Some(false);
        let notes = dispatcher.call_empty("update_payload", state);
        state.apply(notes);
        state.log(format!(
            "Router: score {score} >= {SOLUTION_SCORE_THRESHOLD} -> CREATE."
        ));
        Route::Create
    }
}

fn stage_update(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.merge(dispatcher.call_empty("update_ticket", state));
    update.merge(dispatcher.call_empty("close_ticket", state));
    update.merge(dispatcher.call_empty("update_ticket_status", state));
    // Fire and forget; the store acknowledgement is not state.
    dispatcher.call_empty("store_ticket", state);
    state.log("UPDATE complete.");
    update
}

fn stage_create(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.merge(dispatcher.call_empty("response_generation", state));
    let richer = dispatcher.call(
        "generate_response",
        &json!({ "system_message": RESPONSE_SYSTEM_MESSAGE }),
        state,
    );
    // Only the richer call's draft is taken, and only when it said something.
    if let Some(draft) = richer
        .get("draft_response")
        .and_then(Value::as_str)
        .filter(|draft| !draft.is_empty())
    {
        update.insert("draft_response", Value::String(draft.to_string()));
    }
    state.log("CREATE complete.");
    update
}

fn stage_do(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.merge(dispatcher.call_empty("execute_api_calls", state));
    update.merge(dispatcher.call_empty("trigger_notifications", state));
    // Fire and forget, as with store_ticket.
    dispatcher.call_empty("store_conversation_log", state);
    state.log("DO complete.");
    update
}

fn stage_complete(dispatcher: &Dispatcher, state: &mut SupportState) -> StateUpdate {
    let update = dispatcher.call_empty("output_payload", state);
    state.log("COMPLETE done.");
    update
}

#[cfg(test)]
#[path = "stages_tests.rs"]
mod tests;
