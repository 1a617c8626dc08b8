//! Staged workflow orchestrator for customer support requests.
//!
//! A request moves through a fixed chain of stages with one routed fork:
//! intake, understanding, preparation, clarification, retrieval, a scored
//! decision, then either a ticket-update path or a response-creation path,
//! reconverging on execution and completion. Stages batch ability results
//! and the engine commits each batch before moving on; provider failures
//! degrade to empty updates so a run always finishes.
//!
//! The crate splits along the seams of that flow:
//!
//! - [`state`]: the typed request state and the update-merge rules
//! - [`config`]: provider addresses and stage/ability bindings
//! - [`registry`]: the ability-to-provider map built once per run
//! - [`provider`]: the HTTP ability client and its failure handling
//! - [`dispatch`]: routing one ability call to its provider client
//! - [`stages`]: the per-stage batching logic and the score router
//! - [`engine`]: the stage graph and the run loop
//! - [`summary`]: caller-facing rendering of a finished run

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod provider;
pub mod registry;
pub mod stages;
pub mod state;
pub mod summary;
