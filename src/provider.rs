//! Provider clients: one synchronous HTTP endpoint per capability provider.
//!
//! # Wire contract
//!
//! An ability call is `POST <base>/abilities/<ability>` with the JSON body
//! `{"payload": <object>, "state": <object>}`. The response object's keys are
//! the partial update. An `Authorization: Bearer <key>` header is attached
//! when the provider is configured with a credential.
//!
//! # Failure handling
//!
//! A client never fails a run. Transport errors, timeouts, non-success
//! statuses, and unreadable bodies all degrade to an empty update plus a run
//! log line naming the provider, the ability, and the reason. Callers treat
//! "no update" as a normal outcome.

use crate::config::AgentConfig;
use crate::state::{StateUpdate, SupportState};
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use ureq::Agent;

/// Invocation seam between the dispatcher and a provider transport. The
/// HTTP client below is the production implementation; tests script their
/// own.
pub trait AbilityClient {
    fn provider_id(&self) -> &str;

    /// Perform one ability call. Appends the success or failure line to the
    /// run log and returns the provider's partial update, empty on failure.
    fn invoke(&self, ability: &str, payload: &Value, state: &mut SupportState) -> StateUpdate;
}

/// HTTP client for a single provider.
pub struct HttpProviderClient {
    id: String,
    base_url: String,
    api_key: Option<String>,
    agent: Agent,
}

impl HttpProviderClient {
    pub fn new(
        id: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            id: id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            agent: Agent::new_with_config(config),
        }
    }

    fn ability_url(&self, ability: &str) -> String {
        format!("{}/abilities/{ability}", self.base_url)
    }

    fn post_ability(
        &self,
        ability: &str,
        payload: &Value,
        snapshot: &Value,
    ) -> Result<Map<String, Value>> {
        let url = self.ability_url(ability);
        let body = json!({"payload": payload, "state": snapshot});
        let mut request = self.agent.post(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", &format!("Bearer {key}"));
        }
        let mut response = request
            .send_json(&body)
            .with_context(|| format!("POST {url}"))?;
        let update: Map<String, Value> = response
            .body_mut()
            .read_json()
            .context("read update JSON")?;
        Ok(update)
    }
}

impl AbilityClient for HttpProviderClient {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn invoke(&self, ability: &str, payload: &Value, state: &mut SupportState) -> StateUpdate {
        // Snapshot before appending any log line for this call, so the wire
        // state matches what the stage saw.
        let snapshot = match serde_json::to_value(&*state) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                state.log(format!("[{}] {ability} failed: {err}", self.id));
                return StateUpdate::new();
            }
        };
        let start = Instant::now();
        match self.post_ability(ability, payload, &snapshot) {
            Ok(update) => {
                tracing::info!(
                    provider = %self.id,
                    ability,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    update_keys = update.len(),
                    "ability call complete"
                );
                let rendered = serde_json::to_string(&update)
                    .unwrap_or_else(|_| "<unrenderable>".to_string());
                state.log(format!("[{}] {ability} -> {rendered}", self.id));
                StateUpdate::from(update)
            }
            Err(err) => {
                tracing::debug!(
                    provider = %self.id,
                    ability,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "ability call failed"
                );
                state.log(format!("[{}] {ability} failed: {err:#}", self.id));
                StateUpdate::new()
            }
        }
    }
}

/// Build one HTTP client per configured provider, all sharing the resolved
/// call timeout.
pub fn build_http_clients(config: &AgentConfig, timeout: Duration) -> Vec<Box<dyn AbilityClient>> {
    config
        .providers
        .iter()
        .map(|(id, provider)| {
            Box::new(HttpProviderClient::new(
                id.clone(),
                &provider.base_url,
                provider.api_key.clone(),
                timeout,
            )) as Box<dyn AbilityClient>
        })
        .collect()
}
