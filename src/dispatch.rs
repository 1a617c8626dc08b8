//! One-hop dispatch from ability names to provider clients.

use crate::provider::AbilityClient;
use crate::registry::AbilityRegistry;
use crate::state::{StateUpdate, SupportState};
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Routes each ability call to the client owning its provider.
///
/// Pure delegation: no retries, no caching, no fallback beyond the
/// registry's default provider.
pub struct Dispatcher {
    registry: AbilityRegistry,
    clients: BTreeMap<String, Box<dyn AbilityClient>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    /// Index clients by provider id and require one for every provider the
    /// registry can resolve to, the default included.
    pub fn new(registry: AbilityRegistry, clients: Vec<Box<dyn AbilityClient>>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for client in clients {
            let id = client.provider_id().to_string();
            if by_id.insert(id.clone(), client).is_some() {
                return Err(anyhow!("duplicate client for provider {id:?}"));
            }
        }
        for id in registry.provider_ids() {
            if !by_id.contains_key(id) {
                return Err(anyhow!("no client for provider {id:?}"));
            }
        }
        Ok(Self {
            registry,
            clients: by_id,
        })
    }

    /// Invoke `ability` with an explicit payload.
    pub fn call(&self, ability: &str, payload: &Value, state: &mut SupportState) -> StateUpdate {
        let provider_id = self.registry.resolve(ability);
        match self.clients.get(provider_id) {
            Some(client) => client.invoke(ability, payload, state),
            None => {
                // Construction checked coverage; still degrade rather than
                // panic mid-run.
                state.log(format!(
                    "[{provider_id}] {ability} failed: no client for provider"
                ));
                StateUpdate::new()
            }
        }
    }

    /// Invoke `ability` with the empty payload most stages send.
    pub fn call_empty(&self, ability: &str, state: &mut SupportState) -> StateUpdate {
        self.call(ability, &Value::Object(Map::new()), state)
    }
}
