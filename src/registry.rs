//! Ability-to-provider routing table.
//!
//! Built once at start-up from the agent config; read-only afterwards, so
//! concurrent runs can share it freely.

use crate::config::{AgentConfig, StageBinding};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable map from ability name to the provider id that serves it.
#[derive(Debug, Clone)]
pub struct AbilityRegistry {
    bindings: BTreeMap<String, String>,
    default_provider: String,
}

impl AbilityRegistry {
    /// Build the table from the per-stage bindings.
    ///
    /// A stage configured with a single provider puts every one of its
    /// abilities on that provider; a provider list is zipped positionally
    /// against the ability list. The last write for an ability name wins
    /// when several stages declare it. Binding problems fail here, at
    /// start-up, never in the middle of a run.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        if !config.providers.contains_key(&config.default_provider) {
            return Err(anyhow!(
                "default provider {:?} is not declared under providers",
                config.default_provider
            ));
        }
        let mut bindings = BTreeMap::new();
        for binding in &config.stages {
            insert_stage(config, binding, &mut bindings)?;
        }
        Ok(Self {
            bindings,
            default_provider: config.default_provider.clone(),
        })
    }

    /// Provider serving `ability`, falling back to the default provider for
    /// abilities no stage declared.
    pub fn resolve(&self, ability: &str) -> &str {
        self.bindings
            .get(ability)
            .map(String::as_str)
            .unwrap_or(&self.default_provider)
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Distinct provider ids the table can resolve to, default included.
    pub fn provider_ids(&self) -> BTreeSet<&str> {
        let mut ids: BTreeSet<&str> = self.bindings.values().map(String::as_str).collect();
        ids.insert(&self.default_provider);
        ids
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn insert_stage(
    config: &AgentConfig,
    binding: &StageBinding,
    bindings: &mut BTreeMap<String, String>,
) -> Result<()> {
    let stage = binding.stage.as_str();
    match (&binding.provider, binding.providers.is_empty()) {
        (Some(_), false) => Err(anyhow!(
            "stage {stage}: declare provider or providers, not both"
        )),
        (None, true) => Err(anyhow!("stage {stage}: missing provider binding")),
        (Some(id), true) => {
            require_declared(config, stage, id)?;
            for ability in &binding.abilities {
                bindings.insert(ability.clone(), id.clone());
            }
            Ok(())
        }
        (None, false) => {
            if binding.providers.len() < binding.abilities.len() {
                return Err(anyhow!(
                    "stage {stage}: {} abilities but only {} providers",
                    binding.abilities.len(),
                    binding.providers.len()
                ));
            }
            for id in &binding.providers {
                require_declared(config, stage, id)?;
            }
            for (ability, id) in binding.abilities.iter().zip(&binding.providers) {
                bindings.insert(ability.clone(), id.clone());
            }
            Ok(())
        }
    }
}

fn require_declared(config: &AgentConfig, stage: &str, id: &str) -> Result<()> {
    if config.providers.contains_key(id) {
        Ok(())
    } else {
        Err(anyhow!(
            "stage {stage}: provider {id:?} is not declared under providers"
        ))
    }
}
