//! Agent configuration helpers.
//!
//! This module loads and validates the JSON file that names the capability
//! providers and binds each stage's abilities to them. Validation runs once
//! at start-up; everything downstream treats the config as immutable.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current schema version for the agent config file.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Provider id used when an ability carries no explicit binding.
pub const DEFAULT_PROVIDER_ID: &str = "COMMON";

/// Per-call timeout when neither flag nor config overrides it.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV_VAR: &str = "CASEFLOW_CONFIG";

// Ability names double as URL path segments on the provider wire.
const ABILITY_NAME_PATTERN: &str = "^[a-z][a-z0-9_]*$";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub schema_version: u32,
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default = "default_provider_id")]
    pub default_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
    pub stages: Vec<StageBinding>,
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

/// One remote capability provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Ability list for one stage plus the provider(s) serving it.
///
/// Exactly one binding form must be set: `provider` puts every ability of
/// the stage on one provider; `providers` is zipped positionally against
/// `abilities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageBinding {
    pub stage: String,
    #[serde(default)]
    pub abilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
}

fn single(stage: &str, abilities: &[&str], provider: &str) -> StageBinding {
    StageBinding {
        stage: stage.to_string(),
        abilities: abilities.iter().map(|name| name.to_string()).collect(),
        provider: Some(provider.to_string()),
        providers: Vec::new(),
    }
}

fn zipped(stage: &str, abilities: &[&str], providers: &[&str]) -> StageBinding {
    StageBinding {
        stage: stage.to_string(),
        abilities: abilities.iter().map(|name| name.to_string()).collect(),
        provider: None,
        providers: providers.iter().map(|name| name.to_string()).collect(),
    }
}

/// Build the canonical configuration for the support workflow.
///
/// COMMON is the language-model provider, ATLAS the data-store provider;
/// the split mirrors which side actually owns each ability.
pub fn default_config() -> AgentConfig {
    let mut providers = BTreeMap::new();
    providers.insert(
        "COMMON".to_string(),
        ProviderConfig {
            base_url: "http://localhost:8001".to_string(),
            api_key: None,
        },
    );
    providers.insert(
        "ATLAS".to_string(),
        ProviderConfig {
            base_url: "http://localhost:8002".to_string(),
            api_key: None,
        },
    );
    AgentConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        providers,
        default_provider: DEFAULT_PROVIDER_ID.to_string(),
        call_timeout_secs: Some(DEFAULT_CALL_TIMEOUT_SECS),
        stages: vec![
            single("INTAKE", &["accept_payload"], "COMMON"),
            zipped(
                "UNDERSTAND",
                &[
                    "parse_request_text",
                    "extract_entities",
                    "extract_intent",
                    "sentiment_analysis",
                ],
                &["COMMON", "ATLAS", "COMMON", "COMMON"],
            ),
            zipped(
                "PREPARE",
                &[
                    "normalize_fields",
                    "enrich_records",
                    "add_flags_calculations",
                    "get_customer_history",
                ],
                &["COMMON", "ATLAS", "COMMON", "ATLAS"],
            ),
            single("ASK", &["clarify_question"], "ATLAS"),
            zipped("WAIT", &["extract_answer", "store_answer"], &["ATLAS", "COMMON"]),
            zipped(
                "RETRIEVE",
                &["knowledge_base_search", "search_knowledge_base", "store_data"],
                &["ATLAS", "ATLAS", "COMMON"],
            ),
            zipped(
                "DECIDE",
                &["solution_evaluation", "escalation_decision", "update_payload"],
                &["COMMON", "ATLAS", "COMMON"],
            ),
            single(
                "UPDATE",
                &[
                    "update_ticket",
                    "close_ticket",
                    "update_ticket_status",
                    "store_ticket",
                ],
                "ATLAS",
            ),
            single("CREATE", &["response_generation", "generate_response"], "COMMON"),
            single(
                "DO",
                &[
                    "execute_api_calls",
                    "trigger_notifications",
                    "store_conversation_log",
                ],
                "ATLAS",
            ),
            single("COMPLETE", &["output_payload"], "COMMON"),
        ],
    }
}

/// Render a pretty JSON config stub for `caseflow init`.
pub fn config_stub() -> String {
    let config = default_config();
    serde_json::to_string_pretty(&config).expect("serialize config stub")
}

/// Load the agent config from `path` without validating it.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: AgentConfig =
        serde_json::from_slice(&bytes).context("parse agent config JSON")?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &AgentConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config).context("serialize agent config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate the file-level shape: schema version, provider addresses,
/// ability names, timeout. Binding rules (which provider serves which
/// ability) are enforced when the registry is built from this config.
pub fn validate_config(config: &AgentConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported agent config schema_version {}",
            config.schema_version
        ));
    }
    if config.providers.is_empty() {
        return Err(anyhow!("at least one provider must be configured"));
    }
    for (id, provider) in &config.providers {
        if id.trim().is_empty() {
            return Err(anyhow!("provider ids must be non-empty"));
        }
        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            return Err(anyhow!(
                "provider {id} base_url must start with http:// or https:// (got {:?})",
                provider.base_url
            ));
        }
    }
    if config.call_timeout_secs == Some(0) {
        return Err(anyhow!("call_timeout_secs must be greater than zero"));
    }
    let ability_name =
        Regex::new(ABILITY_NAME_PATTERN).context("compile ability name pattern")?;
    for binding in &config.stages {
        let stage = binding.stage.trim();
        if stage.is_empty() {
            return Err(anyhow!("stage names must be non-empty"));
        }
        for ability in &binding.abilities {
            if !ability_name.is_match(ability) {
                return Err(anyhow!(
                    "stage {stage}: ability name {ability:?} must match {ABILITY_NAME_PATTERN}"
                ));
            }
        }
    }
    Ok(())
}

/// Load and validate the config at `path`, with a hint when it is absent.
pub fn load_required(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "missing agent config at {} (run `caseflow init` to create one)",
            path.display()
        ));
    }
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the config when present, else fall back to the built-in default.
pub fn load_or_default(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        return Ok(default_config());
    }
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Resolve the config path: explicit flag, then `CASEFLOW_CONFIG`, then the
/// platform config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let base = dirs::config_dir()
        .ok_or_else(|| anyhow!("could not determine a config directory; pass --config"))?;
    Ok(base.join("caseflow").join("config.json"))
}

/// Per-call timeout: flag wins, then config, then the built-in default.
pub fn resolve_call_timeout(flag_secs: Option<u64>, config: &AgentConfig) -> Duration {
    let secs = flag_secs
        .or(config.call_timeout_secs)
        .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
