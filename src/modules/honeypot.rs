//! Bait-rule generation and simulated honeypot deployment.

use crate::config::Config;
use crate::core::errors::{HoneypotError, LahmaError};
use serde::Serialize;
use std::fmt;

/// Whether the model-backed generation client is compiled in.
const LLM_CLIENT_AVAILABLE: bool = cfg!(feature = "llm");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    BannerGrab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    LogConnection,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BannerGrab => f.write_str("banner_grab"),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogConnection => f.write_str("log_connection"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaitRule {
    pub rule_id: String,
    pub target_tech: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub decoy_content: String,
    pub action: RuleAction,
}

impl BaitRule {
    fn placeholder(target_tech: &str) -> Self {
        Self {
            rule_id: "placeholder_001".to_string(),
            target_tech: target_tech.to_string(),
            rule_type: RuleType::BannerGrab,
            decoy_content: format!("Placeholder {} Banner - Welcome!", target_tech),
            action: RuleAction::LogConnection,
        }
    }
}

/// Produce bait rules for `target_tech`. Model-backed generation is not
/// implemented yet, so this always yields the placeholder rule.
pub fn generate(target_tech: &str, api_key: Option<&str>, model: &str) -> Result<Vec<BaitRule>, LahmaError> {
    generate_rules(LLM_CLIENT_AVAILABLE, target_tech, api_key, model)
}

fn generate_rules(
    client_available: bool,
    target_tech: &str,
    api_key: Option<&str>,
    model: &str,
) -> Result<Vec<BaitRule>, LahmaError> {
    tracing::info!("Generating placeholder bait rules for target: {}", target_tech);

    let api_key = api_key.filter(|key| !key.is_empty());
    match (api_key, client_available) {
        (Some(_), false) => {
            return Err(LahmaError::environment(
                "The generation client is required for dynamic bait generation (API key provided) \
                 but this build does not include it (enable the 'llm' feature).",
            ));
        }
        (Some(_), true) => {
            tracing::warn!(
                "OpenAI API key provided, but actual generation via model '{}' is NOT YET IMPLEMENTED.",
                model
            );
            tracing::warn!("Using hardcoded placeholder rules instead.");
        }
        (None, _) => {
            tracing::info!(
                "No OpenAI API key found in config or environment. Using static placeholder rules."
            );
        }
    }

    Ok(vec![BaitRule::placeholder(target_tech)])
}

/// Report what would be deployed. Nothing is installed anywhere.
pub fn deploy(rules: &[BaitRule]) {
    tracing::info!("--- Simulating Honeypot Deployment ({} rule(s)) ---", rules.len());
    if rules.is_empty() {
        tracing::warn!("No rules provided for deployment.");
        return;
    }

    for (index, rule) in rules.iter().enumerate() {
        let rule_id = or_fallback(&rule.rule_id, || format!("rule_{}", index + 1));
        let target = or_fallback(&rule.target_tech, || "generic".to_string());

        tracing::info!("Deploying Rule ID: {}", rule_id);
        tracing::info!("  Target Tech: {}", target);
        tracing::info!("  Rule Type: {}", rule.rule_type);
        if rule.decoy_content.is_empty() {
            tracing::info!("  Content/Action: {}", rule.action);
        } else {
            tracing::info!("  Content/Action: {}", rule.decoy_content);
        }
        tracing::debug!("Placeholder deployment for rule {} complete.", rule_id);
    }

    tracing::info!("--- Honeypot Deployment Simulation Finished ---");
}

fn or_fallback(value: &str, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() { fallback() } else { value.to_string() }
}

/// Module entry point.
pub async fn run(config: &Config) -> Result<(), LahmaError> {
    tracing::info!("--- Starting Honeypot Module ---");

    let target_tech = &config.honeypot.target_tech_simulation;
    tracing::info!("Configured to simulate honeypot for: {}", target_tech);

    let rules = generate(
        target_tech,
        config.openai.api_key.as_deref(),
        &config.openai.model,
    )
    .map_err(|e| {
        tracing::error!("Failed to generate honeypot rules: {}", e);
        HoneypotError::RuleGeneration(Box::new(e))
    })?;

    deploy(&rules);

    tracing::info!("--- Honeypot Module Finished ---");
    Ok(())
}
