//! Guardrail rule data — the word lists and canned reasons.

use serde::{Deserialize, Serialize};

/// Immutable rule data for the pattern guardrail.
///
/// The defaults cover the daycare support domain; a deployment can
/// replace them wholesale via [`GuardrailRules::from_toml`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailRules {
    /// Lower-cased prompt-injection phrases checked against inbound text.
    #[serde(default = "default_injection_phrases")]
    pub injection_phrases: Vec<String>,

    /// Lower-cased sensitive-topic keywords checked against outbound text.
    #[serde(default = "default_sensitive_keywords")]
    pub sensitive_keywords: Vec<String>,

    /// Phrases that exempt an outbound sensitive keyword. This is a
    /// substring heuristic, not semantic negation detection.
    #[serde(default = "default_safe_harbor_phrases")]
    pub safe_harbor_phrases: Vec<String>,

    /// Reason attached when a PII pattern matches.
    #[serde(default = "default_pii_reason")]
    pub pii_reason: String,

    /// Reason attached when an injection phrase matches inbound text.
    #[serde(default = "default_scope_reason")]
    pub scope_reason: String,

    /// Reason attached when a sensitive keyword matches outbound text.
    #[serde(default = "default_sensitive_reason")]
    pub sensitive_reason: String,
}

fn default_injection_phrases() -> Vec<String> {
    [
        "ignore previous",
        "ignore all previous",
        "disregard your instructions",
        "jailbreak",
        "developer mode",
        "reveal your prompt",
        "system prompt",
        "pretend you are",
    ]
    .map(String::from)
    .to_vec()
}

fn default_sensitive_keywords() -> Vec<String> {
    [
        "social security",
        "ssn",
        "medical record",
        "bank account",
        "credit card",
        "immigration status",
        "custody dispute",
    ]
    .map(String::from)
    .to_vec()
}

fn default_safe_harbor_phrases() -> Vec<String> {
    ["we do not", "never share"].map(String::from).to_vec()
}

fn default_pii_reason() -> String {
    "Message contains personal identifying information (PII)".into()
}

fn default_scope_reason() -> String {
    "Message is out of scope or attempts to alter assistant behavior".into()
}

fn default_sensitive_reason() -> String {
    "Reply touches a sensitive topic without a compliance disclaimer".into()
}

impl Default for GuardrailRules {
    fn default() -> Self {
        Self {
            injection_phrases: default_injection_phrases(),
            sensitive_keywords: default_sensitive_keywords(),
            safe_harbor_phrases: default_safe_harbor_phrases(),
            pii_reason: default_pii_reason(),
            scope_reason: default_scope_reason(),
            sensitive_reason: default_sensitive_reason(),
        }
    }
}

impl GuardrailRules {
    /// Load rules from a TOML string. Omitted fields keep their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, crate::GuardrailError> {
        let rules: GuardrailRules = toml::from_str(toml_str)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Validate that the rule set is usable.
    pub fn validate(&self) -> Result<(), crate::GuardrailError> {
        if self.injection_phrases.iter().any(|p| p.is_empty()) {
            return Err(crate::GuardrailError::InvalidRules(
                "injection phrases cannot be empty strings".into(),
            ));
        }
        if self.sensitive_keywords.iter().any(|k| k.is_empty()) {
            return Err(crate::GuardrailError::InvalidRules(
                "sensitive keywords cannot be empty strings".into(),
            ));
        }
        Ok(())
    }
}
