//! The guardrail check engine.
//!
//! Compiles the PII regexes once at construction and evaluates the two
//! checks the orchestrator needs. Rule order only decides which `reason`
//! is reported; pass/fail is the OR of all rules.

use crate::rules::GuardrailRules;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The outcome of a guardrail check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the text passed the check.
    pub passed: bool,
    /// The canned reason for the matched rule category, if blocked.
    pub reason: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    fn block(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}

// US-style SSN, e.g. 123-45-6789 or 123456789.
const SSN_PATTERN: &str = r"\d{3}[-.]?\d{2}[-.]?\d{4}";
// US-style phone number, e.g. 555-867-5309.
const PHONE_PATTERN: &str = r"\d{3}[-.]?\d{3}[-.]?\d{4}";
const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
// Street address token: number + one or two words + a street-suffix keyword.
const STREET_PATTERN: &str = r"(?i)\b\d+\s+\w+(?:\s+\w+)?\s+(?:street|st|avenue|ave|road|rd|drive|dr|lane|ln|boulevard|blvd|court|ct|way|place|pl)\b";

/// The stateless pattern guardrail.
///
/// Pure functions over immutable rule data; no I/O, deterministic.
pub struct PatternGuardrail {
    rules: GuardrailRules,
    pii_patterns: Vec<Regex>,
}

impl PatternGuardrail {
    /// Create a guardrail over the given rule set.
    pub fn new(rules: GuardrailRules) -> Self {
        let pii_patterns = [SSN_PATTERN, PHONE_PATTERN, EMAIL_PATTERN, STREET_PATTERN]
            .iter()
            .map(|p| Regex::new(p).expect("hard-coded PII pattern compiles"))
            .collect();
        Self {
            rules,
            pii_patterns,
        }
    }

    /// Create a guardrail with the default rule set.
    pub fn with_defaults() -> Self {
        Self::new(GuardrailRules::default())
    }

    fn contains_pii(&self, text: &str) -> bool {
        self.pii_patterns.iter().any(|p| p.is_match(text))
    }

    /// Check inbound user text before it reaches the model.
    ///
    /// PII patterns are checked first, then injection phrases; the first
    /// matching category supplies the reason.
    pub fn check_input(&self, text: &str) -> Verdict {
        if self.contains_pii(text) {
            debug!("Input blocked: PII pattern matched");
            return Verdict::block(&self.rules.pii_reason);
        }

        let lower = text.to_lowercase();
        if self
            .rules
            .injection_phrases
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()))
        {
            debug!("Input blocked: injection phrase matched");
            return Verdict::block(&self.rules.scope_reason);
        }

        Verdict::pass()
    }

    /// Check a generated reply before it is returned to the user.
    ///
    /// Sensitive keywords are exempted when a safe-harbor phrase also
    /// appears anywhere in the reply. This is a substring heuristic with
    /// known false positives and negatives; it is kept as-is.
    pub fn check_output(&self, text: &str) -> Verdict {
        if self.contains_pii(text) {
            debug!("Output blocked: PII pattern matched");
            return Verdict::block(&self.rules.pii_reason);
        }

        let lower = text.to_lowercase();
        let has_safe_harbor = self
            .rules
            .safe_harbor_phrases
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()));

        if !has_safe_harbor
            && self
                .rules
                .sensitive_keywords
                .iter()
                .any(|keyword| lower.contains(keyword.as_str()))
        {
            debug!("Output blocked: sensitive keyword without safe harbor");
            return Verdict::block(&self.rules.sensitive_reason);
        }

        Verdict::pass()
    }
}
