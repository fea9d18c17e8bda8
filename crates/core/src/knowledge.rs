//! Admin-managed content types.
//!
//! [`KnowledgeEntry`] rows are the facility's knowledge base (hours,
//! policies, pricing); [`InstructionEntry`] rows are extra system-level
//! behavior instructions. Both are owned by the admin console and
//! read-only to the pipeline, which consumes only the active subset
//! ordered most-recently-created first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single knowledge-base document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique ID
    pub id: String,

    /// Short title shown in the composed prompt header
    pub title: String,

    /// The document body (plain text)
    pub body: String,

    /// Category tag (e.g. "operations", "policies", "billing")
    pub category: String,

    /// Only active entries are composed into the system prompt
    pub active: bool,

    /// When this entry was created
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Create a new active entry.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            body: body.into(),
            category: category.into(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// What an instruction entry is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionKind {
    /// Extra system-prompt instructions (composed into every prompt)
    System,
    /// Guardrail-related notes
    Guardrail,
    /// Evaluator-related notes
    Evaluator,
    /// Behavior/tone adjustments
    Behavior,
}

impl InstructionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionKind::System => "system",
            InstructionKind::Guardrail => "guardrail",
            InstructionKind::Evaluator => "evaluator",
            InstructionKind::Behavior => "behavior",
        }
    }
}

impl std::str::FromStr for InstructionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(InstructionKind::System),
            "guardrail" => Ok(InstructionKind::Guardrail),
            "evaluator" => Ok(InstructionKind::Evaluator),
            "behavior" => Ok(InstructionKind::Behavior),
            other => Err(format!("unknown instruction kind: {other}")),
        }
    }
}

/// An admin-managed instruction ("prompt" record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionEntry {
    /// Unique ID
    pub id: String,

    /// Admin-facing name
    pub name: String,

    /// The instruction text composed into the system prompt
    pub body: String,

    /// Type tag
    pub kind: InstructionKind,

    /// Only active entries are composed
    pub active: bool,

    /// When this entry was created
    pub created_at: DateTime<Utc>,
}

impl InstructionEntry {
    /// Create a new active entry.
    pub fn new(name: impl Into<String>, body: impl Into<String>, kind: InstructionKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            body: body.into(),
            kind,
            active: true,
            created_at: Utc::now(),
        }
    }
}
