//! Clinical summary returned by the gateway

use serde::{Deserialize, Serialize};

use super::{Message, Role};

/// Narrative used when the summarizer is unavailable.
pub const SUMMARY_UNAVAILABLE: &str = "[Summary Unavailable]";

/// Structured consultation summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub diagnoses: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub followups: Vec<String>,
}

impl Summary {
    pub fn unavailable() -> Self {
        Self {
            summary: SUMMARY_UNAVAILABLE.to_string(),
            ..Self::default()
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.summary == SUMMARY_UNAVAILABLE
    }
}

/// The slice of a message the summarizer gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptLine {
    pub sender_role: Role,
    pub original_text: String,
}

impl From<&Message> for TranscriptLine {
    fn from(msg: &Message) -> Self {
        Self {
            sender_role: msg.sender_role,
            original_text: msg.original_text.clone(),
        }
    }
}
