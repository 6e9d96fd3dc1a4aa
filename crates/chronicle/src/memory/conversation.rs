//! Conversation turns feeding retrieval
//!
//! Turns are the raw material for two pipeline stages: the speaker-labeled
//! query text and the protected window of recent messages that must not be
//! echoed back as memories.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// System message
    System,
}

impl Role {
    /// Convert role to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn default_label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// A single turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Role of the speaker
    pub role: Role,
    /// Display name of the speaker, if known
    #[serde(default)]
    pub name: Option<String>,
    /// Content of the message
    pub content: String,
    /// Timestamp when the turn was recorded
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a new conversation turn with current timestamp
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            name: None,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a speaker name used for query labels
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn speaker(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim(),
            _ => self.role.default_label(),
        }
    }
}

/// Speaker-labeled text of the last `count` non-empty turns, oldest first.
pub fn build_query_text(turns: &[ConversationTurn], count: usize) -> String {
    let recent: Vec<&ConversationTurn> = turns
        .iter()
        .rev()
        .filter(|t| !t.content.trim().is_empty())
        .take(count)
        .collect();

    recent
        .iter()
        .rev()
        .map(|t| format!("{}: {}", t.speaker(), t.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercased, whitespace-collapsed form used for exact-echo comparison.
pub fn normalize_message(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized texts of the most recent `count` turns.
pub fn protected_window(turns: &[ConversationTurn], count: usize) -> HashSet<String> {
    turns
        .iter()
        .rev()
        .take(count)
        .map(|t| normalize_message(&t.content))
        .filter(|t| !t.is_empty())
        .collect()
}
