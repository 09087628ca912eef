use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies whose entries and pending state a call operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Text of the most recent user turn, if any.
pub fn latest_user_text(conversation: &[ConversationTurn]) -> Option<&str> {
    conversation
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
}

/// The last `window` turns, oldest first.
pub fn recent_window(conversation: &[ConversationTurn], window: usize) -> &[ConversationTurn] {
    let start = conversation.len().saturating_sub(window);
    &conversation[start..]
}
