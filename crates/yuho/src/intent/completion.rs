//! Text-completion capability used by the assisted interpretation path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking
    User,
    /// The assistant answering
    Assistant,
}

/// One turn of the surrounding conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker
    pub role: Role,
    /// Utterance text
    pub content: String,
}

impl Turn {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Failure of a completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The provider rejected or failed the request
    #[error("Completion provider error: {0}")]
    Provider(String),

    /// The provider is not configured
    #[error("Completion provider unavailable")]
    Unavailable,
}

/// A language-model text completion.
///
/// Implementations live outside this crate; the resolver only ever calls
/// [`TextCompletion::complete`] and treats every failure as a reason to fall
/// back to the rule-based interpretation.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Complete `prompt`, given the recent conversation `context`.
    async fn complete(&self, prompt: &str, context: &[Turn]) -> Result<String, CompletionError>;
}
