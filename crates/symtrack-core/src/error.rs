use thiserror::Error;
use uuid::Uuid;

/// Domain precondition violations. Tools convert these into structured
/// replies for the workflow instead of propagating them; only unexpected
/// failures travel as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("no conversation active")]
    NoActiveConversation,
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),
    #[error("episode not found: {0}")]
    EpisodeNotFound(Uuid),
    #[error("assessment not found: {0}")]
    AssessmentNotFound(Uuid),
    #[error("no assessment to complete")]
    NoAssessmentToComplete,
}
