mod assessment;
mod symptom;

pub use assessment::{AssessmentDraft, AssessmentPatch, AssessmentTools};
pub use symptom::SymptomTrackerTools;

use symtrack_schema::NextAction;

use crate::error::DomainError;

/// Structured outcome of a tool call.
///
/// Domain precondition failures land here as an error message plus a
/// `SubmitFinalResponse` hint so the workflow can answer the user instead
/// of throwing; only unexpected failures propagate as `anyhow::Error`.
#[derive(Debug, Clone)]
pub struct ToolReply<T> {
    pub value: Option<T>,
    pub error: Option<String>,
    pub next: NextAction,
}

impl<T> ToolReply<T> {
    pub fn ok(value: T) -> Self {
        Self::ok_with(value, NextAction::Continue)
    }

    pub fn ok_with(value: T, next: NextAction) -> Self {
        Self {
            value: Some(value),
            error: None,
            next,
        }
    }

    pub fn fail(error: DomainError) -> Self {
        Self {
            value: None,
            error: Some(error.to_string()),
            next: NextAction::SubmitFinalResponse,
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}
