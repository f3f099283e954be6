mod assessment;
mod symptom;

pub use assessment::{classify_intent, AssessmentWorkflow, Intent};
pub use symptom::SymptomTrackingWorkflow;

use std::collections::HashMap;

/// Shared state keys used across workflow steps.
pub mod keys {
    pub const USER_ID: &str = "userId";
    pub const CONVERSATION_ID: &str = "conversationId";
    pub const USER_MESSAGE: &str = "userMessage";
    pub const INTENT: &str = "intent";
    pub const SYMPTOMS: &str = "symptoms";
    pub const ASSESSMENT_ID: &str = "assessmentId";
    pub const RESPONSE: &str = "response";
}

/// Result of a workflow turn: the accumulated step state plus the final
/// user-facing reply. Workflows always produce a run, even on failure;
/// the response then explains what went wrong.
#[derive(Debug, Default)]
pub struct WorkflowRun {
    pub state: HashMap<&'static str, serde_json::Value>,
    pub response: String,
}

impl WorkflowRun {
    pub fn set(&mut self, key: &'static str, value: serde_json::Value) {
        self.state.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }
}
