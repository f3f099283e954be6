use serde::Deserialize;
use serde_json::json;

use crate::context::ConversationContext;
use crate::extract::ChatModel;
use crate::tools::SymptomTrackerTools;

use super::{keys, WorkflowRun};

const DETECT_SYSTEM: &str = "You extract health symptoms from a patient message. \
Return JSON matching the schema: a list of distinct symptom names, lowercase, \
singular, no duplicates. Return an empty list if the message mentions no symptoms.";

const RESPOND_SYSTEM: &str = "You are a supportive health-tracking assistant. \
Acknowledge the symptoms the user reported, note they are being tracked, and \
ask one brief follow-up question about onset or severity. Two to three \
sentences, no medical diagnosis.";

/// Symptoms recognized without model help. Deliberately small; the model
/// handles the long tail.
const KEYWORD_SYMPTOMS: &[&str] = &[
    "headache", "fever", "cough", "pain", "nausea", "dizziness",
];

#[derive(Debug, Deserialize)]
struct SymptomList {
    symptoms: Vec<String>,
}

/// Detect -> Create -> Respond pipeline for symptom-reporting turns.
pub struct SymptomTrackingWorkflow {
    model: ChatModel,
    tools: SymptomTrackerTools,
}

impl SymptomTrackingWorkflow {
    pub fn new(model: ChatModel, tools: SymptomTrackerTools) -> Self {
        Self { model, tools }
    }

    pub async fn run(&self, ctx: &mut ConversationContext, message: &str) -> WorkflowRun {
        let mut run = WorkflowRun::default();
        run.set(keys::USER_ID, json!(ctx.user_id));
        if let Some(id) = ctx.conversation_id {
            run.set(keys::CONVERSATION_ID, json!(id));
        }
        run.set(keys::USER_MESSAGE, json!(message));

        let detected = self.detect(message).await;
        run.set(keys::SYMPTOMS, json!(detected));

        if detected.is_empty() {
            run.response = self
                .model
                .text_or(RESPOND_SYSTEM, message, || {
                    "I didn't pick up any specific symptoms from that. Could you \
                     tell me more about what you're experiencing?"
                        .to_string()
                })
                .await;
            run.set(keys::RESPONSE, json!(run.response));
            return run;
        }

        let mut created_names: Vec<String> = Vec::new();
        for name in &detected {
            match self
                .tools
                .create_symptom_with_episode(ctx, name, None)
                .await
            {
                Ok(reply) => {
                    if let Some(episode) = reply.value {
                        created_names.push(episode.symptom_name.clone());
                    } else if let Some(error) = reply.error {
                        tracing::warn!(symptom = %name, "symptom creation rejected: {error}");
                    }
                }
                Err(e) => {
                    tracing::error!(symptom = %name, "symptom creation failed: {e:#}");
                    run.response =
                        "Something went wrong while recording your symptoms. Please try again."
                            .to_string();
                    run.set(keys::RESPONSE, json!(run.response));
                    return run;
                }
            }
        }

        let prompt = format!(
            "Patient message: {message}\nTracked symptoms: {}",
            created_names.join(", ")
        );
        run.response = self
            .model
            .text_or(RESPOND_SYSTEM, &prompt, || {
                format!(
                    "I've noted your {}. When did this start, and how severe \
                     would you say it is?",
                    join_names(&created_names)
                )
            })
            .await;
        run.set(keys::RESPONSE, json!(run.response));
        run
    }

    /// Model-backed extraction with a keyword scan as the degraded path.
    async fn detect(&self, message: &str) -> Vec<String> {
        let schema = json!({
            "type": "object",
            "properties": {
                "symptoms": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["symptoms"]
        });
        let list: SymptomList = self
            .model
            .structured_or(DETECT_SYSTEM, message, schema, || SymptomList {
                symptoms: keyword_scan(message),
            })
            .await;

        let mut seen = Vec::new();
        for raw in list.symptoms {
            let name = raw.trim().to_lowercase();
            if !name.is_empty() && !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

fn keyword_scan(message: &str) -> Vec<String> {
    let lowered = message.to_lowercase();
    KEYWORD_SYMPTOMS
        .iter()
        .filter(|kw| lowered.contains(**kw))
        .map(|kw| kw.to_string())
        .collect()
}

fn join_names(names: &[String]) -> String {
    match names {
        [] => "symptoms".to_string(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
