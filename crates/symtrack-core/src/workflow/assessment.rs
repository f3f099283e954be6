use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use symtrack_schema::RecommendedCare;

use crate::connection::ClientConnection;
use crate::context::ConversationContext;
use crate::extract::ChatModel;
use crate::tools::{AssessmentDraft, AssessmentTools};

use super::{keys, WorkflowRun};

const EXTRACT_SYSTEM: &str = "You are a cautious clinical triage assistant. \
Given the patient's tracked symptoms and latest message, produce a working \
hypothesis as JSON matching the schema. Confidence is between 0 and 1. \
recommended_action is one of: self-care, see-gp, urgent-care, emergency. \
Differentials are optional alternative explanations.";

const RESPOND_SYSTEM: &str = "You are a supportive health-tracking assistant. \
Summarize the assessment for the patient in plain language: the working \
hypothesis, how confident you are, and the recommended next step. Remind them \
this is not a medical diagnosis. Three to four sentences.";

const INTENT_KEYWORDS: &[&str] = &[
    "assessment",
    "assess",
    "diagnosis",
    "diagnose",
    "evaluate",
    "evaluation",
    "what do i have",
    "what's wrong with me",
    "what is wrong with me",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CreateAssessment,
    Other,
}

/// Keyword-based intent gate. Cheap and deterministic; the workflow
/// re-checks it so an "other" turn can never create an assessment row.
pub fn classify_intent(message: &str) -> Intent {
    let lowered = message.to_lowercase();
    if INTENT_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        Intent::CreateAssessment
    } else {
        Intent::Other
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedAssessment {
    hypothesis: String,
    confidence: f64,
    #[serde(default)]
    differentials: Option<Vec<String>>,
    reasoning: String,
    recommended_action: RecommendedCare,
}

/// Classify -> Extract -> Create -> Complete -> Respond pipeline for
/// assessment-requesting turns.
pub struct AssessmentWorkflow {
    model: ChatModel,
    tools: AssessmentTools,
    connection: Arc<ClientConnection>,
}

impl AssessmentWorkflow {
    pub fn new(
        model: ChatModel,
        tools: AssessmentTools,
        connection: Arc<ClientConnection>,
    ) -> Self {
        Self {
            model,
            tools,
            connection,
        }
    }

    pub async fn run(&self, ctx: &mut ConversationContext, message: &str) -> WorkflowRun {
        let mut run = WorkflowRun::default();
        run.set(keys::USER_ID, json!(ctx.user_id));
        if let Some(id) = ctx.conversation_id {
            run.set(keys::CONVERSATION_ID, json!(id));
        }
        run.set(keys::USER_MESSAGE, json!(message));

        let intent = classify_intent(message);
        run.set(
            keys::INTENT,
            json!(match intent {
                Intent::CreateAssessment => "create-assessment",
                Intent::Other => "other",
            }),
        );

        if intent == Intent::Other {
            run.response = self
                .model
                .text_or(RESPOND_SYSTEM, message, || {
                    "I'm here to help you track symptoms and work through an \
                     assessment when you're ready. What would you like to do?"
                        .to_string()
                })
                .await;
            run.set(keys::RESPONSE, json!(run.response));
            return run;
        }

        self.connection
            .send_assessment_generating("Reviewing your tracked symptoms");

        let draft = self.extract(ctx, message).await;
        let assessment = match self.tools.create_assessment(ctx, draft).await {
            Ok(reply) => match reply.value {
                Some(assessment) => assessment,
                None => {
                    let reason = reply
                        .error
                        .unwrap_or_else(|| "assessment could not be created".to_string());
                    run.response = format!(
                        "I couldn't put an assessment together: {reason}. Tell me \
                         about any symptoms first and I'll track them."
                    );
                    run.set(keys::RESPONSE, json!(run.response));
                    return run;
                }
            },
            Err(e) => {
                tracing::error!("assessment creation failed: {e:#}");
                run.response =
                    "Something went wrong while generating your assessment. Please try again."
                        .to_string();
                run.set(keys::RESPONSE, json!(run.response));
                return run;
            }
        };
        run.set(keys::ASSESSMENT_ID, json!(assessment.id));

        // Completion is a notification step; its failure is logged but
        // does not void the assessment that already exists.
        match self.tools.complete_assessment(ctx, Some(assessment.id)).await {
            Ok(reply) if reply.is_err() => {
                tracing::warn!(
                    assessment_id = %assessment.id,
                    "assessment completion rejected: {:?}",
                    reply.error
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(assessment_id = %assessment.id, "assessment completion failed: {e:#}");
            }
        }

        let prompt = format!(
            "Patient message: {message}\nHypothesis: {}\nConfidence: {:.2}\n\
             Recommended action: {}\nReasoning: {}",
            assessment.hypothesis,
            assessment.confidence,
            assessment.recommended_action.as_str(),
            assessment.reasoning
        );
        run.response = self
            .model
            .text_or(RESPOND_SYSTEM, &prompt, || {
                format!(
                    "Based on what you've told me, my working hypothesis is {} \
                     (confidence {:.0}%). Recommended next step: {}. This isn't a \
                     medical diagnosis; see a professional if things get worse.",
                    assessment.hypothesis,
                    assessment.confidence * 100.0,
                    describe_action(assessment.recommended_action)
                )
            })
            .await;
        run.set(keys::RESPONSE, json!(run.response));
        run
    }

    async fn extract(&self, ctx: &ConversationContext, message: &str) -> AssessmentDraft {
        let schema = json!({
            "type": "object",
            "properties": {
                "hypothesis": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "differentials": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "reasoning": { "type": "string" },
                "recommended_action": {
                    "type": "string",
                    "enum": ["self-care", "see-gp", "urgent-care", "emergency"]
                }
            },
            "required": ["hypothesis", "confidence", "reasoning", "recommended_action"]
        });

        let episodes: Vec<String> = ctx
            .active_episodes
            .iter()
            .map(|e| {
                format!(
                    "- {} (severity: {}, frequency: {})",
                    e.symptom_name,
                    e.severity
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    e.frequency.as_deref().unwrap_or("unknown")
                )
            })
            .collect();
        let prompt = format!(
            "Tracked symptoms:\n{}\nLatest message: {message}",
            if episodes.is_empty() {
                "(none)".to_string()
            } else {
                episodes.join("\n")
            }
        );

        let extracted: ExtractedAssessment = self
            .model
            .structured_or(EXTRACT_SYSTEM, &prompt, schema, || ExtractedAssessment {
                hypothesis: "General health concern".to_string(),
                confidence: 0.7,
                differentials: None,
                reasoning: "Automated analysis was unavailable; based on the tracked \
                            symptoms a general practitioner visit is the safe default."
                    .to_string(),
                recommended_action: RecommendedCare::SeeGp,
            })
            .await;

        AssessmentDraft {
            hypothesis: extracted.hypothesis,
            confidence: extracted.confidence,
            differentials: extracted.differentials,
            reasoning: extracted.reasoning,
            recommended_action: extracted.recommended_action,
            negative_finding_ids: Vec::new(),
            weights: None,
        }
    }
}

fn describe_action(action: RecommendedCare) -> &'static str {
    match action {
        RecommendedCare::SelfCare => "rest and self-care at home",
        RecommendedCare::SeeGp => "book an appointment with your GP",
        RecommendedCare::UrgentCare => "visit an urgent care clinic soon",
        RecommendedCare::Emergency => "seek emergency care now",
    }
}
